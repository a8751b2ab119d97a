use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Caller-supplied parameters for one authentication attempt.
///
/// `md` and `pa_req` are opaque blobs handed over by the payment backend;
/// they are never inspected here, only transport-encoded into the request
/// body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    /// ACS endpoint the authentication request is POSTed to.
    pub acs_url: String,

    /// Merchant data token, echoed back unchanged by the ACS.
    pub md: String,

    /// Payer-authentication-request payload.
    pub pa_req: String,
}

impl AuthenticationConfig {
    pub fn new(
        acs_url: impl Into<String>,
        md: impl Into<String>,
        pa_req: impl Into<String>,
    ) -> Self {
        Self {
            acs_url: acs_url.into(),
            md: md.into(),
            pa_req: pa_req.into(),
        }
    }
}

/// Default deadline for one attempt (10 minutes).
///
/// Challenge pages can require manual interaction, so this is deliberately
/// generous.
fn default_attempt_timeout_secs() -> u64 {
    600
}

/// Browser/runtime settings for the authentication host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium binary. When unset, well-known install
    /// locations are probed.
    pub chrome_executable: Option<PathBuf>,

    /// Run the browser without a window. Turn this off for issuer challenge
    /// pages that need user interaction.
    pub headless: bool,

    /// How long one attempt may take before the host gives up, in seconds.
    ///
    /// The state machine itself never times out; an attempt that never
    /// reaches the termination host would otherwise wait forever.
    pub attempt_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl BrowserSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: BrowserSettings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Load settings from a file, or return defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}
