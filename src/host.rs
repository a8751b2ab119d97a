//! Headless container owning the browser surface for one attempt.
//!
//! Pure glue: launches the browser, wires the CDP event loops to the
//! authenticator, starts the attempt, and forwards the outcome verbatim.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::info;

use crate::authenticator::{AuthTokens, RedirectAuthenticator};
use crate::config::{AuthenticationConfig, BrowserSettings};
use crate::surface::chromium::{self, ChromiumHarness, ChromiumSurface};

/// Runs authentication attempts against a freshly launched browser.
pub struct AuthenticationHost {
    settings: BrowserSettings,
}

impl AuthenticationHost {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Run a single authentication attempt to completion.
    ///
    /// Each attempt gets its own browser with a throwaway profile; the
    /// browser is torn down before this returns, success or not.
    pub async fn authenticate(&self, config: &AuthenticationConfig) -> Result<AuthTokens> {
        let harness = ChromiumHarness::launch(&self.settings).await?;

        let surface = ChromiumSurface::new(harness.page().clone());
        let (authenticator, outcome) = RedirectAuthenticator::new(surface.clone());
        let authenticator = Arc::new(Mutex::new(authenticator));

        // Interception must be live before the POST goes out.
        chromium::wire_navigation_policy(harness.page(), &surface, authenticator.clone()).await?;
        chromium::wire_failure_reporting(harness.page(), authenticator.clone()).await?;

        authenticator.lock().await.start(config).await;

        let result = tokio::time::timeout(self.settings.attempt_timeout(), outcome).await;
        harness.shutdown();

        let outcome = result
            .context("Timed out waiting for the ACS to redirect to the termination URL")?
            .context("Authentication attempt ended without an outcome")?;

        let tokens = outcome?;
        info!("authentication attempt succeeded");
        Ok(tokens)
    }
}
