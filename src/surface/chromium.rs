//! Chrome DevTools Protocol implementation of the browsing surface.
//!
//! The fetch domain pauses every outgoing request so the authenticator can
//! rule on it: the initial navigation is rewritten into the authentication
//! POST, challenge-page navigations are continued untouched, and the
//! termination navigation is failed with `Aborted` so it never renders.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, HeaderEntry,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventRequestWillBeSent, RequestId, ResourceType,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::authenticator::{NavigationDecision, RedirectAuthenticator};
use crate::config::BrowserSettings;
use crate::surface::{BrowsingSurface, FormRequest};

/// The original document-scraping script: returns the rendered page's HTML.
const DOCUMENT_HTML_SCRIPT: &str =
    "function getHTML() { return document.getElementsByTagName('html')[0].innerHTML; } getHTML();";

/// Browsing surface backed by a CDP page.
///
/// Cloneable so the interception tasks and the authenticator can share it;
/// all clones drive the same page.
#[derive(Clone)]
pub struct ChromiumSurface {
    page: Page,
    pending: Arc<Mutex<Option<FormRequest>>>,
}

impl ChromiumSurface {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn pending_request(&self) -> Arc<Mutex<Option<FormRequest>>> {
        self.pending.clone()
    }
}

#[async_trait]
impl BrowsingSurface for ChromiumSurface {
    async fn submit(&self, request: &FormRequest) -> Result<()> {
        // Stash the form so the interception loop can rewrite the plain
        // navigation below into the real POST when it pauses.
        *self.pending.lock().await = Some(request.clone());

        let page = self.page.clone();
        let url = request.url.to_string();
        // Don't wait for the load: completion and failure arrive as events.
        tokio::spawn(async move {
            if let Err(err) = page.goto(url.as_str()).await {
                debug!(error = %err, "ACS navigation did not complete cleanly");
            }
        });

        Ok(())
    }

    async fn document_html(&self) -> Result<String> {
        let html: String = self
            .page
            .evaluate(DOCUMENT_HTML_SCRIPT)
            .await
            .context("Failed to execute extraction script")?
            .into_value()
            .context("Extraction script returned a non-string result")?;
        Ok(html)
    }
}

/// A launched browser plus the tasks keeping it alive.
pub struct ChromiumHarness {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    // Keep the ephemeral profile alive as long as the browser process.
    _profile_dir: TempDir,
}

impl ChromiumHarness {
    /// Launch a browser with a throwaway profile and open a blank page.
    ///
    /// The profile is ephemeral on purpose: no cookie or token from the flow
    /// is ever persisted.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = match &settings.chrome_executable {
            Some(path) => path.display().to_string(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set chrome_executable.",
            )?,
        };

        let profile_dir = TempDir::new().context("Failed to create browser profile dir")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .user_data_dir(profile_dir.path())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        Ok(Self {
            browser,
            handler_task,
            page,
            _profile_dir: profile_dir,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Tear the browser down.
    pub fn shutdown(self) {
        drop(self.browser);
        self.handler_task.abort();
    }
}

/// Route every paused request through the authenticator's policy decision.
///
/// Must be wired before `start` so the initial ACS navigation is already
/// interceptable when it goes out.
pub(crate) async fn wire_navigation_policy(
    page: &Page,
    surface: &ChromiumSurface,
    authenticator: Arc<Mutex<RedirectAuthenticator<ChromiumSurface>>>,
) -> Result<()> {
    let patterns = vec![RequestPattern {
        url_pattern: Some("*".to_string()),
        resource_type: None,
        request_stage: Some(RequestStage::Request),
    }];

    page.execute(fetch::EnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await
    .context("Failed to enable request interception")?;

    let mut request_events = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("Failed to listen for paused requests")?;

    let page = page.clone();
    let pending = surface.pending_request();

    tokio::spawn(async move {
        while let Some(event) = request_events.next().await {
            let decision = match Url::parse(&event.request.url) {
                Ok(url) => authenticator.lock().await.decide_navigation(&url).await,
                // Destinations outside URL space (data:, blob:) carry no host
                // to recognize.
                Err(_) => NavigationDecision::Allow,
            };

            let action = match decision {
                NavigationDecision::Allow => {
                    let rewrite = take_matching_form(&pending, &event).await;
                    match rewrite {
                        Some(form) => page.execute(continue_as_form_post(&event, &form)).await,
                        None => page.execute(plain_continue(&event)).await,
                    }
                    .map(|_| ())
                }
                NavigationDecision::Cancel => page
                    .execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::Aborted,
                    ))
                    .await
                    .map(|_| ()),
            };

            // The page may already be gone on teardown.
            if let Err(err) = action {
                debug!(error = %err, url = %event.request.url, "interception action failed");
            }
        }
    });

    Ok(())
}

/// Forward document-level load failures to the authenticator.
///
/// `Network.loadingFailed` carries only a request id, so request ids are
/// mapped back to their URLs as requests go out; the authenticator needs the
/// failing URL to suppress its own termination cancellation.
pub(crate) async fn wire_failure_reporting(
    page: &Page,
    authenticator: Arc<Mutex<RedirectAuthenticator<ChromiumSurface>>>,
) -> Result<()> {
    let mut sent_events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .context("Failed to listen for outgoing requests")?;
    let mut failed_events = page
        .event_listener::<EventLoadingFailed>()
        .await
        .context("Failed to listen for navigation failures")?;

    tokio::spawn(async move {
        let mut request_urls: HashMap<RequestId, String> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = sent_events.next() => {
                    request_urls.insert(event.request_id.clone(), event.request.url.clone());
                }
                Some(event) = failed_events.next() => {
                    if event.r#type != ResourceType::Document {
                        continue;
                    }
                    let failing_url = request_urls
                        .get(&event.request_id)
                        .and_then(|raw| Url::parse(raw).ok());
                    authenticator
                        .lock()
                        .await
                        .navigation_failed(failing_url.as_ref(), &event.error_text);
                }
                else => break,
            }
        }
    });

    Ok(())
}

/// Take the pending form if this paused request is its navigation.
async fn take_matching_form(
    pending: &Arc<Mutex<Option<FormRequest>>>,
    event: &EventRequestPaused,
) -> Option<FormRequest> {
    if event.resource_type != ResourceType::Document {
        return None;
    }
    let mut slot = pending.lock().await;
    let matches = slot
        .as_ref()
        .map(|form| {
            Url::parse(&event.request.url)
                .map(|url| url == form.url)
                .unwrap_or(false)
        })
        .unwrap_or(false);
    if matches {
        slot.take()
    } else {
        None
    }
}

fn continue_as_form_post(event: &EventRequestPaused, form: &FormRequest) -> ContinueRequestParams {
    ContinueRequestParams {
        request_id: event.request_id.clone(),
        url: None,
        method: Some(FormRequest::METHOD.to_string()),
        post_data: Some(form.body.clone().into()),
        headers: Some(vec![HeaderEntry {
            name: "Content-Type".to_string(),
            value: FormRequest::CONTENT_TYPE.to_string(),
        }]),
        intercept_response: None,
    }
}

fn plain_continue(event: &EventRequestPaused) -> ContinueRequestParams {
    ContinueRequestParams {
        request_id: event.request_id.clone(),
        url: None,
        method: None,
        post_data: None,
        headers: None,
        intercept_response: None,
    }
}

/// Find a Chrome/Chromium executable on this machine.
fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(|candidate| candidate.to_string())
}
