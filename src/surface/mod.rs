//! The embedded browsing surface the authenticator drives.
//!
//! The surface is an external capability: load a request and render the
//! response, and execute a script against the currently rendered document.
//! Navigation policy decisions and failure reports flow back into the
//! authenticator from whatever event loop drives the implementation.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

/// An outbound authentication request, ready for the wire.
#[derive(Debug, Clone)]
pub struct FormRequest {
    /// Destination the form body is POSTed to.
    pub url: Url,
    /// URL-form-encoded body, already percent-encoded.
    pub body: String,
}

impl FormRequest {
    pub const METHOD: &'static str = "POST";
    pub const CONTENT_TYPE: &'static str = "application/x-www-form-urlencoded";
}

/// Capability contract the authenticator requires from an embedded browser.
///
/// This is intentionally minimal: the authenticator owns the surface for the
/// lifetime of one attempt, and nothing else may navigate it concurrently.
#[async_trait]
pub trait BrowsingSurface: Send + Sync {
    /// Issue the request and render its response.
    ///
    /// Completion (or failure) of the resulting navigation arrives later as
    /// events; this only starts the load.
    async fn submit(&self, request: &FormRequest) -> Result<()>;

    /// Execute the document-scraping script against the currently rendered
    /// page and return its string result.
    async fn document_html(&self) -> Result<String>;
}
