use thiserror::Error;

/// Terminal failure of a single authentication attempt.
///
/// Every failure is reported through the same outcome channel as success;
/// callers distinguish by variant. None of these are fatal to the process,
/// the attempt simply ends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The authentication request could not be built. Nothing was sent.
    #[error("failed to encode authentication request: {0}")]
    Encoding(String),

    /// The browsing surface reported a navigation failure that was not caused
    /// by the authenticator cancelling the termination navigation itself.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The document-scraping script could not be executed.
    #[error("script execution failed: {0}")]
    ScriptExecution(String),
}
