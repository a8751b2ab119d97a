//! The redirect/intercept/extract state machine at the heart of the flow.
//!
//! A [`RedirectAuthenticator`] POSTs the authentication request to the ACS,
//! lets the issuer's challenge pages navigate freely, and intercepts the
//! first navigation whose destination host is the fixed termination host.
//! That navigation is never rendered; instead the currently loaded document
//! is scraped for the `MD`/`PaRes` fields and the outcome is delivered
//! exactly once through a single-shot channel.

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AuthenticationConfig;
use crate::error::AuthenticationError;
use crate::extract;
use crate::surface::{BrowsingSurface, FormRequest};

/// Fixed endpoint the ACS is instructed to redirect to on completion.
///
/// This is a synthetic sink, not real content: reaching it means "the ACS is
/// done", and the navigation to it is always cancelled before rendering.
pub const TERMINATION_URL: &str = "https://www.google.com";

/// Host component of [`TERMINATION_URL`], compared exactly against each
/// navigation destination.
pub const TERMINATION_HOST: &str = "www.google.com";

/// Outcome of one authentication attempt, produced at most once.
pub type AttemptOutcome = Result<AuthTokens, AuthenticationError>;

/// The two tokens scraped from the termination page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    /// Merchant data token, echoed back unchanged by the ACS.
    pub md: String,
    /// Payer-authentication-response payload, the actual result token.
    pub pa_res: String,
}

/// Policy decision for a single navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the browsing surface perform the navigation normally.
    Allow,
    /// The surface must not fetch or render this destination.
    Cancel,
}

/// Lifecycle of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// No request issued yet.
    Idle,
    /// The POST went out; challenge navigations are in flight.
    AwaitingResponse,
    /// An outcome has been delivered. Absorbing: all further events are
    /// ignored.
    Terminated,
}

/// Drives one authentication attempt over an exclusively-owned surface.
pub struct RedirectAuthenticator<S> {
    surface: S,
    state: AttemptState,
    outcome: Option<oneshot::Sender<AttemptOutcome>>,
}

impl<S: BrowsingSurface> RedirectAuthenticator<S> {
    /// Create an authenticator owning `surface`, returning the receive half
    /// of its outcome channel.
    ///
    /// Dropping the receiver is fine: delivery then becomes a no-op rather
    /// than an error.
    pub fn new(surface: S) -> (Self, oneshot::Receiver<AttemptOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                surface,
                state: AttemptState::Idle,
                outcome: Some(tx),
            },
            rx,
        )
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Build and issue the authentication POST.
    ///
    /// If any of the three form fields cannot be transport-encoded the
    /// attempt never starts: the failure is delivered through the outcome
    /// channel and no request is sent.
    pub async fn start(&mut self, config: &AuthenticationConfig) {
        if self.state != AttemptState::Idle {
            return;
        }

        let request = match build_request(config) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "could not encode authentication request");
                self.deliver(Err(err));
                return;
            }
        };

        info!(acs_url = %request.url, "issuing authentication request");
        self.state = AttemptState::AwaitingResponse;

        if let Err(err) = self.surface.submit(&request).await {
            self.deliver(Err(AuthenticationError::Navigation(err.to_string())));
            self.state = AttemptState::Terminated;
        }
    }

    /// Decide whether the surface may perform a navigation.
    ///
    /// Non-termination hosts (issuer challenge pages, redirects) are always
    /// allowed. A termination-host destination is cancelled and triggers
    /// extraction from the currently rendered document. If the document does
    /// not carry both fields the event is dropped silently: a page that
    /// merely points at the termination host is not treated as a result.
    pub async fn decide_navigation(&mut self, destination: &Url) -> NavigationDecision {
        if self.state != AttemptState::AwaitingResponse {
            return NavigationDecision::Allow;
        }

        if destination.host_str() != Some(TERMINATION_HOST) {
            debug!(url = %destination, "allowing navigation");
            return NavigationDecision::Allow;
        }

        info!(url = %destination, "termination host reached, intercepting");
        match self.surface.document_html().await {
            Ok(html) => match extract::authentication_result(&html) {
                Some((md, pa_res)) => {
                    info!("authentication result extracted");
                    self.deliver(Ok(AuthTokens { md, pa_res }));
                    self.state = AttemptState::Terminated;
                }
                None => {
                    warn!(
                        url = %destination,
                        "termination page is missing authentication fields, ignoring"
                    );
                }
            },
            Err(err) => {
                self.deliver(Err(AuthenticationError::ScriptExecution(err.to_string())));
                self.state = AttemptState::Terminated;
            }
        }

        NavigationDecision::Cancel
    }

    /// Report a provisional or final navigation failure.
    ///
    /// Failures whose destination is the termination host are the echo of
    /// the authenticator's own cancellation and are suppressed.
    pub fn navigation_failed(&mut self, failing_url: Option<&Url>, message: &str) {
        if self.state != AttemptState::AwaitingResponse {
            return;
        }

        if failing_url.and_then(Url::host_str) == Some(TERMINATION_HOST) {
            debug!("suppressing failure for cancelled termination navigation");
            return;
        }

        self.deliver(Err(AuthenticationError::Navigation(message.to_string())));
        self.state = AttemptState::Terminated;
    }

    fn deliver(&mut self, outcome: AttemptOutcome) {
        let Some(tx) = self.outcome.take() else {
            return;
        };
        if tx.send(outcome).is_err() {
            debug!("outcome receiver dropped, discarding result");
        }
    }
}

/// Build the outbound POST for one attempt.
///
/// The body carries exactly `MD`, `TermUrl`, and `PaReq`, in that order.
/// Values are percent-encoded so that `+` and `&` can never survive as
/// literals inside a field and corrupt the form structure.
fn build_request(config: &AuthenticationConfig) -> Result<FormRequest, AuthenticationError> {
    let url = Url::parse(&config.acs_url)
        .map_err(|err| AuthenticationError::Encoding(format!("invalid ACS URL: {err}")))?;

    let body = format!(
        "MD={}&TermUrl={}&PaReq={}",
        urlencoding::encode(&config.md),
        urlencoding::encode(TERMINATION_URL),
        urlencoding::encode(&config.pa_req),
    );

    Ok(FormRequest { url, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(md: &str, pa_req: &str) -> AuthenticationConfig {
        AuthenticationConfig {
            acs_url: "https://acs.issuer.example/auth".to_string(),
            md: md.to_string(),
            pa_req: pa_req.to_string(),
        }
    }

    #[test]
    fn body_field_order_is_fixed() {
        let request = build_request(&config("merchant-data", "payload")).unwrap();
        assert_eq!(
            request.body,
            format!(
                "MD=merchant-data&TermUrl={}&PaReq=payload",
                urlencoding::encode(TERMINATION_URL)
            )
        );
    }

    #[test]
    fn body_round_trips_through_percent_decoding() {
        let md = "a+b&c=d efg%";
        let pa_req = "eJxVUtt&+2gIQ==";
        let request = build_request(&config(md, pa_req)).unwrap();

        let pairs: Vec<(&str, &str)> = request
            .body
            .split('&')
            .map(|pair| pair.split_once('=').unwrap())
            .collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0, "MD");
        assert_eq!(pairs[1].0, "TermUrl");
        assert_eq!(pairs[2].0, "PaReq");

        assert_eq!(urlencoding::decode(pairs[0].1).unwrap(), md);
        assert_eq!(urlencoding::decode(pairs[1].1).unwrap(), TERMINATION_URL);
        assert_eq!(urlencoding::decode(pairs[2].1).unwrap(), pa_req);
    }

    #[test]
    fn plus_and_ampersand_never_survive_in_values() {
        let request = build_request(&config("a+b&c", "d&e+f")).unwrap();
        for (_, value) in request.body.split('&').map(|p| p.split_once('=').unwrap()) {
            assert!(!value.contains('+'));
        }
        // Exactly the two structural separators remain.
        assert_eq!(request.body.matches('&').count(), 2);
    }

    #[test]
    fn invalid_acs_url_is_an_encoding_error() {
        let bad = AuthenticationConfig {
            acs_url: "not a url".to_string(),
            md: "md".to_string(),
            pa_req: "pareq".to_string(),
        };
        match build_request(&bad) {
            Err(AuthenticationError::Encoding(_)) => {}
            other => panic!("expected encoding error, got {other:?}"),
        }
    }
}
