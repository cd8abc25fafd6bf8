//! The interactive user-agent seam
//!
//! The OAuth2 authenticator drives a browser it does not own. A [`UserAgent`]
//! navigates the user to the authorize URL and hands back whatever the
//! authority redirected with; the authenticator does the state verification
//! and code exchange. When no agent is available the flow falls back to the
//! device flow, per [`UserAgentProvider`].

use async_trait::async_trait;
use url::Url;

use crate::braids::AuthorizationCode;

/// What the authority redirected back with after interactive sign-in
#[derive(Debug)]
pub struct AuthorizationResponse {
    /// The authorization code to exchange at the token endpoint
    pub code: AuthorizationCode,
    /// The `state` echoed back by the authority, when present
    pub state: Option<String>,
}

/// An interactive browser the OAuth2 flow can drive
#[async_trait]
pub trait UserAgent: Send + Sync {
    /// Whether the agent can run right now
    fn is_available(&self) -> bool {
        true
    }

    /// A one-shot attempt to provision a missing runtime
    ///
    /// Only consulted when [`is_available`][Self::is_available] is false and
    /// configuration selected a provider that can bootstrap itself. Returns
    /// whether the agent became available.
    async fn prepare(&self) -> bool {
        false
    }

    /// Shows `authorization_url` and waits for the redirect to `redirect_uri`
    ///
    /// Returns `None` when the user closes the window or the redirect never
    /// carries a code.
    async fn request_authorization_code(
        &self,
        authorization_url: &Url,
        redirect_uri: &str,
    ) -> Option<AuthorizationResponse>;
}

/// Which interactive provider the configuration selects
///
/// `Swt` differs from `Jfx` only in that an unavailable agent is given one
/// [`UserAgent::prepare`] attempt before the flow falls back to the device
/// flow. `None` skips the interactive path entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserAgentProvider {
    /// The default embedded-browser provider
    #[default]
    Jfx,
    /// The embedded-browser provider with a runtime bootstrap attempt
    Swt,
    /// No interactive provider; device flow or nothing
    None,
}
