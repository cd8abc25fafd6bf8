//! The authenticator facade
//!
//! One authenticator per authentication world, each owning exactly one
//! secret store and one acquisition flow. The facade never synthesizes a
//! secret itself; every operation composes the [`retriever`][crate::retriever]
//! state machine with the store and the flow. Capabilities are reported, not
//! thrown: calling an operation an authenticator does not support answers
//! `Ok(None)`.

use async_trait::async_trait;
use http::Uri;
use vsts_auth_secrets::{key, Credential, Token, TokenPair, VsoTokenScope};

use crate::pat::GLOBAL_SENTINEL_URI;
use crate::{Error, PromptBehavior};

mod basic;
mod oauth2;
mod pat;

pub use basic::{BasicAuthenticator, CredentialPrompt};
pub use oauth2::{OAuth2Authenticator, OAuth2AuthenticatorBuilder};
pub use pat::PatAuthenticator;

/// A uniform accessor over one authentication world
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The namespace this authenticator keys its secrets under
    fn auth_type(&self) -> &'static str;

    /// Whether [`get_credential`][Self::get_credential] can succeed
    fn supports_credential(&self) -> bool {
        false
    }

    /// Whether [`get_oauth2_token_pair`][Self::get_oauth2_token_pair] can succeed
    fn supports_oauth2(&self) -> bool {
        false
    }

    /// Whether [`get_personal_access_token`][Self::get_personal_access_token]
    /// can succeed
    fn supports_personal_access_token(&self) -> bool {
        false
    }

    /// A username/password credential for the target
    async fn get_credential(
        &self,
        _target: &Uri,
        _prompt: PromptBehavior,
    ) -> Result<Option<Credential>, Error> {
        Ok(None)
    }

    /// An OAuth2 token pair for the target, or for the global sentinel when
    /// no target is given
    async fn get_oauth2_token_pair(
        &self,
        _target: Option<&Uri>,
        _prompt: PromptBehavior,
    ) -> Result<Option<TokenPair>, Error> {
        Ok(None)
    }

    /// A personal access token for the target, or a cross-account token when
    /// no target is given
    ///
    /// A cached token under the key is reused regardless of the scope it was
    /// minted with. `oauth_override` short-circuits the OAuth2 bootstrap
    /// with a pair the caller already holds.
    async fn get_personal_access_token(
        &self,
        _target: Option<&Uri>,
        _scope: &VsoTokenScope,
        _display_name: &str,
        _prompt: PromptBehavior,
        _oauth_override: Option<&TokenPair>,
    ) -> Result<Option<Token>, Error> {
        Ok(None)
    }

    /// Forgets the secret cached for the target
    ///
    /// Returns whether an entry was removed. Nothing is revoked server-side.
    async fn sign_out(&self, target: Option<&Uri>) -> bool;
}

/// The sentinel URI as a parsed [`Uri`]
pub(crate) fn global_sentinel() -> Uri {
    GLOBAL_SENTINEL_URI
        .parse()
        .expect("the global sentinel URI is well-formed")
}

/// The store key for a target (or the sentinel) under a namespace
pub(crate) fn secret_key(auth_type: &str, target: Option<&Uri>) -> String {
    match target {
        Some(target) => key::uri_to_key(target, auth_type),
        None => key::uri_to_key(&global_sentinel(), auth_type),
    }
}
