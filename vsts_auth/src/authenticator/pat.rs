use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::Uri;
use tracing::{debug, warn};
use vsts_auth_secrets::{SecretStore, Token, TokenPair, VsoTokenScope};

use super::{global_sentinel, secret_key, Authenticator, OAuth2Authenticator};
use crate::http::HttpClient;
use crate::pat::{is_hosted, VsoAuthority, GLOBAL_SENTINEL_URI};
use crate::retriever::{retrieve, SecretAcquirer};
use crate::{Error, PromptBehavior};

const AUTH_TYPE: &str = "PersonalAccessToken";

/// Personal access token authentication against hosted accounts
///
/// Bootstraps an OAuth2 token pair through the wrapped
/// [`OAuth2Authenticator`], then mints a PAT against the platform's identity
/// service. Cached PATs are validated against the target's connection-data
/// endpoint and reused regardless of the scope they were minted with.
pub struct PatAuthenticator {
    store: Arc<dyn SecretStore<Token>>,
    oauth: Arc<OAuth2Authenticator>,
    vso: VsoAuthority,
}

impl fmt::Debug for PatAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PatAuthenticator")
            .field("oauth", &self.oauth)
            .finish_non_exhaustive()
    }
}

impl PatAuthenticator {
    /// Constructs an authenticator over a token store and an OAuth2 bootstrap
    pub fn new(
        store: Arc<dyn SecretStore<Token>>,
        oauth: Arc<OAuth2Authenticator>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            store,
            oauth,
            vso: VsoAuthority::new(http),
        }
    }

    /// A cross-account PAT, cached under the global sentinel
    pub async fn get_global_pat(
        &self,
        scope: &VsoTokenScope,
        display_name: &str,
        prompt: PromptBehavior,
    ) -> Result<Option<Token>, Error> {
        self.get_personal_access_token(None, scope, display_name, prompt, None)
            .await
    }

    /// Rebinds the cached cross-account PAT to a specific account
    ///
    /// Copies the global sentinel's entry to `target`'s key. Idempotent;
    /// returns whether a global PAT existed.
    pub fn assign_global_pat_to(&self, target: &Uri) -> bool {
        match self.store.get(&secret_key(AUTH_TYPE, None)) {
            Some(token) => {
                self.store.put(&secret_key(AUTH_TYPE, Some(target)), token);
                true
            }
            None => false,
        }
    }
}

struct PatAcquirer<'a> {
    authenticator: &'a PatAuthenticator,
    target: Uri,
    global: bool,
    scope: &'a VsoTokenScope,
    display_name: &'a str,
    prompt: PromptBehavior,
    oauth_override: Option<&'a TokenPair>,
}

#[async_trait]
impl SecretAcquirer<Token> for PatAcquirer<'_> {
    async fn acquire(&self) -> Result<Option<Token>, Error> {
        let this = self.authenticator;

        let pair = match self.oauth_override {
            Some(pair) => pair.clone(),
            None => {
                let sentinel = global_sentinel();
                match this
                    .oauth
                    .get_oauth2_token_pair(Some(&sentinel), self.prompt)
                    .await?
                {
                    Some(pair) => pair,
                    None => {
                        debug!("no OAuth2 token pair; cannot mint a PAT");
                        return Ok(None);
                    }
                }
            }
        };
        let access = pair.access_token();

        let issue_target = if self.global {
            match this.vso.resolve_account_uri(access).await {
                Ok(account) => account,
                Err(error) => {
                    warn!(error = %error, "unable to resolve an account for a global PAT");
                    return Ok(None);
                }
            }
        } else {
            self.target.clone()
        };

        let issued = this
            .vso
            .generate_personal_access_token(
                &issue_target,
                access,
                self.scope,
                self.display_name,
                self.global,
            )
            .await;

        match issued {
            Ok(token) => Ok(token),
            Err(error @ (Error::Upstream { .. } | Error::Transport(_))) => {
                warn!(error = %error, "PAT issuance failed");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn validate(&self, token: &Token) -> bool {
        self.authenticator
            .vso
            .validate_token(&self.target, token)
            .await
    }
}

#[async_trait]
impl Authenticator for PatAuthenticator {
    fn auth_type(&self) -> &'static str {
        AUTH_TYPE
    }

    fn supports_personal_access_token(&self) -> bool {
        true
    }

    async fn get_personal_access_token(
        &self,
        target: Option<&Uri>,
        scope: &VsoTokenScope,
        display_name: &str,
        prompt: PromptBehavior,
        oauth_override: Option<&TokenPair>,
    ) -> Result<Option<Token>, Error> {
        let target_uri = target.cloned().unwrap_or_else(global_sentinel);
        if !is_hosted(&target_uri) {
            return Err(Error::invalid_input(format!(
                "personal access tokens are only issued for hosted accounts, not {target_uri}"
            )));
        }

        let global = target.is_none()
            || target_uri.to_string().trim_end_matches('/') == GLOBAL_SENTINEL_URI;
        let key = secret_key(AUTH_TYPE, Some(&target_uri));
        let acquirer = PatAcquirer {
            authenticator: self,
            target: target_uri,
            global,
            scope,
            display_name,
            prompt,
            oauth_override,
        };
        retrieve(&key, &*self.store, prompt, &acquirer).await
    }

    async fn sign_out(&self, target: Option<&Uri>) -> bool {
        self.store.delete(&secret_key(AUTH_TYPE, target))
    }
}
