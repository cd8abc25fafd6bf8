use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::Uri;
use vsts_auth_secrets::{Credential, SecretStore};

use super::{secret_key, Authenticator};
use crate::retriever::{retrieve, SecretAcquirer};
use crate::{Error, PromptBehavior};

const AUTH_TYPE: &str = "BasicAuth";

/// Asks the user for a username and password
///
/// The host application owns the UI; returning `None` means the user
/// declined.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Prompts for the credentials to use against `target`
    async fn prompt_for_credentials(&self, target: &Uri) -> Option<Credential>;
}

/// Username/password authentication against on-premises servers
pub struct BasicAuthenticator {
    store: Arc<dyn SecretStore<Credential>>,
    prompt: Arc<dyn CredentialPrompt>,
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BasicAuthenticator").finish_non_exhaustive()
    }
}

impl BasicAuthenticator {
    /// Constructs an authenticator over a credential store and a prompt
    pub fn new(store: Arc<dyn SecretStore<Credential>>, prompt: Arc<dyn CredentialPrompt>) -> Self {
        Self { store, prompt }
    }
}

struct PromptAcquirer<'a> {
    prompt: &'a dyn CredentialPrompt,
    target: &'a Uri,
}

#[async_trait]
impl SecretAcquirer<Credential> for PromptAcquirer<'_> {
    async fn acquire(&self) -> Result<Option<Credential>, Error> {
        Ok(self.prompt.prompt_for_credentials(self.target).await)
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    fn auth_type(&self) -> &'static str {
        AUTH_TYPE
    }

    fn supports_credential(&self) -> bool {
        true
    }

    async fn get_credential(
        &self,
        target: &Uri,
        prompt: PromptBehavior,
    ) -> Result<Option<Credential>, Error> {
        let key = secret_key(AUTH_TYPE, Some(target));
        let acquirer = PromptAcquirer {
            prompt: &*self.prompt,
            target,
        };
        retrieve(&key, &*self.store, prompt, &acquirer).await
    }

    async fn sign_out(&self, target: Option<&Uri>) -> bool {
        self.store.delete(&secret_key(AUTH_TYPE, target))
    }
}
