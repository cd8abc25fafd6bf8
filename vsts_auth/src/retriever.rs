//! The cache-aware secret acquisition state machine
//!
//! Every authenticator funnels through [`retrieve`]: read the store, validate
//! what was found, refresh when the acquirer knows how, and only then run the
//! acquirer's interactive or non-interactive flow. A freshly acquired or
//! refreshed secret is written back to the store before it is returned.
//!
//! The ladder is gated by [`PromptBehavior`]:
//!
//! * `Never` returns whatever the store holds, unvalidated, and never mutates
//!   the store.
//! * `Auto` accepts a stored secret that validates, refreshes one that does
//!   not, and acquires fresh as a last resort.
//! * `Always` skips the store read entirely and acquires fresh.

use async_trait::async_trait;
use tracing::debug;
use vsts_auth_secrets::SecretStore;

use crate::Error;

/// How far an acquisition is allowed to go when the cache cannot satisfy it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PromptBehavior {
    /// Use the cache when it validates; otherwise refresh or prompt
    #[default]
    Auto,
    /// Ignore the cache and run the flow unconditionally
    Always,
    /// Answer from the cache only; never validate, refresh, or prompt
    Never,
}

/// An acquirer the retriever can fall back to on a cache miss
///
/// `acquire` runs the flow and reports recoverable failures as `Ok(None)` so
/// the caller can decide whether to give up. The device flow is the one
/// place that surfaces terminal errors instead, because its caller has no
/// cheaper recourse.
#[async_trait]
pub trait SecretAcquirer<S>: Send + Sync {
    /// Runs the flow that produces a fresh secret
    async fn acquire(&self) -> Result<Option<S>, Error>;

    /// Checks whether a stored secret is still usable
    ///
    /// The default accepts any stored value.
    async fn validate(&self, _secret: &S) -> bool {
        true
    }

    /// Derives a replacement from a stored-but-invalid secret
    ///
    /// The default cannot refresh.
    async fn refresh(&self, _secret: &S) -> Option<S> {
        None
    }
}

/// Runs the acquisition state machine for one key
pub async fn retrieve<S: Clone + Send + Sync>(
    key: &str,
    store: &dyn SecretStore<S>,
    prompt: PromptBehavior,
    acquirer: &dyn SecretAcquirer<S>,
) -> Result<Option<S>, Error> {
    if prompt != PromptBehavior::Always {
        let stored = store.get(key);

        if prompt == PromptBehavior::Never {
            debug!(key, found = stored.is_some(), "prompt suppressed; answering from cache");
            return Ok(stored);
        }

        if let Some(secret) = stored {
            if acquirer.validate(&secret).await {
                debug!(key, "stored secret validated");
                return Ok(Some(secret));
            }

            if let Some(refreshed) = acquirer.refresh(&secret).await {
                debug!(key, "stored secret refreshed");
                store.put(key, refreshed.clone());
                return Ok(Some(refreshed));
            }

            debug!(key, "stored secret is stale and could not be refreshed");
        }
    }

    let acquired = acquirer.acquire().await?;
    if let Some(secret) = &acquired {
        store.put(key, secret.clone());
    }
    Ok(acquired)
}
