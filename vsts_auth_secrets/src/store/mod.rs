//! Pluggable secret storage
//!
//! A [`SecretStore`] is an opaque key-value map of secrets. The in-memory
//! and XML-file implementations live here; OS keychain backends implement
//! the same trait in their own crates.

mod memory;

#[cfg(feature = "file")]
mod file;
#[cfg(feature = "file")]
mod xml;

pub use memory::InMemoryStore;

#[cfg(feature = "file")]
pub use file::{FileCredentialStore, FileTokenStore, InsecureFileBackend};

/// A store of secrets of one kind, addressed by opaque keys
///
/// Implementations serialize their own operations; callers may share one
/// store across retrievers without external locking. Two retrievers racing
/// on the same key are permitted; the last successful `put` wins.
///
/// `put` and `delete` report success: `put` returns `true` when the store
/// accepted and persisted the write (whether or not it replaced an earlier
/// value), and `delete` returns `true` when an entry was removed. Backend
/// failures are logged by the implementation and reported as `false`; `get`
/// reports them as `None`.
pub trait SecretStore<S>: Send + Sync {
    /// Reads the secret stored under `key`, if any
    fn get(&self, key: &str) -> Option<S>;

    /// Writes `secret` under `key`, replacing any existing entry
    fn put(&self, key: &str, secret: S) -> bool;

    /// Removes the entry under `key`
    fn delete(&self, key: &str) -> bool;
}
