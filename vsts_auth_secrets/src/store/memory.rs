use std::collections::HashMap;
use std::sync::Mutex;

use super::SecretStore;

/// An insecure, process-local secret store
///
/// Secrets live in a plain map for the lifetime of the process. Useful as a
/// default when no platform-specific store is configured, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryStore<S> {
    secrets: Mutex<HashMap<String, S>>,
}

impl<S> InMemoryStore<S> {
    /// Constructs a new, empty store
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: Clone + Send + Sync> SecretStore<S> for InMemoryStore<S> {
    fn get(&self, key: &str) -> Option<S> {
        self.secrets.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, secret: S) -> bool {
        self.secrets.lock().unwrap().insert(key.to_owned(), secret);
        true
    }

    fn delete(&self, key: &str) -> bool {
        self.secrets.lock().unwrap().remove(key).is_some()
    }
}
