use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::xml::{from_xml, to_xml, StoreContents};
use super::SecretStore;
use crate::{Credential, Token};

const STORE_DIR: &str = "VSTeamServicesAuthPlugin";
const STORE_FILE: &str = "insecureStore.xml";

/// The shared plain-XML secret file
///
/// One backend owns the `insecureStore.xml` document and holds both the
/// token and credential sections in memory. Every mutation rewrites the
/// whole file. Wrap the backend in [`FileTokenStore`] or
/// [`FileCredentialStore`] to expose one section as a [`SecretStore`].
///
/// The file is world-readable plaintext on platforms without a keychain;
/// on Unix the backend narrows it to owner-only permissions, which is as
/// much as a portable file store can do.
#[derive(Debug)]
pub struct InsecureFileBackend {
    path: PathBuf,
    state: Mutex<StoreContents>,
}

impl InsecureFileBackend {
    /// Opens the store file at `path`, creating an empty store if absent
    ///
    /// An unreadable or malformed file is treated as empty; the file on
    /// disk is left alone until the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Mutex::new(load(&path));
        Self { path, state }
    }

    /// Opens the store file at its per-user default location
    pub fn open_default() -> Self {
        Self::open(default_path())
    }

    /// The location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut StoreContents) -> bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if !f(&mut state) {
            return false;
        }
        self.save(&state)
    }

    fn save(&self, state: &StoreContents) -> bool {
        let document = match to_xml(state) {
            Ok(document) => document,
            Err(error) => {
                warn!(error = (&error as &dyn std::error::Error), "unable to serialize secret store");
                return false;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                warn!(
                    error = (&error as &dyn std::error::Error),
                    path = %parent.display(),
                    "unable to create secret store directory"
                );
                return false;
            }
        }

        if let Err(error) = fs::write(&self.path, document) {
            warn!(
                error = (&error as &dyn std::error::Error),
                path = %self.path.display(),
                "unable to write secret store"
            );
            return false;
        }

        restrict_permissions(&self.path);
        true
    }

    fn get_token(&self, key: &str) -> Option<Token> {
        self.state.lock().unwrap().tokens.get(key).cloned()
    }

    fn put_token(&self, key: &str, token: Token) -> bool {
        self.mutate(|state| {
            state.tokens.insert(key.to_owned(), token);
            true
        })
    }

    fn delete_token(&self, key: &str) -> bool {
        self.mutate(|state| state.tokens.remove(key).is_some())
    }

    fn get_credential(&self, key: &str) -> Option<Credential> {
        self.state.lock().unwrap().credentials.get(key).cloned()
    }

    fn put_credential(&self, key: &str, credential: Credential) -> bool {
        self.mutate(|state| {
            state.credentials.insert(key.to_owned(), credential);
            true
        })
    }

    fn delete_credential(&self, key: &str) -> bool {
        self.mutate(|state| state.credentials.remove(key).is_some())
    }
}

fn load(path: &Path) -> StoreContents {
    let document = match fs::read_to_string(path) {
        Ok(document) => document,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no secret store file; starting empty");
            return StoreContents::default();
        }
        Err(error) => {
            warn!(
                error = (&error as &dyn std::error::Error),
                path = %path.display(),
                "unable to read secret store; starting empty"
            );
            return StoreContents::default();
        }
    };

    match from_xml(&document) {
        Ok(contents) => contents,
        Err(error) => {
            warn!(
                error = (&error as &dyn std::error::Error),
                path = %path.display(),
                "secret store file is corrupt; starting empty"
            );
            StoreContents::default()
        }
    }
}

#[cfg(windows)]
fn default_path() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .unwrap_or_default()
        .join(STORE_DIR)
        .join(STORE_FILE)
}

#[cfg(not(windows))]
fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(format!(".{STORE_DIR}"))
        .join(STORE_FILE)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!(
            error = (&error as &dyn std::error::Error),
            path = %path.display(),
            "unable to restrict secret store permissions"
        );
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// The token section of a shared [`InsecureFileBackend`]
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    backend: Arc<InsecureFileBackend>,
}

impl FileTokenStore {
    /// Exposes the token section of `backend`
    pub fn new(backend: Arc<InsecureFileBackend>) -> Self {
        Self { backend }
    }
}

impl SecretStore<Token> for FileTokenStore {
    fn get(&self, key: &str) -> Option<Token> {
        self.backend.get_token(key)
    }

    fn put(&self, key: &str, secret: Token) -> bool {
        self.backend.put_token(key, secret)
    }

    fn delete(&self, key: &str) -> bool {
        self.backend.delete_token(key)
    }
}

/// The credential section of a shared [`InsecureFileBackend`]
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    backend: Arc<InsecureFileBackend>,
}

impl FileCredentialStore {
    /// Exposes the credential section of `backend`
    pub fn new(backend: Arc<InsecureFileBackend>) -> Self {
        Self { backend }
    }
}

impl SecretStore<Credential> for FileCredentialStore {
    fn get(&self, key: &str) -> Option<Credential> {
        self.backend.get_credential(key)
    }

    fn put(&self, key: &str, secret: Credential) -> bool {
        self.backend.put_credential(key, secret)
    }

    fn delete(&self, key: &str) -> bool {
        self.backend.delete_credential(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenKind;

    #[test]
    fn secrets_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let backend = Arc::new(InsecureFileBackend::open(&path));
        let tokens = FileTokenStore::new(Arc::clone(&backend));
        let credentials = FileCredentialStore::new(Arc::clone(&backend));

        let token = Token::new("pat-value", TokenKind::Personal).unwrap();
        assert!(tokens.put("PersonalAccessToken:https://ms.visualstudio.com", token.clone()));
        assert!(credentials.put("BasicAuth:http://tfs.local:8080", Credential::new("u", "p")));
        drop((tokens, credentials, backend));

        let reopened = InsecureFileBackend::open(&path);
        assert_eq!(
            reopened.get_token("PersonalAccessToken:https://ms.visualstudio.com"),
            Some(token)
        );
        assert_eq!(
            reopened.get_credential("BasicAuth:http://tfs.local:8080"),
            Some(Credential::new("u", "p"))
        );
    }

    #[test]
    fn token_and_credential_sections_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(InsecureFileBackend::open(dir.path().join(STORE_FILE)));
        let tokens = FileTokenStore::new(Arc::clone(&backend));
        let credentials = FileCredentialStore::new(Arc::clone(&backend));

        tokens.put("shared-key", Token::new("v", TokenKind::Access).unwrap());
        credentials.put("shared-key", Credential::new("u", "p"));

        assert!(tokens.delete("shared-key"));
        assert_eq!(credentials.get("shared-key"), Some(Credential::new("u", "p")));
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_preserved_until_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        fs::write(&path, "<insecureStore><Tokens>").unwrap();

        let backend = InsecureFileBackend::open(&path);
        assert_eq!(backend.get_token("any"), None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "<insecureStore><Tokens>");

        assert!(backend.put_token("k", Token::new("v", TokenKind::Test).unwrap()));
        assert!(fs::read_to_string(&path).unwrap().starts_with("<?xml"));
    }

    #[test]
    fn missing_file_appears_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(STORE_FILE);

        let backend = InsecureFileBackend::open(&path);
        assert!(!path.exists());
        assert!(backend.put_credential("k", Credential::new("u", "p")));
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        let backend = InsecureFileBackend::open(&path);
        backend.put_token("k", Token::new("v", TokenKind::Personal).unwrap());

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
