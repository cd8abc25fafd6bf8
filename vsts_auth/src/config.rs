//! Per-user library settings
//!
//! Settings come from a `settings.properties` file in the per-user settings
//! folder, in `key=value` form, with the process environment as a fallback
//! for keys the file does not define. The loader never writes back to the
//! file and never mutates the process environment; the legacy
//! `doNotSetSystemEnv` switch is parsed for compatibility but has no effect.
//!
//! Recognized keys:
//!
//! * `userAgentProvider`: `jfx`, `swt`, or `none`
//! * `http.proxyHost` / `http.proxyPort`
//! * `doNotSetSystemEnv`: ignored, see above

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::oauth::agent::UserAgentProvider;

const SETTINGS_FILE: &str = "settings.properties";

/// The key selecting the interactive user-agent provider
pub const USER_AGENT_PROVIDER: &str = "userAgentProvider";
/// The proxy host key
pub const PROXY_HOST: &str = "http.proxyHost";
/// The proxy port key
pub const PROXY_PORT: &str = "http.proxyPort";

/// The loaded per-user settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    properties: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the per-user settings folder
    pub fn load() -> Self {
        Self::from_file(settings_folder().join(SETTINGS_FILE))
    }

    /// Loads settings from a specific properties file
    ///
    /// A missing or unreadable file yields empty settings; lookups then fall
    /// through to the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file");
                Self::default()
            }
            Err(error) => {
                warn!(
                    error = (&error as &dyn std::error::Error),
                    path = %path.display(),
                    "unable to read settings file"
                );
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Self {
        let mut properties = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                properties.insert(key.trim().to_owned(), value.trim().to_owned());
            }
        }
        Self { properties }
    }

    /// Looks up a setting, file value first, process environment second
    pub fn get(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// The configured interactive user-agent provider
    pub fn user_agent_provider(&self) -> UserAgentProvider {
        match self.get(USER_AGENT_PROVIDER).as_deref() {
            Some("swt") => UserAgentProvider::Swt,
            Some("none") => UserAgentProvider::None,
            Some("jfx") | None => UserAgentProvider::Jfx,
            Some(other) => {
                warn!(provider = other, "unrecognized user-agent provider; using the default");
                UserAgentProvider::Jfx
            }
        }
    }

    /// The proxy URL, when both host and port are configured
    pub fn proxy_url(&self) -> Option<String> {
        let host = self.get(PROXY_HOST)?;
        let port = self.get(PROXY_PORT)?;
        Some(format!("http://{host}:{port}"))
    }
}

/// The per-user settings folder
///
/// `Microsoft/VstsAuthLib` under the platform's local application data, or a
/// dotted folder under the home directory where no such convention exists.
pub fn settings_folder() -> PathBuf {
    base_settings_dir().join("Microsoft").join("VstsAuthLib")
}

#[cfg(windows)]
fn base_settings_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn base_settings_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_default()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn base_settings_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".config")
}
