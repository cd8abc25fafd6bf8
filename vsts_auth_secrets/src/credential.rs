use std::fmt;

use base64::Engine;

/// A username and password pair
///
/// Produces the `Basic` authorization header contribution for hosts that
/// still accept alternate credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    /// Constructs a new credential from a username and password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username
    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password
    #[inline]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// The `Authorization` header value for this credential
    ///
    /// `Basic` followed by the base64 encoding of `username ":" password`.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***PASSWORD***")
            .finish()
    }
}
