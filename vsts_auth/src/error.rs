use std::fmt;

use thiserror::Error;

/// An error raised while acquiring or provisioning a secret
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was missing or malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The platform or authority answered with a non-success status
    #[error("upstream error ({status}): {body}")]
    Upstream {
        /// The HTTP status code of the response
        status: u16,
        /// The response body text
        body: String,
    },

    /// The authority refused the authorization itself
    #[error("authorization error: {code}{}", DescriptionSuffix(.description, .uri))]
    Authorization {
        /// The OAuth error code, such as `code_expired` or `request_cancelled`
        code: String,
        /// The authority's human-readable description, when present
        description: Option<String>,
        /// A URI with more detail, when present
        uri: Option<String>,
    },

    /// The request never produced a response
    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    /// The secret store backend failed
    #[error("secret store error: {0}")]
    Store(String),
}

impl Error {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    pub(crate) fn authorization(code: impl Into<String>) -> Self {
        Self::Authorization {
            code: code.into(),
            description: None,
            uri: None,
        }
    }

    /// The OAuth error code, when this is an authorization error
    pub fn authorization_code(&self) -> Option<&str> {
        match self {
            Self::Authorization { code, .. } => Some(code),
            _ => None,
        }
    }
}

struct DescriptionSuffix<'a>(&'a Option<String>, &'a Option<String>);

impl fmt::Display for DescriptionSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(description) = self.0 {
            write!(f, ": {description}")?;
        }
        if let Some(uri) = self.1 {
            write!(f, " (see {uri})")?;
        }
        Ok(())
    }
}
