use std::fmt;

use serde_json::Value;

use crate::{InvalidToken, Token, TokenKind};

/// An error parsing an OAuth2 token response into a [`TokenPair`]
#[derive(Debug, thiserror::Error)]
pub enum TokenPairParseError {
    /// The response body was not valid JSON
    #[error("token response is not valid JSON")]
    Json(#[from] serde_json::Error),
    /// The response body was not a JSON object
    #[error("token response is not a JSON object")]
    NotAnObject,
    /// A token field was rejected by [`Token`] validation
    #[error(transparent)]
    InvalidToken(#[from] InvalidToken),
}

/// An OAuth2 access token and refresh token, with any additional response
/// parameters the authority sent alongside them
///
/// The parameter map preserves the order the authority sent and is fixed at
/// construction. Either token may carry an empty value when the authority
/// omitted the field; callers that require both use [`is_complete`].
///
/// [`is_complete`]: TokenPair::is_complete
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    access_token: Token,
    refresh_token: Token,
    parameters: Vec<(String, String)>,
}

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";

impl TokenPair {
    /// Constructs a pair from raw access and refresh token values
    ///
    /// The parameter map is empty.
    pub fn new(access_token: &str, refresh_token: &str) -> Result<Self, InvalidToken> {
        Ok(Self {
            access_token: Token::new(access_token, TokenKind::Access)?,
            refresh_token: Token::new(refresh_token, TokenKind::Refresh)?,
            parameters: Vec::new(),
        })
    }

    /// Parses a pair from an OAuth2 JSON token response
    ///
    /// `access_token` and `refresh_token` move into their fields; every
    /// other property lands in the parameter map with its value rendered as
    /// a string. Numbers render the way the platform's other tools render
    /// them, as floating point (`3600` becomes `"3600.0"`).
    pub fn from_json(response: &str) -> Result<Self, TokenPairParseError> {
        let value: Value = serde_json::from_str(response)?;
        let object = value.as_object().ok_or(TokenPairParseError::NotAnObject)?;

        let mut access_token = None;
        let mut refresh_token = None;
        let mut parameters = Vec::new();
        for (name, value) in object {
            match name.as_str() {
                ACCESS_TOKEN => access_token = value.as_str().map(str::to_owned),
                REFRESH_TOKEN => refresh_token = value.as_str().map(str::to_owned),
                _ => parameters.push((name.clone(), stringify(value))),
            }
        }

        Ok(Self {
            access_token: Token::new(access_token.unwrap_or_default(), TokenKind::Access)?,
            refresh_token: Token::new(refresh_token.unwrap_or_default(), TokenKind::Refresh)?,
            parameters,
        })
    }

    /// The access token, used to grant access to resources
    #[inline]
    pub fn access_token(&self) -> &Token {
        &self.access_token
    }

    /// The refresh token, used to grant new access tokens
    #[inline]
    pub fn refresh_token(&self) -> &Token {
        &self.refresh_token
    }

    /// True when both tokens carry non-empty values
    pub fn is_complete(&self) -> bool {
        self.access_token.has_value() && self.refresh_token.has_value()
    }

    /// Looks up an additional response parameter by name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The additional response parameters, in the order the authority sent
    /// them
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // numbers were parsed as doubles by the original tooling, and the
        // stringified form keeps that shape
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("{:?}", f),
            None => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &self.access_token)
            .field("refresh_token", &self.refresh_token)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // the example response from RFC 6749 §4.1.4
    const RFC_6749_RESPONSE: &str = r#"{
        "access_token":"2YotnFZFEjr1zCsicMWpAA",
        "token_type":"example",
        "expires_in":3600,
        "refresh_token":"tGzv3JOkF0XG5Qx2TlKWIA",
        "example_parameter":"example_value"
    }"#;

    #[test]
    fn parses_rfc_6749_response() {
        let pair = TokenPair::from_json(RFC_6749_RESPONSE).unwrap();
        assert_eq!(pair.access_token().value(), "2YotnFZFEjr1zCsicMWpAA");
        assert_eq!(pair.refresh_token().value(), "tGzv3JOkF0XG5Qx2TlKWIA");
        assert_eq!(pair.parameter("token_type"), Some("example"));
        assert_eq!(pair.parameter("expires_in"), Some("3600.0"));
        assert_eq!(pair.parameter("example_parameter"), Some("example_value"));
        assert!(pair.is_complete());
    }

    #[test]
    fn parameters_preserve_response_order() {
        let pair = TokenPair::from_json(RFC_6749_RESPONSE).unwrap();
        let names: Vec<&str> = pair.parameters().map(|(n, _)| n).collect();
        assert_eq!(names, ["token_type", "expires_in", "example_parameter"]);
    }

    #[test]
    fn missing_refresh_token_is_incomplete() {
        let pair = TokenPair::from_json(r#"{"access_token":"abc","expires_in":3599}"#).unwrap();
        assert!(pair.access_token().has_value());
        assert!(!pair.refresh_token().has_value());
        assert!(!pair.is_complete());
    }

    #[test]
    fn explicit_pair_has_no_parameters() {
        let pair = TokenPair::new("access", "refresh").unwrap();
        assert_eq!(pair.parameters().count(), 0);
        assert_eq!(pair.access_token().kind(), TokenKind::Access);
        assert_eq!(pair.refresh_token().kind(), TokenKind::Refresh);
    }

    #[test]
    fn rejects_non_object_response() {
        assert!(matches!(
            TokenPair::from_json("[1,2,3]"),
            Err(TokenPairParseError::NotAnObject)
        ));
    }
}
