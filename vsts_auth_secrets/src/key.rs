//! Stable secret-store keys derived from target URIs
//!
//! Secrets are keyed by `"{namespace}:{scheme}://{scope host}[:{port}]"`,
//! where the namespace is the authenticator type, so a personal access token
//! and an OAuth2 pair for the same URI never collide. The scope host is the
//! [`full_account`] normalization of the URI, with the port omitted when it
//! is the scheme default.

use http::Uri;

const HOST_AZURE: &str = "azure.com";
const HOST_AZURE_ORG_SUFFIX: &str = ".azure.com";

fn ends_with_ignore_ascii_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// True when the URI host is `azure.com` or one of its organization hosts
pub fn is_azure_host(uri: &Uri) -> bool {
    match uri.host() {
        Some(host) => {
            host.eq_ignore_ascii_case(HOST_AZURE)
                || ends_with_ignore_ascii_case(host, HOST_AZURE_ORG_SUFFIX)
        }
        None => false,
    }
}

fn user_info(uri: &Uri) -> Option<&str> {
    let authority = uri.authority()?;
    let (user_info, _) = authority.as_str().rsplit_once('@')?;
    if user_info.is_empty() {
        None
    } else {
        Some(user_info)
    }
}

/// Normalizes a target URI to its scope host
///
/// On the `azure.com` family the organization lives in the first path
/// segment (or, for older-style URIs, the user-info), so the scope host is
/// `host/organization`. Everywhere else the host alone identifies the
/// account. Host case is preserved as given.
pub fn full_account(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    if is_azure_host(uri) {
        if let Some(first_segment) = uri.path().split('/').find(|s| !s.is_empty()) {
            return format!("{}/{}", host, first_segment);
        }
        if let Some(user_info) = user_info(uri) {
            return format!("{}/{}", host, user_info);
        }
    }
    host.to_owned()
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Builds the store key for a target URI under an authenticator namespace
pub fn uri_to_key(uri: &Uri, namespace: &str) -> String {
    let scheme = uri.scheme_str().unwrap_or_default();
    // trailing separators are trimmed for compatibility with the keys
    // git-credential-winstore writes
    let account = full_account(uri);
    let account = account.trim_end_matches(['/', '\\']);

    match uri.port_u16() {
        Some(port) if default_port(scheme) != Some(port) => {
            format!("{}:{}://{}:{}", namespace, scheme, account, port)
        }
        _ => format!("{}:{}://{}", namespace, scheme, account),
    }
}

/// Builds a store key carrying an extra caller-chosen prefix
///
/// Lets several consumers share one backing store without colliding on the
/// same target.
pub fn prefixed_uri_to_key(prefix: &str, uri: &Uri, namespace: &str) -> String {
    format!("{}{}", prefix, uri_to_key(uri, namespace))
}

/// Splits a store key back into its namespace, scope host, and port
///
/// The inverse of [`uri_to_key`] for any key it produced.
pub fn parse_key(key: &str) -> Option<(&str, &str, Option<u16>)> {
    let (namespace, rest) = key.split_once(':')?;
    let (_scheme, rest) = rest.split_once("://")?;

    if let Some((account, port)) = rest.rsplit_once(':') {
        if let Ok(port) = port.parse() {
            return Some((namespace, account, Some(port)));
        }
    }
    Some((namespace, rest, None))
}
