//! Personal access token provisioning
//!
//! A PAT is minted against the platform's identity service: resolve the
//! account behind the target URI, look up the account's identity service
//! endpoint, and POST a session-token request scoped by a
//! [`VsoTokenScope`]. Only the compact token form is requested. An OAuth2
//! access token authorizes every step; [`VsoAuthority`] takes it by value so
//! the OAuth2 side stays a separate collaborator.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Uri;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;
use vsts_auth_secrets::key;
use vsts_auth_secrets::{Token, TokenKind, VsoTokenScope};

use crate::http::HttpClient;
use crate::Error;

/// The URI under which cross-account secrets are cached
pub const GLOBAL_SENTINEL_URI: &str = "https://app.vssps.visualstudio.com";

/// The fixed service definition identifier of the identity service
const LOCATION_SERVICE_ID: &str = "951917AC-A960-4999-8464-E3F0AA25B381";

/// The account marker for a PAT not bound to one account
const ALL_ACCOUNTS: &str = "all_accounts";

const CONNECTION_DATA_TIMEOUT: Duration = Duration::from_secs(15);

/// True when the URI belongs to the hosted platform families
pub(crate) fn is_hosted(uri: &Uri) -> bool {
    fn in_family(host: &str, apex: &str) -> bool {
        host.eq_ignore_ascii_case(apex)
            || (host.len() > apex.len()
                && host[host.len() - apex.len() - 1..].eq_ignore_ascii_case(&format!(".{apex}")))
    }

    match uri.host() {
        Some(host) => in_family(host, "visualstudio.com") || key::is_azure_host(uri),
        None => false,
    }
}

/// The platform's token-issuing side
pub struct VsoAuthority {
    http: Arc<dyn HttpClient>,
}

impl fmt::Debug for VsoAuthority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VsoAuthority").finish_non_exhaustive()
    }
}

impl VsoAuthority {
    /// Constructs an authority over the given transport
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Mints a personal access token for `target`
    ///
    /// For account-bound requests the account's instance identity is
    /// resolved first and bound into the issued token; an unresolvable
    /// instance yields `Ok(None)` rather than a mis-scoped PAT. Global
    /// requests are issued against `all_accounts`.
    #[tracing::instrument(err, skip_all, fields(target = %target, global))]
    pub async fn generate_personal_access_token(
        &self,
        target: &Uri,
        access_token: &Token,
        scope: &VsoTokenScope,
        display_name: &str,
        global: bool,
    ) -> Result<Option<Token>, Error> {
        let account = scope_host(target);
        let mut access = access_token.clone();

        if !global {
            match self.instance_id(&account, &access).await {
                Some(instance) => access.set_target_identity(instance),
                None => {
                    warn!(account, "target instance could not be resolved; not issuing a PAT");
                    return Ok(None);
                }
            }
        }

        let identity_base = self.identity_service_base(&account, &access).await?;
        let target_accounts = if global {
            ALL_ACCOUNTS.to_owned()
        } else {
            access.target_identity().to_string()
        };

        let body = json!({
            "scope": scope.serialize(),
            "targetAccounts": [target_accounts],
            "displayName": display_name,
        });
        let url = format!(
            "{}/_apis/token/sessiontokens?api-version=1.0&tokentype=compact",
            identity_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post_json(&url, &body, Some(&access.authorization_header()))
            .await?
            .into_success_body()?;

        let value = string_field_in(&response, "token").ok_or_else(|| {
            Error::invalid_input("session token response is missing the token field")
        })?;
        let mut pat = Token::new(value, TokenKind::Personal)
            .map_err(|error| Error::invalid_input(error.to_string()))?;
        pat.set_target_identity(access.target_identity());

        debug!(account, "issued a personal access token");
        Ok(Some(pat))
    }

    /// Resolves the identity service base URL for an account
    async fn identity_service_base(&self, account: &str, access: &Token) -> Result<String, Error> {
        let url = format!(
            "https://{account}/_apis/ServiceDefinitions/LocationService2/{LOCATION_SERVICE_ID}?api-version=1.0"
        );
        let body = self
            .http
            .get(&url, Some(&access.authorization_header()), None)
            .await?
            .into_success_body()?;

        string_field_in(&body, "location")
            .ok_or_else(|| Error::upstream(200, "service definition carries no location"))
    }

    /// The instance identity behind an account, from its connection data
    async fn instance_id(&self, account: &str, access: &Token) -> Option<Uuid> {
        let url = format!("https://{account}/_apis/connectiondata");
        let response = self
            .http
            .get(
                &url,
                Some(&access.authorization_header()),
                Some(CONNECTION_DATA_TIMEOUT),
            )
            .await
            .ok()?;
        if !response.is_success() {
            return None;
        }
        let instance = string_field_in(response.body(), "instanceId")?;
        Uuid::parse_str(&instance).ok()
    }

    /// Resolves the global sentinel to a concrete account URI
    ///
    /// Looks up the signed-in profile, then picks the first of its accounts
    /// with both a status and a URI.
    pub async fn resolve_account_uri(&self, access: &Token) -> Result<Uri, Error> {
        let authorization = access.authorization_header();
        let profile = self
            .http
            .get(
                &format!("{GLOBAL_SENTINEL_URI}/_apis/profile/profiles/me?api-version=1.0"),
                Some(&authorization),
                None,
            )
            .await?
            .into_success_body()?;
        let member_id = string_field_in(&profile, "id")
            .ok_or_else(|| Error::invalid_input("profile response is missing the member id"))?;

        let accounts = self
            .http
            .get(
                &format!("{GLOBAL_SENTINEL_URI}/_apis/Accounts?memberid={member_id}&api-version=1.0"),
                Some(&authorization),
                None,
            )
            .await?
            .into_success_body()?;

        let accounts: Value = serde_json::from_str(&accounts)
            .map_err(|error| Error::invalid_input(format!("malformed account list: {error}")))?;
        let account_name = accounts
            .get("value")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|account| {
                !account.get("accountStatus").map_or(true, Value::is_null)
                    && !account.get("accountUri").map_or(true, Value::is_null)
            })
            .and_then(|account| account.get("accountName"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_input("no usable account for this profile"))?;

        let uri = format!("https://{account_name}.visualstudio.com/");
        uri.parse().map_err(|_| Error::invalid_input(uri))
    }

    /// Whether a stored token still opens the target
    pub async fn validate_token(&self, target: &Uri, token: &Token) -> bool {
        let url = format!("https://{}/_apis/connectionData", scope_host(target));
        match self
            .http
            .get(&url, Some(&token.authorization_header()), None)
            .await
        {
            Ok(response) => response.is_success(),
            Err(error) => {
                debug!(%target, error = %error, "token validation probe failed");
                false
            }
        }
    }
}

fn scope_host(target: &Uri) -> String {
    let account = key::full_account(target);
    account.trim_end_matches(['/', '\\']).to_owned()
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn string_field_in(body: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    string_field(&value, field)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::http::HttpResponse;

    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn access_token() -> Token {
        Token::new("access", TokenKind::Access).unwrap()
    }

    /// Answers requests by URL substring; unmatched requests get a 404.
    struct RoutedHttp {
        routes: Vec<(&'static str, HttpResponse)>,
        requests: Mutex<Vec<String>>,
    }

    impl RoutedHttp {
        fn new(routes: Vec<(&'static str, HttpResponse)>) -> Arc<Self> {
            Arc::new(Self {
                routes,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn respond(&self, url: &str) -> HttpResponse {
            self.requests.lock().unwrap().push(url.to_owned());
            self.routes
                .iter()
                .find(|(fragment, _)| url.contains(fragment))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| HttpResponse::new(404, "no route"))
        }
    }

    #[async_trait]
    impl HttpClient for RoutedHttp {
        async fn get(
            &self,
            url: &str,
            _authorization: Option<&str>,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, Error> {
            Ok(self.respond(url))
        }

        async fn post_form(&self, url: &str, _body: String) -> Result<HttpResponse, Error> {
            Ok(self.respond(url))
        }

        async fn post_json(
            &self,
            url: &str,
            _body: &Value,
            _authorization: Option<&str>,
        ) -> Result<HttpResponse, Error> {
            Ok(self.respond(url))
        }

        async fn get_header(&self, _url: &str, _header: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }
    }

    fn happy_routes() -> Vec<(&'static str, HttpResponse)> {
        vec![
            (
                "/_apis/connectiondata",
                HttpResponse::new(200, r#"{"instanceId":"8602283e-2ed6-4960-adaa-97be7d9913de"}"#),
            ),
            (
                "/_apis/ServiceDefinitions/LocationService2/951917AC-A960-4999-8464-E3F0AA25B381",
                HttpResponse::new(200, r#"{"location":"https://app.vssps.visualstudio.com/"}"#),
            ),
            (
                "/_apis/token/sessiontokens?api-version=1.0&tokentype=compact",
                HttpResponse::new(200, r#"{"token":"tok"}"#),
            ),
        ]
    }

    #[tokio::test]
    async fn account_bound_pat_carries_the_instance_identity() {
        let http = RoutedHttp::new(happy_routes());
        let authority = VsoAuthority::new(Arc::clone(&http) as Arc<dyn HttpClient>);

        let pat = authority
            .generate_personal_access_token(
                &uri("https://ms.visualstudio.com"),
                &access_token(),
                &VsoTokenScope::all_scopes(),
                "PAT",
                false,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pat.value(), "tok");
        assert_eq!(pat.kind(), TokenKind::Personal);
        assert_eq!(
            pat.target_identity(),
            Uuid::parse_str("8602283e-2ed6-4960-adaa-97be7d9913de").unwrap()
        );
    }

    #[tokio::test]
    async fn global_pat_targets_all_accounts_without_a_connection_probe() {
        let http = RoutedHttp::new(happy_routes());
        let authority = VsoAuthority::new(Arc::clone(&http) as Arc<dyn HttpClient>);

        let pat = authority
            .generate_personal_access_token(
                &uri(GLOBAL_SENTINEL_URI),
                &access_token(),
                &VsoTokenScope::code_write(),
                "global PAT",
                true,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pat.value(), "tok");
        assert!(pat.target_identity().is_nil());
        let requests = http.requests.lock().unwrap();
        assert!(!requests.iter().any(|url| url.contains("connectiondata")));
    }

    #[tokio::test]
    async fn unresolvable_instance_yields_no_pat() {
        let http = RoutedHttp::new(vec![(
            "/_apis/connectiondata",
            HttpResponse::new(200, r#"{"instanceId":"garbage"}"#),
        )]);
        let authority = VsoAuthority::new(Arc::clone(&http) as Arc<dyn HttpClient>);

        let pat = authority
            .generate_personal_access_token(
                &uri("https://ms.visualstudio.com"),
                &access_token(),
                &VsoTokenScope::none(),
                "PAT",
                false,
            )
            .await
            .unwrap();

        assert_eq!(pat, None);
    }

    #[tokio::test]
    async fn missing_identity_service_location_is_an_upstream_error() {
        let http = RoutedHttp::new(vec![
            (
                "/_apis/connectiondata",
                HttpResponse::new(200, r#"{"instanceId":"8602283e-2ed6-4960-adaa-97be7d9913de"}"#),
            ),
            (
                "/_apis/ServiceDefinitions/LocationService2",
                HttpResponse::new(200, r#"{}"#),
            ),
        ]);
        let authority = VsoAuthority::new(Arc::clone(&http) as Arc<dyn HttpClient>);

        let error = authority
            .generate_personal_access_token(
                &uri("https://ms.visualstudio.com"),
                &access_token(),
                &VsoTokenScope::none(),
                "PAT",
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Upstream { .. }));
    }

    #[tokio::test]
    async fn account_resolution_picks_the_first_usable_account() {
        let http = RoutedHttp::new(vec![
            (
                "/_apis/profile/profiles/me",
                HttpResponse::new(200, r#"{"id":"f1a2b3c4-0000-0000-0000-000000000001"}"#),
            ),
            (
                "/_apis/Accounts?memberid=f1a2b3c4-0000-0000-0000-000000000001",
                HttpResponse::new(
                    200,
                    r#"{"count":2,"value":[
                        {"accountName":"dormant","accountUri":null,"accountStatus":null},
                        {"accountName":"ms","accountUri":"https://ms.vssps.visualstudio.com/","accountStatus":"enabled"}
                    ]}"#,
                ),
            ),
        ]);
        let authority = VsoAuthority::new(Arc::clone(&http) as Arc<dyn HttpClient>);

        let account = authority.resolve_account_uri(&access_token()).await.unwrap();
        assert_eq!(account.to_string(), "https://ms.visualstudio.com/");
    }

    #[tokio::test]
    async fn validation_accepts_only_success_statuses() {
        let ok = RoutedHttp::new(vec![(
            "/_apis/connectionData",
            HttpResponse::new(200, r#"{"instanceId":"8602283e-2ed6-4960-adaa-97be7d9913de"}"#),
        )]);
        let authority = VsoAuthority::new(Arc::clone(&ok) as Arc<dyn HttpClient>);
        let token = Token::new("pat", TokenKind::Personal).unwrap();
        assert!(authority.validate_token(&uri("https://ms.visualstudio.com"), &token).await);

        let denied = RoutedHttp::new(vec![(
            "/_apis/connectionData",
            HttpResponse::new(401, "denied"),
        )]);
        let authority = VsoAuthority::new(Arc::clone(&denied) as Arc<dyn HttpClient>);
        assert!(!authority.validate_token(&uri("https://ms.visualstudio.com"), &token).await);
    }

    #[test]
    fn hosted_domain_check_covers_both_families() {
        assert!(is_hosted(&uri("https://ms.visualstudio.com")));
        assert!(is_hosted(&uri("https://visualstudio.com")));
        assert!(is_hosted(&uri("https://dev.azure.com/acct")));
        assert!(!is_hosted(&uri("https://google.com")));
        assert!(!is_hosted(&uri("https://notvisualstudio.com")));
    }
}
