use url::{form_urlencoded, Url};
use uuid::Uuid;
use vsts_auth_secrets::TokenPair;

use crate::braids::{AuthorizationCodeRef, ClientIdRef};
use crate::http::HttpClient;
use crate::{Error, PromptBehavior};

/// The default Azure AD authority host
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// The tenant used when the directory backing a resource is unknown
pub const COMMON_TENANT: &str = "common";

/// The resource identifier for Azure service management, the audience VSTS
/// access tokens are requested for
pub const MANAGEMENT_CORE_RESOURCE: &str = "https://management.core.windows.net/";

/// One Azure AD tenant's OAuth2 endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAuthority {
    host: String,
    tenant: String,
}

/// The pieces of an authorization-code URL
///
/// Query parameters are emitted in a fixed order so the URL is deterministic
/// for a given request: `resource`, `client_id`, `response_type`,
/// `redirect_uri`, then the optional `login_hint`, `state`, and `prompt`.
#[derive(Debug)]
pub struct AuthorizationUrlRequest<'a> {
    /// The resource the token is requested for
    pub resource: &'a str,
    /// The registered client
    pub client_id: &'a ClientIdRef,
    /// Where the authority redirects with the code
    pub redirect_uri: &'a str,
    /// Maps to the `prompt` parameter: `login` for `Always`, `attempt_none`
    /// for `Never`, absent for `Auto`
    pub prompt: PromptBehavior,
    /// A username to pre-fill at the authority
    pub login_hint: Option<&'a str>,
    /// The anti-forgery nonce echoed back with the code
    pub state: Option<&'a str>,
    /// Extra query text appended verbatim; a leading `&` is dropped
    pub extra_query: Option<&'a str>,
}

impl AzureAuthority {
    /// The default-host authority for one tenant
    pub fn new(tenant: impl Into<String>) -> Self {
        Self::with_host(DEFAULT_AUTHORITY_HOST, tenant)
    }

    /// The default-host authority for the `common` tenant
    pub fn common() -> Self {
        Self::new(COMMON_TENANT)
    }

    /// An authority on a non-default host, for sovereign clouds
    pub fn with_host(host: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tenant: tenant.into(),
        }
    }

    /// The tenant path segment this authority addresses
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!("{}/{}/oauth2/{}", self.host, self.tenant, leaf)
    }

    /// The authorize endpoint
    pub fn authorize_endpoint(&self) -> String {
        self.endpoint("authorize")
    }

    /// The token endpoint
    pub fn token_endpoint(&self) -> String {
        self.endpoint("token")
    }

    /// The device-code endpoint
    pub fn device_endpoint(&self) -> String {
        self.endpoint("devicecode")
    }

    /// Composes the URL the interactive user agent navigates to
    pub fn authorization_url(&self, request: &AuthorizationUrlRequest<'_>) -> Result<Url, Error> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("resource", request.resource);
        query.append_pair("client_id", request.client_id.as_str());
        query.append_pair("response_type", "code");
        query.append_pair("redirect_uri", request.redirect_uri);
        if let Some(login_hint) = request.login_hint {
            query.append_pair("login_hint", login_hint);
        }
        if let Some(state) = request.state {
            query.append_pair("state", state);
        }
        match request.prompt {
            PromptBehavior::Always => {
                query.append_pair("prompt", "login");
            }
            PromptBehavior::Never => {
                query.append_pair("prompt", "attempt_none");
            }
            PromptBehavior::Auto => {}
        }
        let mut query = query.finish();

        if let Some(extra) = request.extra_query {
            let extra = extra.trim_start_matches('&');
            if !extra.is_empty() {
                query.push('&');
                query.push_str(extra);
            }
        }

        let composed = format!("{}?{}", self.authorize_endpoint(), query);
        Url::parse(&composed).map_err(|_| Error::invalid_input(composed))
    }

    /// Trades an authorization code for a token pair
    #[tracing::instrument(
        err,
        skip_all,
        fields(tenant = %self.tenant, client_id = %client_id)
    )]
    pub async fn exchange_authorization_code(
        &self,
        http: &dyn HttpClient,
        resource: &str,
        client_id: &ClientIdRef,
        code: &AuthorizationCodeRef,
        redirect_uri: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<TokenPair, Error> {
        // the serializer is not Send, so the body is built before the await
        let body = {
            let mut body = form_urlencoded::Serializer::new(String::new());
            body.append_pair("resource", resource);
            body.append_pair("client_id", client_id.as_str());
            body.append_pair("grant_type", "authorization_code");
            body.append_pair("code", code.as_str());
            body.append_pair("redirect_uri", redirect_uri);
            if let Some(correlation_id) = correlation_id {
                body.append_pair("correlation_id", &correlation_id.to_string());
                body.append_pair("return_client_request_id", "true");
            }
            body.finish()
        };

        let response = http.post_form(&self.token_endpoint(), body).await?;
        parse_token_response(response.into_success_body()?)
    }

    /// Trades a refresh token for a new token pair
    ///
    /// The caller decides whether the returned pair is acceptable; see
    /// [`TokenPair::is_complete`].
    #[tracing::instrument(
        err,
        skip_all,
        fields(tenant = %self.tenant, client_id = %client_id)
    )]
    pub async fn refresh_token_pair(
        &self,
        http: &dyn HttpClient,
        resource: &str,
        client_id: &ClientIdRef,
        refresh_token: &str,
    ) -> Result<TokenPair, Error> {
        let body = {
            let mut body = form_urlencoded::Serializer::new(String::new());
            body.append_pair("resource", resource);
            body.append_pair("client_id", client_id.as_str());
            body.append_pair("grant_type", "refresh_token");
            body.append_pair("refresh_token", refresh_token);
            body.finish()
        };

        let response = http.post_form(&self.token_endpoint(), body).await?;
        parse_token_response(response.into_success_body()?)
    }
}

pub(crate) fn parse_token_response(body: String) -> Result<TokenPair, Error> {
    TokenPair::from_json(&body)
        .map_err(|error| Error::invalid_input(format!("malformed token response: {error}")))
}
