use std::fmt;
use std::sync::Arc;

use aliri_clock::System;
use async_trait::async_trait;
use http::Uri;
use tracing::{debug, warn};
use uuid::Uuid;
use vsts_auth_secrets::{InMemoryStore, SecretStore, TokenPair};

use super::{global_sentinel, secret_key, Authenticator};
use crate::braids::ClientId;
use crate::config::Settings;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::oauth::agent::{UserAgent, UserAgentProvider};
use crate::oauth::{
    AuthorizationUrlRequest, AzureAuthority, AzureAuthorityProvider, DeviceFlowCallback,
    MANAGEMENT_CORE_RESOURCE,
};
use crate::pat::VsoAuthority;
use crate::retriever::{retrieve, SecretAcquirer};
use crate::{Error, PromptBehavior};

const AUTH_TYPE: &str = "OAuth2";

/// OAuth2 authentication against the Azure AD authority behind a target
///
/// Acquisition prefers the configured interactive [`UserAgent`]; when none
/// is available the flow falls back to the device flow, provided a
/// notification callback was configured. Stored pairs are validated against
/// the platform's connection-data endpoint and refreshed through their
/// refresh token before the user is ever re-prompted.
pub struct OAuth2Authenticator {
    client_id: ClientId,
    resource: String,
    redirect_uri: String,
    store: Arc<dyn SecretStore<TokenPair>>,
    http: Arc<dyn HttpClient>,
    authority_provider: AzureAuthorityProvider,
    vso: VsoAuthority,
    user_agent: Option<Arc<dyn UserAgent>>,
    user_agent_provider: UserAgentProvider,
    device_flow_callback: Option<Arc<DeviceFlowCallback>>,
}

impl fmt::Debug for OAuth2Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OAuth2Authenticator")
            .field("client_id", &self.client_id)
            .field("resource", &self.resource)
            .field("redirect_uri", &self.redirect_uri)
            .field("user_agent_provider", &self.user_agent_provider)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`OAuth2Authenticator`]
pub struct OAuth2AuthenticatorBuilder {
    client_id: ClientId,
    redirect_uri: String,
    resource: String,
    store: Option<Arc<dyn SecretStore<TokenPair>>>,
    http: Option<Arc<dyn HttpClient>>,
    user_agent: Option<Arc<dyn UserAgent>>,
    user_agent_provider: Option<UserAgentProvider>,
    device_flow_callback: Option<Arc<DeviceFlowCallback>>,
}

impl fmt::Debug for OAuth2AuthenticatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OAuth2AuthenticatorBuilder")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("resource", &self.resource)
            .field("user_agent_provider", &self.user_agent_provider)
            .finish_non_exhaustive()
    }
}

impl OAuth2AuthenticatorBuilder {
    /// Overrides the resource tokens are requested for
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Uses `store` instead of an in-memory token-pair store
    pub fn store(mut self, store: Arc<dyn SecretStore<TokenPair>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `http` instead of the default reqwest transport
    pub fn http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Supplies the interactive user agent
    pub fn user_agent(mut self, agent: Arc<dyn UserAgent>) -> Self {
        self.user_agent = Some(agent);
        self
    }

    /// Selects the interactive provider behavior, overriding the
    /// `userAgentProvider` setting
    pub fn user_agent_provider(mut self, provider: UserAgentProvider) -> Self {
        self.user_agent_provider = Some(provider);
        self
    }

    /// Enables the device-flow fallback, notifying the caller's UI through
    /// `callback` when a device authorization is ready to show
    pub fn device_flow_callback(mut self, callback: Arc<DeviceFlowCallback>) -> Self {
        self.device_flow_callback = Some(callback);
        self
    }

    /// Builds the authenticator, loading settings for any defaulted parts
    pub fn build(self) -> Result<OAuth2Authenticator, Error> {
        let settings = Settings::load();
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::new(&settings)?) as Arc<dyn HttpClient>,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn SecretStore<TokenPair>>);
        let user_agent_provider = self
            .user_agent_provider
            .unwrap_or_else(|| settings.user_agent_provider());

        Ok(OAuth2Authenticator {
            client_id: self.client_id,
            resource: self.resource,
            redirect_uri: self.redirect_uri,
            store,
            authority_provider: AzureAuthorityProvider::new(Arc::clone(&http)),
            vso: VsoAuthority::new(Arc::clone(&http)),
            http,
            user_agent: self.user_agent,
            user_agent_provider,
            device_flow_callback: self.device_flow_callback,
        })
    }
}

impl OAuth2Authenticator {
    /// Starts building an authenticator for a registered client
    pub fn builder(
        client_id: ClientId,
        redirect_uri: impl Into<String>,
    ) -> OAuth2AuthenticatorBuilder {
        OAuth2AuthenticatorBuilder {
            client_id,
            redirect_uri: redirect_uri.into(),
            resource: MANAGEMENT_CORE_RESOURCE.to_owned(),
            store: None,
            http: None,
            user_agent: None,
            user_agent_provider: None,
            device_flow_callback: None,
        }
    }

    async fn acquire_interactive(
        &self,
        authority: &AzureAuthority,
        agent: &dyn UserAgent,
        prompt: PromptBehavior,
    ) -> Result<Option<TokenPair>, Error> {
        let state = Uuid::new_v4().to_string();
        let url = authority.authorization_url(&AuthorizationUrlRequest {
            resource: &self.resource,
            client_id: &self.client_id,
            redirect_uri: &self.redirect_uri,
            prompt,
            login_hint: None,
            state: Some(&state),
            extra_query: None,
        })?;

        let Some(response) = agent.request_authorization_code(&url, &self.redirect_uri).await
        else {
            debug!("interactive sign-in was dismissed");
            return Ok(None);
        };

        if response.state.as_deref() != Some(state.as_str()) {
            warn!("authorization response state does not match; discarding the code");
            return Ok(None);
        }

        let exchanged = authority
            .exchange_authorization_code(
                &*self.http,
                &self.resource,
                &self.client_id,
                &response.code,
                &self.redirect_uri,
                None,
            )
            .await;
        recover_to_none(exchanged, "authorization-code exchange failed")
    }

    async fn acquire_by_device_flow(
        &self,
        authority: &AzureAuthority,
        callback: &DeviceFlowCallback,
    ) -> Result<Option<TokenPair>, Error> {
        let response = authority
            .request_device_authorization(
                &*self.http,
                &self.client_id,
                Some(&self.resource),
                Some(&self.redirect_uri),
                None,
                &System,
            )
            .await?;
        callback(&response);

        let pair = authority
            .acquire_token_by_device_flow(&*self.http, &self.client_id, &response, &System)
            .await?;
        Ok(Some(pair))
    }

    async fn selected_agent(&self) -> Option<&dyn UserAgent> {
        if self.user_agent_provider == UserAgentProvider::None {
            return None;
        }
        let agent = self.user_agent.as_deref()?;
        if agent.is_available() {
            return Some(agent);
        }
        if self.user_agent_provider == UserAgentProvider::Swt && agent.prepare().await {
            return Some(agent);
        }
        debug!("no interactive user agent is available");
        None
    }
}

fn recover_to_none(
    result: Result<TokenPair, Error>,
    context: &str,
) -> Result<Option<TokenPair>, Error> {
    match result {
        Ok(pair) => Ok(Some(pair)),
        Err(error @ (Error::Upstream { .. } | Error::Transport(_))) => {
            warn!(error = %error, "{context}");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

struct OAuth2Acquirer<'a> {
    authenticator: &'a OAuth2Authenticator,
    target: Uri,
    prompt: PromptBehavior,
}

#[async_trait]
impl SecretAcquirer<TokenPair> for OAuth2Acquirer<'_> {
    async fn acquire(&self) -> Result<Option<TokenPair>, Error> {
        let this = self.authenticator;
        let authority = this.authority_provider.authority_for(&self.target).await;

        if let Some(agent) = this.selected_agent().await {
            return this.acquire_interactive(&authority, agent, self.prompt).await;
        }

        if let Some(callback) = &this.device_flow_callback {
            return this.acquire_by_device_flow(&authority, callback.as_ref()).await;
        }

        debug!("no acquisition flow is configured");
        Ok(None)
    }

    async fn validate(&self, pair: &TokenPair) -> bool {
        self.authenticator
            .vso
            .validate_token(&global_sentinel(), pair.access_token())
            .await
    }

    async fn refresh(&self, pair: &TokenPair) -> Option<TokenPair> {
        if !pair.refresh_token().has_value() {
            return None;
        }

        let this = self.authenticator;
        let authority = this.authority_provider.authority_for(&self.target).await;
        let refreshed = authority
            .refresh_token_pair(
                &*this.http,
                &this.resource,
                &this.client_id,
                pair.refresh_token().value(),
            )
            .await;

        match refreshed {
            Ok(refreshed) if refreshed.is_complete() => Some(refreshed),
            Ok(_) => {
                debug!("refresh response was incomplete; re-authenticating");
                None
            }
            Err(error) => {
                warn!(error = %error, "token refresh failed; re-authenticating");
                None
            }
        }
    }
}

#[async_trait]
impl Authenticator for OAuth2Authenticator {
    fn auth_type(&self) -> &'static str {
        AUTH_TYPE
    }

    fn supports_oauth2(&self) -> bool {
        true
    }

    async fn get_oauth2_token_pair(
        &self,
        target: Option<&Uri>,
        prompt: PromptBehavior,
    ) -> Result<Option<TokenPair>, Error> {
        let key = secret_key(AUTH_TYPE, target);
        let acquirer = OAuth2Acquirer {
            authenticator: self,
            target: target.cloned().unwrap_or_else(global_sentinel),
            prompt,
        };
        retrieve(&key, &*self.store, prompt, &acquirer).await
    }

    async fn sign_out(&self, target: Option<&Uri>) -> bool {
        self.store.delete(&secret_key(AUTH_TYPE, target))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use url::Url;

    use crate::braids::AuthorizationCode;
    use crate::http::HttpResponse;
    use crate::oauth::agent::AuthorizationResponse;

    use super::*;

    /// Echoes back a fixed or URL-derived state with a canned code.
    struct CannedAgent {
        state: StateBehavior,
    }

    enum StateBehavior {
        EchoFromUrl,
        Fixed(&'static str),
    }

    #[async_trait]
    impl UserAgent for CannedAgent {
        async fn request_authorization_code(
            &self,
            authorization_url: &Url,
            _redirect_uri: &str,
        ) -> Option<AuthorizationResponse> {
            let state = match self.state {
                StateBehavior::Fixed(state) => Some(state.to_owned()),
                StateBehavior::EchoFromUrl => authorization_url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned()),
            };
            Some(AuthorizationResponse {
                code: AuthorizationCode::from_static("auth-code"),
                state,
            })
        }
    }

    struct CountingHttp {
        response: HttpResponse,
        form_posts: AtomicUsize,
        form_bodies: Mutex<Vec<String>>,
    }

    impl CountingHttp {
        fn returning(response: HttpResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                form_posts: AtomicUsize::new(0),
                form_bodies: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for CountingHttp {
        async fn get(
            &self,
            _url: &str,
            _authorization: Option<&str>,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::new(200, "{}"))
        }

        async fn post_form(&self, _url: &str, body: String) -> Result<HttpResponse, Error> {
            self.form_posts.fetch_add(1, Ordering::SeqCst);
            self.form_bodies.lock().unwrap().push(body);
            Ok(self.response.clone())
        }

        async fn post_json(
            &self,
            _url: &str,
            _body: &serde_json::Value,
            _authorization: Option<&str>,
        ) -> Result<HttpResponse, Error> {
            panic!("unexpected JSON POST");
        }

        async fn get_header(&self, _url: &str, _header: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }
    }

    fn authenticator(
        http: Arc<dyn HttpClient>,
        agent: CannedAgent,
        store: Arc<dyn SecretStore<TokenPair>>,
    ) -> OAuth2Authenticator {
        OAuth2Authenticator::builder(
            ClientId::from_static("00000000-0000-0000-0000-00000000c1e0"),
            "urn:ietf:wg:oauth:2.0:oob",
        )
        .http(http)
        .store(store)
        .user_agent(Arc::new(agent))
        .user_agent_provider(UserAgentProvider::Jfx)
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn a_matching_state_exchanges_the_code_and_stores_the_pair() {
        let http = CountingHttp::returning(HttpResponse::new(
            200,
            r#"{"access_token":"a-token","refresh_token":"r-token"}"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let authenticator = authenticator(
            Arc::clone(&http) as Arc<dyn HttpClient>,
            CannedAgent {
                state: StateBehavior::EchoFromUrl,
            },
            store.clone(),
        );

        let pair = authenticator
            .get_oauth2_token_pair(None, PromptBehavior::Always)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pair.access_token().value(), "a-token");
        assert_eq!(http.form_posts.load(Ordering::SeqCst), 1);
        let body = http.form_bodies.lock().unwrap()[0].clone();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=auth-code"));
        assert!(store
            .get("OAuth2:https://app.vssps.visualstudio.com")
            .is_some());
    }

    #[tokio::test]
    async fn a_mismatched_state_discards_the_code_without_an_exchange() {
        let http = CountingHttp::returning(HttpResponse::new(500, "must not be called"));
        let store = Arc::new(InMemoryStore::new());
        let authenticator = authenticator(
            Arc::clone(&http) as Arc<dyn HttpClient>,
            CannedAgent {
                state: StateBehavior::Fixed("wrong"),
            },
            store.clone(),
        );

        let pair = authenticator
            .get_oauth2_token_pair(None, PromptBehavior::Always)
            .await
            .unwrap();

        assert_eq!(pair, None);
        assert_eq!(http.form_posts.load(Ordering::SeqCst), 0);
        assert!(store
            .get("OAuth2:https://app.vssps.visualstudio.com")
            .is_none());
    }

    #[tokio::test]
    async fn an_incomplete_refresh_falls_through_to_reacquisition() {
        // refresh answers without a refresh token; the acquirer then runs
        // the interactive flow, whose exchange answers a complete pair
        let http = CountingHttp::returning(HttpResponse::new(
            200,
            r#"{"access_token":"fresh-a","refresh_token":"fresh-r"}"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let stale = TokenPair::new("stale-a", "stale-r").unwrap();
        store.put("OAuth2:https://app.vssps.visualstudio.com", stale);

        let authenticator = authenticator(
            Arc::new(DenyHttp(Arc::clone(&http) as Arc<dyn HttpClient>)) as Arc<dyn HttpClient>,
            CannedAgent {
                state: StateBehavior::EchoFromUrl,
            },
            store.clone(),
        );

        let pair = authenticator
            .get_oauth2_token_pair(None, PromptBehavior::Auto)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pair.access_token().value(), "fresh-a");
    }

    /// Fails validation GETs while delegating everything else.
    struct DenyHttp(Arc<dyn HttpClient>);

    #[async_trait]
    impl HttpClient for DenyHttp {
        async fn get(
            &self,
            _url: &str,
            _authorization: Option<&str>,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::new(401, "stale"))
        }

        async fn post_form(&self, url: &str, body: String) -> Result<HttpResponse, Error> {
            if body.contains("grant_type=refresh_token") {
                return Ok(HttpResponse::new(200, r#"{"access_token":"only-access"}"#));
            }
            self.0.post_form(url, body).await
        }

        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
            authorization: Option<&str>,
        ) -> Result<HttpResponse, Error> {
            self.0.post_json(url, body, authorization).await
        }

        async fn get_header(&self, url: &str, header: &str) -> Result<Option<String>, Error> {
            self.0.get_header(url, header).await
        }
    }

    /// Answers form POSTs in script order; everything else is unexpected.
    struct SequencedHttp {
        responses: Mutex<Vec<HttpResponse>>,
    }

    #[async_trait]
    impl HttpClient for SequencedHttp {
        async fn get(
            &self,
            _url: &str,
            _authorization: Option<&str>,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, Error> {
            panic!("unexpected GET");
        }

        async fn post_form(&self, _url: &str, _body: String) -> Result<HttpResponse, Error> {
            let mut responses = self.responses.lock().unwrap();
            assert!(!responses.is_empty(), "posted after the script ran out");
            Ok(responses.remove(0))
        }

        async fn post_json(
            &self,
            _url: &str,
            _body: &serde_json::Value,
            _authorization: Option<&str>,
        ) -> Result<HttpResponse, Error> {
            panic!("unexpected JSON POST");
        }

        async fn get_header(&self, _url: &str, _header: &str) -> Result<Option<String>, Error> {
            panic!("unexpected header probe");
        }
    }

    #[tokio::test]
    async fn the_device_flow_fallback_notifies_and_polls_for_a_pair() {
        use crate::oauth::DeviceFlowResponse;

        let http = Arc::new(SequencedHttp {
            responses: Mutex::new(vec![
                HttpResponse::new(
                    200,
                    r#"{"device_code":"d","user_code":"BDWP-HTQQ","verification_uri":"https://aka.ms/devicelogin"}"#,
                ),
                HttpResponse::new(200, r#"{"access_token":"dev-a","refresh_token":"dev-r"}"#),
            ]),
        });
        let store = Arc::new(InMemoryStore::new());
        let notified = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&notified);

        let authenticator = OAuth2Authenticator::builder(
            ClientId::from_static("00000000-0000-0000-0000-00000000c1e0"),
            "urn:ietf:wg:oauth:2.0:oob",
        )
        .http(Arc::clone(&http) as Arc<dyn HttpClient>)
        .store(store.clone())
        .user_agent_provider(UserAgentProvider::None)
        .device_flow_callback(Arc::new(move |response: &DeviceFlowResponse| {
            assert_eq!(response.user_code().as_str(), "BDWP-HTQQ");
            observer.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

        let pair = authenticator
            .get_oauth2_token_pair(None, PromptBehavior::Always)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pair.access_token().value(), "dev-a");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(store
            .get("OAuth2:https://app.vssps.visualstudio.com")
            .is_some());
    }

    #[tokio::test]
    async fn never_answers_from_the_cache_without_any_network_traffic() {
        let http = CountingHttp::returning(HttpResponse::new(500, "must not be called"));
        let store = Arc::new(InMemoryStore::new());
        store.put(
            "OAuth2:https://app.vssps.visualstudio.com",
            TokenPair::new("cached-a", "cached-r").unwrap(),
        );
        let authenticator = authenticator(
            Arc::clone(&http) as Arc<dyn HttpClient>,
            CannedAgent {
                state: StateBehavior::EchoFromUrl,
            },
            store,
        );

        let pair = authenticator
            .get_oauth2_token_pair(None, PromptBehavior::Never)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pair.access_token().value(), "cached-a");
        assert_eq!(http.form_posts.load(Ordering::SeqCst), 0);
    }
}
