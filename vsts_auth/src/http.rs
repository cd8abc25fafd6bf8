//! The HTTP surface the library needs from a transport
//!
//! The flows only ever make four shapes of request: a GET for text (with an
//! optional bearer authorization and timeout), a form-encoded POST to an
//! OAuth endpoint, a JSON POST to a platform endpoint, and a headers-only
//! probe with redirects disabled. [`HttpClient`] captures exactly those, so
//! wire-level tests can script responses without a network.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::Error;

/// A response from the transport
///
/// Carries any status; callers decide which statuses are errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    body: String,
}

impl HttpResponse {
    /// Constructs a response from a status and body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The response body text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body on success, or an upstream error carrying the body text
    pub fn into_success_body(self) -> Result<String, Error> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(Error::upstream(self.status, self.body))
        }
    }
}

/// The transport contract used by every flow in this library
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a GET, optionally bearer-authorized and bounded by a timeout
    async fn get(
        &self,
        url: &str,
        authorization: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, Error>;

    /// POSTs an already-encoded `application/x-www-form-urlencoded` body
    async fn post_form(&self, url: &str, body: String) -> Result<HttpResponse, Error>;

    /// POSTs a JSON body, optionally bearer-authorized
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        authorization: Option<&str>,
    ) -> Result<HttpResponse, Error>;

    /// Issues a redirect-free GET and reads a single response header
    async fn get_header(&self, url: &str, header: &str) -> Result<Option<String>, Error>;
}

/// The production transport, backed by [`reqwest`]
///
/// Holds two clients: the usual one, and one with redirects disabled for
/// header probes such as tenant discovery.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

const LIBRARY_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

impl ReqwestHttpClient {
    /// Constructs a transport honoring the proxy configuration in `settings`
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().user_agent(LIBRARY_USER_AGENT);
        let mut no_redirect_builder = reqwest::Client::builder()
            .user_agent(LIBRARY_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(proxy_url) = settings.proxy_url() {
            let proxy = reqwest::Proxy::all(&proxy_url)?;
            builder = builder.proxy(proxy.clone());
            no_redirect_builder = no_redirect_builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            no_redirect: no_redirect_builder.build()?,
        })
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse, Error> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(
        &self,
        url: &str,
        authorization: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, Error> {
        let mut request = self.client.get(url);
        if let Some(authorization) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Self::read(request.send().await?).await
    }

    async fn post_form(&self, url: &str, body: String) -> Result<HttpResponse, Error> {
        let request = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body);
        Self::read(request.send().await?).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        authorization: Option<&str>,
    ) -> Result<HttpResponse, Error> {
        let mut request = self.client.post(url).json(body);
        if let Some(authorization) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }
        Self::read(request.send().await?).await
    }

    async fn get_header(&self, url: &str, header: &str) -> Result<Option<String>, Error> {
        let response = self.no_redirect.get(url).send().await?;
        let value = response
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(value)
    }
}
