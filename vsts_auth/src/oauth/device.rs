//! The OAuth2 device-code flow
//!
//! The device flow shows the user a short code and a verification URL, then
//! polls the token endpoint until the user completes sign-in elsewhere. The
//! poll loop honors the authority's pacing: `authorization_pending` waits one
//! interval, `slow_down` doubles the interval first, and the interval never
//! decreases within a session. Polling stops at the authorization's expiry,
//! on cooperative cancellation, or on any other authority error.
//!
//! Unlike the other acquisition paths, terminal device-flow errors surface to
//! the caller rather than collapsing to "no secret": the user may be mid
//! sign-in and deserves to know why the wait ended.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aliri_clock::{Clock, UnixTime};
use serde_json::Value;
use url::form_urlencoded;
use vsts_auth_secrets::TokenPair;

use super::authority::{parse_token_response, AzureAuthority};
use crate::braids::{ClientIdRef, DeviceCode, UserCode};
use crate::http::HttpClient;
use crate::Error;

const DEFAULT_EXPIRES_IN_SECONDS: u64 = 600;
const DEFAULT_INTERVAL_SECONDS: u64 = 5;

const STATE_WAITING: u8 = 0;
const STATE_CANCEL_REQUESTED: u8 = 1;
const STATE_TOKEN_ACQUIRED: u8 = 2;

/// Where a device-flow authorization currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// The user has not yet completed sign-in
    WaitingForUser,
    /// The caller asked the poll loop to stop; terminal
    CancelRequested,
    /// The poll loop obtained a token; terminal
    TokenAcquired,
}

/// Notifies the caller's UI that a device authorization is ready to show
///
/// The poll loop does not block on the callback.
pub type DeviceFlowCallback = dyn Fn(&DeviceFlowResponse) + Send + Sync;

/// A pending device-code authorization
///
/// Cloning shares the state cell, so a UI holding a clone can cancel the
/// poll loop with [`request_cancel`][Self::request_cancel].
#[derive(Debug, Clone)]
pub struct DeviceFlowResponse {
    device_code: DeviceCode,
    user_code: UserCode,
    verification_uri: String,
    expires_at: UnixTime,
    interval_seconds: u64,
    state: Arc<AtomicU8>,
}

impl DeviceFlowResponse {
    /// Parses the device endpoint's JSON response
    ///
    /// `expires_in` defaults to 600 seconds and `interval` to 5 when absent;
    /// both are accepted as numbers or numeric strings, as authorities vary.
    pub fn from_json(body: &str, now: UnixTime) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(body)
            .map_err(|error| Error::invalid_input(format!("malformed device response: {error}")))?;

        let device_code = required_string(&value, "device_code")?;
        let user_code = required_string(&value, "user_code")?;
        let verification_uri = required_string(&value, "verification_uri")?;
        let expires_in =
            seconds_field(&value, "expires_in").unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        let interval_seconds =
            seconds_field(&value, "interval").unwrap_or(DEFAULT_INTERVAL_SECONDS);

        Ok(Self {
            device_code: device_code.into(),
            user_code: user_code.into(),
            verification_uri,
            expires_at: UnixTime(now.0 + expires_in),
            interval_seconds,
            state: Arc::new(AtomicU8::new(STATE_WAITING)),
        })
    }

    /// The short code the user enters at the verification URI
    pub fn user_code(&self) -> &UserCode {
        &self.user_code
    }

    /// Where the user completes sign-in
    pub fn verification_uri(&self) -> &str {
        &self.verification_uri
    }

    /// When the authorization stops being redeemable
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    /// The initial pacing the authority asked for
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    /// The current state of the authorization
    pub fn state(&self) -> DeviceFlowState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CANCEL_REQUESTED => DeviceFlowState::CancelRequested,
            STATE_TOKEN_ACQUIRED => DeviceFlowState::TokenAcquired,
            _ => DeviceFlowState::WaitingForUser,
        }
    }

    /// Asks the poll loop to stop at its next iteration
    ///
    /// Has no effect once the authorization is terminal.
    pub fn request_cancel(&self) {
        let _ = self.state.compare_exchange(
            STATE_WAITING,
            STATE_CANCEL_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn mark_token_acquired(&self) {
        self.state.store(STATE_TOKEN_ACQUIRED, Ordering::SeqCst);
    }
}

fn required_string(value: &Value, field: &str) -> Result<String, Error> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::invalid_input(format!("device response is missing {field}")))
}

fn seconds_field(value: &Value, field: &str) -> Option<u64> {
    match value.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl AzureAuthority {
    /// Starts a device-code authorization
    #[tracing::instrument(err, skip_all, fields(tenant = %self.tenant(), client_id = %client_id))]
    pub async fn request_device_authorization(
        &self,
        http: &dyn HttpClient,
        client_id: &ClientIdRef,
        resource: Option<&str>,
        redirect_uri: Option<&str>,
        scope: Option<&str>,
        clock: &(dyn Clock + Sync),
    ) -> Result<DeviceFlowResponse, Error> {
        // the serializer is not Send, so the body is built before the await
        let body = {
            let mut body = form_urlencoded::Serializer::new(String::new());
            body.append_pair("response_type", "device_code");
            body.append_pair("client_id", client_id.as_str());
            if let Some(resource) = resource {
                body.append_pair("resource", resource);
            }
            if let Some(redirect_uri) = redirect_uri {
                body.append_pair("redirect_uri", redirect_uri);
            }
            if let Some(scope) = scope {
                body.append_pair("scope", scope);
            }
            body.finish()
        };

        let response = http.post_form(&self.device_endpoint(), body).await?;
        let body = response.into_success_body()?;
        let response = DeviceFlowResponse::from_json(&body, clock.now())?;

        tracing::info!(
            user_code = %response.user_code(),
            verification_uri = response.verification_uri(),
            interval_seconds = response.interval_seconds(),
            "device authorization started"
        );
        Ok(response)
    }

    /// Polls the token endpoint until the device authorization resolves
    pub async fn acquire_token_by_device_flow(
        &self,
        http: &dyn HttpClient,
        client_id: &ClientIdRef,
        response: &DeviceFlowResponse,
        clock: &(dyn Clock + Sync),
    ) -> Result<TokenPair, Error> {
        poll_for_token(http, &self.token_endpoint(), client_id, response, clock).await
    }
}

pub(crate) async fn poll_for_token(
    http: &dyn HttpClient,
    token_endpoint: &str,
    client_id: &ClientIdRef,
    response: &DeviceFlowResponse,
    clock: &(dyn Clock + Sync),
) -> Result<TokenPair, Error> {
    let mut interval_seconds = response.interval_seconds();

    loop {
        if response.state() == DeviceFlowState::CancelRequested {
            return Err(Error::authorization("request_cancelled"));
        }
        if clock.now() >= response.expires_at() {
            return Err(Error::authorization("code_expired"));
        }

        let body = {
            let mut body = form_urlencoded::Serializer::new(String::new());
            body.append_pair("grant_type", "device_code");
            body.append_pair("code", response.device_code.as_str());
            body.append_pair("client_id", client_id.as_str());
            body.finish()
        };

        let poll = http.post_form(token_endpoint, body).await?;

        if poll.is_success() {
            let pair = parse_token_response(poll.into_success_body()?)?;
            response.mark_token_acquired();
            tracing::info!("device authorization completed");
            return Ok(pair);
        }

        if poll.status() != 400 {
            return Err(Error::upstream(poll.status(), poll.body()));
        }

        let error: Value = serde_json::from_str(poll.body()).unwrap_or(Value::Null);
        match error.get("error").and_then(Value::as_str) {
            Some("authorization_pending") => {
                tracing::debug!(interval_seconds, "authorization pending");
            }
            Some("slow_down") => {
                interval_seconds *= 2;
                tracing::debug!(interval_seconds, "authority asked to slow down");
            }
            Some(code) => {
                return Err(Error::Authorization {
                    code: code.to_owned(),
                    description: error
                        .get("error_description")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    uri: error
                        .get("error_uri")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                });
            }
            None => return Err(Error::upstream(poll.status(), poll.body())),
        }

        tokio::time::sleep(Duration::from_secs(interval_seconds)).await;
    }
}
