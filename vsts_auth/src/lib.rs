//! Credential lifecycle for Azure-AD-backed Team Services
//!
//! This library mediates between a host application and the three
//! authentication worlds of the platform: basic username/password, OAuth2
//! against an Azure AD tenant, and platform-issued personal access tokens.
//! Each world is hidden behind an [`Authenticator`] that caches its secrets
//! in a pluggable [`SecretStore`][vsts_auth_secrets::SecretStore] and, on a
//! cache miss, runs the right interactive or non-interactive flow.
//!
//! Acquisition follows a single state machine (see [`retriever`]): read the
//! store, validate what was found, refresh when possible, and only then fall
//! back to prompting. [`PromptBehavior`] controls how far down that ladder a
//! call is allowed to go.
//!
//! The OAuth2 side ([`oauth`]) speaks the authorization-code and device-code
//! flows, discovers the Azure AD tenant backing a resource, and falls back
//! from an interactive user agent to the device flow. The PAT side ([`pat`])
//! bootstraps an OAuth2 access token and mints compact session tokens against
//! the platform's identity service.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authenticator;
mod braids;
pub mod config;
mod error;
pub mod http;
pub mod oauth;
pub mod pat;
pub mod retriever;

pub use authenticator::{
    Authenticator, BasicAuthenticator, CredentialPrompt, OAuth2Authenticator,
    OAuth2AuthenticatorBuilder, PatAuthenticator,
};
pub use braids::{
    AuthorizationCode, AuthorizationCodeRef, ClientId, ClientIdRef, DeviceCode, DeviceCodeRef,
    UserCode, UserCodeRef,
};
pub use error::Error;
pub use retriever::PromptBehavior;
