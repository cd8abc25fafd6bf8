//! The OAuth2 client for Azure AD
//!
//! [`AzureAuthority`] speaks the authorization-code and refresh-token flows
//! against one tenant's endpoints; [`device`] adds the device-code flow with
//! its slow-down and expiry semantics. [`AzureAuthorityProvider`] maps a
//! target URI to the right tenant by probing the resource for its
//! `X-VSS-ResourceTenant` header. The interactive user agent sits behind the
//! seam in [`agent`].

pub mod agent;
mod authority;
pub mod device;
mod provider;

pub use authority::{
    AuthorizationUrlRequest, AzureAuthority, COMMON_TENANT, DEFAULT_AUTHORITY_HOST,
    MANAGEMENT_CORE_RESOURCE,
};
pub use device::{DeviceFlowCallback, DeviceFlowResponse, DeviceFlowState};
pub use provider::AzureAuthorityProvider;
