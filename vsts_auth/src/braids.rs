use std::fmt;

use aliri_braid::braid;

macro_rules! redacted {
    ($ty:ty: $hidden:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }
    };
}

/// An OAuth2 client ID
#[braid(serde)]
pub struct ClientId;

/// An OAuth2 authorization code returned by the authorize endpoint
#[braid(serde, debug = "owned", display = "owned")]
pub struct AuthorizationCode;

redacted!(AuthorizationCodeRef: "AUTHORIZATION CODE");

/// A device code polled against the token endpoint
#[braid(serde, debug = "owned", display = "owned")]
pub struct DeviceCode;

redacted!(DeviceCodeRef: "DEVICE CODE");

/// The short code the user enters at the verification URI
#[braid(serde)]
pub struct UserCode;
