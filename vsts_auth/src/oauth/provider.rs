use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use http::Uri;
use tracing::{debug, warn};
use uuid::Uuid;

use super::authority::{AzureAuthority, DEFAULT_AUTHORITY_HOST};
use crate::http::HttpClient;
use crate::pat::GLOBAL_SENTINEL_URI;

/// The response header naming the Azure AD tenant behind a resource
pub(crate) const RESOURCE_TENANT_HEADER: &str = "X-VSS-ResourceTenant";

/// Maps target URIs to the Azure AD authority backing them
///
/// Hosted resources advertise their directory in the
/// `X-VSS-ResourceTenant` response header, read with a redirect-free probe.
/// A missing header, a nil tenant, or an unparseable value all mean the
/// resource is MSA-backed and gets the `common`-tenant authority; so does
/// the global sentinel URI and any host outside the platform families.
/// Discovered tenants are cached per target for the life of the provider.
pub struct AzureAuthorityProvider {
    http: Arc<dyn HttpClient>,
    authority_host: String,
    tenants: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for AzureAuthorityProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AzureAuthorityProvider")
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

impl AzureAuthorityProvider {
    /// A provider against the default authority host
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_authority_host(http, DEFAULT_AUTHORITY_HOST)
    }

    /// A provider against a non-default authority host
    pub fn with_authority_host(http: Arc<dyn HttpClient>, host: impl Into<String>) -> Self {
        Self {
            http,
            authority_host: host.into(),
            tenants: Mutex::new(HashMap::new()),
        }
    }

    fn authority(&self, tenant: &str) -> AzureAuthority {
        AzureAuthority::with_host(&self.authority_host, tenant)
    }

    fn default_authority(&self) -> AzureAuthority {
        self.authority(super::authority::COMMON_TENANT)
    }

    /// The authority for a target URI, discovering its tenant if needed
    pub async fn authority_for(&self, target: &Uri) -> AzureAuthority {
        let target_text = target.to_string();
        if target_text.trim_end_matches('/') == GLOBAL_SENTINEL_URI
            || !crate::pat::is_hosted(target)
        {
            return self.default_authority();
        }

        if let Some(tenant) = self.tenants.lock().unwrap().get(&target_text) {
            return self.authority(tenant);
        }

        let tenant = self.discover_tenant(&target_text).await;
        self.tenants
            .lock()
            .unwrap()
            .insert(target_text, tenant.clone());
        self.authority(&tenant)
    }

    async fn discover_tenant(&self, target: &str) -> String {
        let header = match self.http.get_header(target, RESOURCE_TENANT_HEADER).await {
            Ok(header) => header,
            Err(error) => {
                warn!(target, error = %error, "tenant discovery failed; assuming MSA");
                return super::authority::COMMON_TENANT.to_owned();
            }
        };

        match header.as_deref().map(str::trim).map(Uuid::parse_str) {
            Some(Ok(tenant)) if !tenant.is_nil() => {
                debug!(target, %tenant, "discovered resource tenant");
                tenant.to_string()
            }
            _ => {
                debug!(target, "no resource tenant advertised; assuming MSA");
                super::authority::COMMON_TENANT.to_owned()
            }
        }
    }
}
