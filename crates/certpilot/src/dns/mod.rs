//! DNS provisioning for DNS-01 challenges
//!
//! # Architecture
//!
//! - [`DnsProvider`] - Trait for DNS provider implementations
//! - [`ChallengeTarget`] - Where a domain's challenge record is published
//! - [`WebhookProvider`] - Generic HTTP webhook for custom DNS backends
//!
//! # Delegated zones
//!
//! Operators usually CNAME `_acme-challenge.<domain>` for every managed
//! domain into one zone they control through the provider API:
//!
//! ```text
//! _acme-challenge.example.com.  CNAME  _acme-challenge.acme-delegate.net.
//! ```
//!
//! With `delegated_zone = "acme-delegate.net"` every challenge record is
//! written to `_acme-challenge.acme-delegate.net`. Since all domains then
//! share a single record name, challenges must be provisioned one at a time.

pub mod credentials;
mod provider;
mod webhook;

pub use credentials::ApiToken;
pub use provider::{
    challenge_record_fqdn, normalize_domain, ChallengeTarget, DnsProvider, DnsProviderError,
    DnsResult, ACME_CHALLENGE_LABEL,
};
pub use webhook::WebhookProvider;

use std::sync::Arc;

use certpilot_config::{DnsProviderKind, DnsSettings};

/// Create a DNS provider from settings
pub fn create_provider(settings: &DnsSettings) -> DnsResult<Arc<dyn DnsProvider>> {
    let token = load_token(settings)?;

    match settings.provider {
        DnsProviderKind::Webhook => {
            let url = settings.url.clone().ok_or_else(|| {
                DnsProviderError::Configuration(
                    "The webhook provider requires 'dns.url'".to_string(),
                )
            })?;
            let provider = WebhookProvider::new(
                url,
                settings.auth_header.clone(),
                token,
                settings.api_timeout(),
            )?;
            Ok(Arc::new(provider))
        }
    }
}

fn load_token(settings: &DnsSettings) -> DnsResult<Option<ApiToken>> {
    if let Some(ref path) = settings.credentials_file {
        return credentials::load_from_file(path).map(Some);
    }
    if let Some(ref var) = settings.credentials_env {
        return credentials::load_from_env(var).map(Some);
    }
    Ok(None)
}
