//! DNS provider trait for DNS-01 challenges
//!
//! A provider only needs to resolve which zone owns a name and to upsert or
//! delete one TXT record in that zone. Everything else about the challenge
//! (digest, timing, ordering) lives in the challenge resolver.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Result type for DNS operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors that can occur during DNS provider operations
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Authentication failed with the DNS provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No zone manages the name
    #[error("Zone not found for '{name}'")]
    ZoneNotFound { name: String },

    /// Record creation or update failed
    #[error("Failed to upsert TXT record '{record_name}': {message}")]
    RecordUpsert { record_name: String, message: String },

    /// Record deletion failed
    #[error("Failed to delete TXT record '{record_name}': {message}")]
    RecordDeletion { record_name: String, message: String },

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Request timeout
    #[error("Request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Credential loading failed
    #[error("Failed to load credentials: {0}")]
    Credentials(String),
}

/// Capability to publish and withdraw ACME challenge TXT records
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Provider name for logs (e.g. "webhook")
    fn name(&self) -> &'static str;

    /// Resolve the provider zone that manages `name`
    ///
    /// The returned identifier is opaque to callers and is passed back
    /// unchanged to [`upsert_txt_record`](Self::upsert_txt_record) and
    /// [`delete_txt_record`](Self::delete_txt_record).
    async fn resolve_zone(&self, name: &str) -> DnsResult<String>;

    /// Create the TXT record, replacing any record already at that name
    async fn upsert_txt_record(
        &self,
        zone: &str,
        record_name: &str,
        value: &str,
        ttl: u32,
    ) -> DnsResult<()>;

    /// Delete the TXT record with the given value
    ///
    /// Deleting a record that no longer exists is not an error.
    async fn delete_txt_record(&self, zone: &str, record_name: &str, value: &str)
        -> DnsResult<()>;
}

/// ACME challenge record label
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Strip the wildcard label, if any
///
/// `*.example.com` is validated through `_acme-challenge.example.com`.
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Build the challenge record name for a domain or delegated zone
pub fn challenge_record_fqdn(name: &str) -> String {
    let name = normalize_domain(name).trim_end_matches('.');
    format!("{}.{}", ACME_CHALLENGE_LABEL, name)
}

/// Where the TXT record for one domain is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeTarget {
    /// Provider zone identifier
    pub zone: String,
    /// Fully qualified record name
    pub record_name: String,
}

impl ChallengeTarget {
    /// Resolve the record location for `domain`
    ///
    /// With a delegated zone, every domain's `_acme-challenge` name is a
    /// CNAME into that zone, so all records land at
    /// `_acme-challenge.<delegated_zone>`. Without one the record sits next
    /// to the domain itself.
    pub async fn resolve(
        provider: &dyn DnsProvider,
        delegated_zone: Option<&str>,
        domain: &str,
    ) -> DnsResult<Self> {
        let owner = match delegated_zone {
            Some(zone) => zone.trim_end_matches('.'),
            None => normalize_domain(domain),
        };
        let zone = provider.resolve_zone(owner).await?;
        Ok(Self {
            zone,
            record_name: challenge_record_fqdn(owner),
        })
    }
}
