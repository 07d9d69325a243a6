//! DNS-01 challenge resolution
//!
//! Drives every authorization of an order through
//! `Pending -> RecordProvisioned -> ValidationRequested -> Valid | Invalid`.
//!
//! Authorizations are handled strictly one after the other. Several domains
//! may share a single challenge record (see [`crate::dns`] on delegated
//! zones), so a record is always withdrawn before the next one is written.
//! The record is withdrawn whatever the validation outcome was.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certpilot_config::Settings;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use super::error::AcmeError;
use super::transport::{AcmeTransport, Authorization, AuthorizationStatus, Challenge};
use crate::dns::{ChallengeTarget, DnsProvider};

/// TXT record value for a key authorization
///
/// `base64url(SHA-256(key_authorization))` without padding.
pub fn dns01_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// Per-authorization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Pending,
    RecordProvisioned,
    ValidationRequested,
    Valid,
    Invalid,
}

/// Final state of one authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthorization {
    pub domain: String,
    pub state: ChallengeState,
}

/// Tunables for challenge resolution
#[derive(Debug, Clone)]
pub struct ChallengeSettings {
    /// Zone every challenge record is written to, if delegated via CNAME
    pub delegated_zone: Option<String>,
    /// TTL of challenge records in seconds
    pub ttl: u32,
    /// Fixed wait between writing the record and requesting validation
    pub propagation_delay: Duration,
}

impl From<&Settings> for ChallengeSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            delegated_zone: settings.dns.delegated_zone.clone(),
            ttl: settings.dns.ttl,
            propagation_delay: settings.propagation_delay(),
        }
    }
}

/// A challenge record that has been written and must be withdrawn
struct ProvisionedRecord {
    target: ChallengeTarget,
    value: String,
}

/// Resolves DNS-01 challenges through a [`DnsProvider`]
#[derive(Debug, Clone)]
pub struct ChallengeResolver {
    provider: Arc<dyn DnsProvider>,
    settings: ChallengeSettings,
}

impl ChallengeResolver {
    pub fn new(provider: Arc<dyn DnsProvider>, settings: ChallengeSettings) -> Self {
        Self { provider, settings }
    }

    /// Resolve every authorization of `order`, in the order the server lists them
    ///
    /// The first failure aborts the whole order.
    pub async fn resolve_all<T>(
        &self,
        transport: &T,
        order: &mut T::Order,
    ) -> Result<Vec<ResolvedAuthorization>, AcmeError>
    where
        T: AcmeTransport + ?Sized,
    {
        let authorizations = transport.authorizations(order).await?;
        debug!(
            count = authorizations.len(),
            provider = self.provider.name(),
            "Resolving authorizations"
        );

        let mut resolved = Vec::with_capacity(authorizations.len());
        for authorization in &authorizations {
            resolved.push(self.resolve(transport, order, authorization).await?);
        }
        Ok(resolved)
    }

    /// Drive one authorization to a terminal state
    pub async fn resolve<T>(
        &self,
        transport: &T,
        order: &mut T::Order,
        authorization: &Authorization,
    ) -> Result<ResolvedAuthorization, AcmeError>
    where
        T: AcmeTransport + ?Sized,
    {
        let domain = authorization.domain.as_str();

        match authorization.status {
            AuthorizationStatus::Valid => {
                debug!(domain = %domain, "Authorization already valid");
                return Ok(ResolvedAuthorization {
                    domain: domain.to_string(),
                    state: ChallengeState::Valid,
                });
            }
            AuthorizationStatus::Pending => {}
            status => {
                return Err(AcmeError::challenge(
                    domain,
                    "fetching authorization",
                    format!("authorization is {:?}", status),
                ));
            }
        }

        let challenge =
            authorization
                .dns01()
                .ok_or_else(|| AcmeError::ChallengeTypeUnsupported {
                    domain: domain.to_string(),
                })?;
        let mut state = ChallengeState::Pending;

        let record = self.provision(domain, challenge).await?;
        advance(domain, &mut state, ChallengeState::RecordProvisioned);

        let outcome = self
            .validate(transport, order, authorization, challenge, &mut state)
            .await;
        self.release(domain, record).await;

        outcome?;
        info!(domain = %domain, "Authorization valid");
        Ok(ResolvedAuthorization {
            domain: domain.to_string(),
            state,
        })
    }

    async fn provision(
        &self,
        domain: &str,
        challenge: &Challenge,
    ) -> Result<ProvisionedRecord, AcmeError> {
        let dns_error = |source| AcmeError::DnsProvider {
            domain: domain.to_string(),
            source,
        };

        let target = ChallengeTarget::resolve(
            self.provider.as_ref(),
            self.settings.delegated_zone.as_deref(),
            domain,
        )
        .await
        .map_err(dns_error)?;

        let value = dns01_value(&challenge.key_authorization);
        self.provider
            .upsert_txt_record(&target.zone, &target.record_name, &value, self.settings.ttl)
            .await
            .map_err(dns_error)?;

        info!(
            domain = %domain,
            record = %target.record_name,
            zone = %target.zone,
            "Challenge record provisioned"
        );
        Ok(ProvisionedRecord { target, value })
    }

    async fn validate<T>(
        &self,
        transport: &T,
        order: &mut T::Order,
        authorization: &Authorization,
        challenge: &Challenge,
        state: &mut ChallengeState,
    ) -> Result<(), AcmeError>
    where
        T: AcmeTransport + ?Sized,
    {
        let domain = authorization.domain.as_str();

        debug!(
            domain = %domain,
            delay_secs = self.settings.propagation_delay.as_secs(),
            "Waiting for DNS propagation"
        );
        sleep(self.settings.propagation_delay).await;

        advance(domain, state, ChallengeState::ValidationRequested);
        let status = transport
            .submit_challenge(order, authorization, challenge)
            .await?;

        match status {
            AuthorizationStatus::Valid => {
                advance(domain, state, ChallengeState::Valid);
                Ok(())
            }
            AuthorizationStatus::Pending => Err(AcmeError::challenge(
                domain,
                "validating",
                "no terminal authorization state reached",
            )),
            status => {
                advance(domain, state, ChallengeState::Invalid);
                Err(AcmeError::challenge(
                    domain,
                    "validating",
                    format!("authorization is {:?}", status),
                ))
            }
        }
    }

    /// Withdraw a challenge record; failures are logged, never returned
    async fn release(&self, domain: &str, record: ProvisionedRecord) {
        let ProvisionedRecord { target, value } = record;
        match self
            .provider
            .delete_txt_record(&target.zone, &target.record_name, &value)
            .await
        {
            Ok(()) => debug!(
                domain = %domain,
                record = %target.record_name,
                "Challenge record removed"
            ),
            Err(e) => warn!(
                domain = %domain,
                record = %target.record_name,
                error = %e,
                "Failed to remove challenge record"
            ),
        }
    }
}

fn advance(domain: &str, state: &mut ChallengeState, next: ChallengeState) {
    trace!(domain = %domain, from = ?state, to = ?next, "Challenge state change");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns01_value() {
        // Key authorization from the RFC 8555 examples
        assert_eq!(
            dns01_value(
                "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA.nP1qzpXGymHBrUEepNY9HCsQk7K8KhOypzEt62jcerQ"
            ),
            "NGwKoXBgCT8JhEa0bK7AwfSqHyu_ZWeugV07fLGIVq0"
        );
        assert_eq!(dns01_value("abc"), "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0");
    }

    #[test]
    fn test_dns01_value_is_unpadded_base64url() {
        let value = dns01_value("token.thumbprint");
        assert_eq!(value.len(), 43);
        assert!(!value.contains('='));
        assert!(!value.contains('+'));
        assert!(!value.contains('/'));
    }

    #[test]
    fn test_settings_conversion() {
        let mut settings = Settings::default();
        settings.dns.delegated_zone = Some("yourcname.com".to_string());
        settings.propagation_delay_secs = 3;

        let challenge = ChallengeSettings::from(&settings);
        assert_eq!(challenge.delegated_zone.as_deref(), Some("yourcname.com"));
        assert_eq!(challenge.ttl, 10);
        assert_eq!(challenge.propagation_delay, Duration::from_secs(3));
    }
}
