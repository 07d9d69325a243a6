//! ACME transport contract
//!
//! The lifecycle code never talks to an ACME server directly. It drives an
//! [`AcmeTransport`], which owns the protocol mechanics (JWS signing,
//! nonces, polling) and exposes the handful of operations the DNS-01 flow
//! needs. [`InstantAcmeTransport`](super::InstantAcmeTransport) is the
//! production implementation.

use async_trait::async_trait;

use super::account::Account;
use super::error::AcmeError;

/// Status of an authorization as reported by the ACME server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    /// Revoked, expired, or deactivated
    Inactive,
}

impl AuthorizationStatus {
    /// Whether the server will not move this authorization any further
    pub fn is_terminal(self) -> bool {
        !matches!(self, AuthorizationStatus::Pending)
    }
}

/// Challenge types the server may offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeKind {
    Dns01,
    Http01,
    TlsAlpn01,
    Other(String),
}

/// One challenge offered for an authorization
#[derive(Debug, Clone)]
pub struct Challenge {
    pub kind: ChallengeKind,
    /// URL used to tell the server the challenge is ready
    pub url: String,
    pub token: String,
    /// `token || '.' || base64url(JWK thumbprint)` for the current account
    pub key_authorization: String,
}

/// Proof-of-control workflow for one identifier in an order
#[derive(Debug, Clone)]
pub struct Authorization {
    pub domain: String,
    pub status: AuthorizationStatus,
    pub challenges: Vec<Challenge>,
}

impl Authorization {
    /// The DNS-01 challenge, if the server offers one
    pub fn dns01(&self) -> Option<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.kind == ChallengeKind::Dns01)
    }
}

/// Capability to speak ACME v2 on behalf of one account
///
/// Implementations keep the active account internally once
/// [`register_account`](Self::register_account) or
/// [`restore_account`](Self::restore_account) has succeeded.
#[async_trait]
pub trait AcmeTransport: Send + Sync {
    /// Server-side order handle, scoped to one issuance run
    type Order: Send;

    /// Generate a key pair and register a new account
    async fn register_account(&self, contacts: &[String]) -> Result<Account, AcmeError>;

    /// Re-submit a persisted account and make it the active one
    async fn restore_account(
        &self,
        account: &Account,
        contacts: &[String],
    ) -> Result<Account, AcmeError>;

    /// Open an order for the given DNS identifiers
    async fn new_order(&self, domains: &[String]) -> Result<Self::Order, AcmeError>;

    /// Fetch the order's authorizations, in the order the server lists them
    async fn authorizations(&self, order: &mut Self::Order)
        -> Result<Vec<Authorization>, AcmeError>;

    /// Tell the server the challenge is ready and wait for the authorization
    /// to settle
    ///
    /// Returns the last status seen; a status that is still
    /// [`Pending`](AuthorizationStatus::Pending) means no terminal state was
    /// reached.
    async fn submit_challenge(
        &self,
        order: &mut Self::Order,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<AuthorizationStatus, AcmeError>;

    /// Submit the CSR and wait until the certificate is issued
    async fn finalize_order(&self, order: &mut Self::Order, csr_der: &[u8])
        -> Result<(), AcmeError>;

    /// Download the issued chain as DER certificates, leaf first
    async fn download_certificate(&self, order: &mut Self::Order)
        -> Result<Vec<Vec<u8>>, AcmeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(kind: ChallengeKind) -> Challenge {
        Challenge {
            kind,
            url: "https://acme.test/chall/1".to_string(),
            token: "tok".to_string(),
            key_authorization: "tok.thumb".to_string(),
        }
    }

    #[test]
    fn test_dns01_lookup() {
        let authz = Authorization {
            domain: "example.com".to_string(),
            status: AuthorizationStatus::Pending,
            challenges: vec![challenge(ChallengeKind::Http01), challenge(ChallengeKind::Dns01)],
        };
        assert_eq!(authz.dns01().unwrap().kind, ChallengeKind::Dns01);

        let http_only = Authorization {
            challenges: vec![challenge(ChallengeKind::Http01)],
            ..authz
        };
        assert!(http_only.dns01().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AuthorizationStatus::Pending.is_terminal());
        assert!(AuthorizationStatus::Valid.is_terminal());
        assert!(AuthorizationStatus::Invalid.is_terminal());
        assert!(AuthorizationStatus::Inactive.is_terminal());
    }
}
