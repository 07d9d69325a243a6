//! ACME client wrapper around instant-acme
//!
//! Implements [`AcmeTransport`] for real ACME servers (Let's Encrypt and
//! compatible CAs).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use instant_acme::{
    Account as AcmeAccount, AccountCredentials, AuthorizationStatus as AcmeAuthorizationStatus,
    ChallengeType, Identifier, NewAccount, NewOrder, Order, OrderStatus,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use super::account::{contacts_changed, Account};
use super::error::AcmeError;
use super::transport::{
    AcmeTransport, Authorization, AuthorizationStatus, Challenge, ChallengeKind,
};

/// Initial delay between status polls
const INITIAL_POLL_DELAY: Duration = Duration::from_millis(250);

/// Upper bound for the delay between status polls
const MAX_POLL_DELAY: Duration = Duration::from_secs(10);

/// Attempts made to download an issued certificate
const DOWNLOAD_ATTEMPTS: u32 = 5;

/// ACME transport backed by `instant-acme`
pub struct InstantAcmeTransport {
    directory_url: String,
    /// How long to wait for an authorization or order to settle
    timeout: Duration,
    account: Mutex<Option<AcmeAccount>>,
}

impl InstantAcmeTransport {
    /// Create a transport for the given ACME directory
    pub fn new(directory_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            directory_url: directory_url.into(),
            timeout,
            account: Mutex::new(None),
        }
    }

    /// ACME directory URL
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    fn active_account(&self) -> Result<AcmeAccount, AcmeError> {
        self.account
            .lock()
            .clone()
            .ok_or_else(|| AcmeError::Account("No ACME account is active".to_string()))
    }

    fn activate(&self, account: AcmeAccount) {
        *self.account.lock() = Some(account);
    }
}

impl std::fmt::Debug for InstantAcmeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantAcmeTransport")
            .field("directory_url", &self.directory_url)
            .field("timeout", &self.timeout)
            .field("has_account", &self.account.lock().is_some())
            .finish()
    }
}

/// Convert library credentials into the account file form
///
/// `AccountCredentials` does not expose its fields, so they are read back
/// from its serialized JSON (`id` and base64url `key_pkcs8`).
pub(crate) fn account_from_credentials(
    credentials: &AccountCredentials,
) -> Result<Account, AcmeError> {
    let value = serde_json::to_value(credentials)
        .map_err(|e| AcmeError::Account(format!("Failed to serialize credentials: {}", e)))?;

    let url = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AcmeError::Account("Credentials carry no account URL".to_string()))?;
    let key = value
        .get("key_pkcs8")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AcmeError::Account("Credentials carry no private key".to_string()))?;
    let der = URL_SAFE_NO_PAD
        .decode(key)
        .map_err(|e| AcmeError::Account(format!("Invalid private key encoding: {}", e)))?;

    let block = pem::Pem::new("PRIVATE KEY", der);
    let private_key_pem =
        pem::encode_config(&block, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF));

    Ok(Account {
        private_key_pem,
        url: url.to_string(),
        contacts: Vec::new(),
    })
}

/// Convert the account file form into library credentials
pub(crate) fn credentials_from_account(
    account: &Account,
    directory_url: &str,
) -> Result<AccountCredentials, AcmeError> {
    let block = pem::parse(&account.private_key_pem)
        .map_err(|e| AcmeError::Account(format!("Invalid account key: {}", e)))?;

    let value = json!({
        "id": account.url,
        "key_pkcs8": URL_SAFE_NO_PAD.encode(block.contents()),
        "directory": directory_url,
    });
    serde_json::from_value(value)
        .map_err(|e| AcmeError::Account(format!("Invalid account credentials: {}", e)))
}

fn authorization_status(status: &AcmeAuthorizationStatus) -> AuthorizationStatus {
    match status {
        AcmeAuthorizationStatus::Pending => AuthorizationStatus::Pending,
        AcmeAuthorizationStatus::Valid => AuthorizationStatus::Valid,
        AcmeAuthorizationStatus::Invalid => AuthorizationStatus::Invalid,
        #[allow(unreachable_patterns)]
        _ => AuthorizationStatus::Inactive,
    }
}

fn challenge_kind(kind: &ChallengeType) -> ChallengeKind {
    match kind {
        ChallengeType::Dns01 => ChallengeKind::Dns01,
        ChallengeType::Http01 => ChallengeKind::Http01,
        ChallengeType::TlsAlpn01 => ChallengeKind::TlsAlpn01,
        #[allow(unreachable_patterns)]
        other => ChallengeKind::Other(format!("{:?}", other)),
    }
}

fn identifier_name(identifier: &Identifier) -> String {
    match identifier {
        Identifier::Dns(name) => name.clone(),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_POLL_DELAY)
}

#[async_trait]
impl AcmeTransport for InstantAcmeTransport {
    type Order = Order;

    async fn register_account(&self, contacts: &[String]) -> Result<Account, AcmeError> {
        let contact_refs: Vec<&str> = contacts.iter().map(String::as_str).collect();

        let (account, credentials) = AcmeAccount::create(
            &NewAccount {
                contact: &contact_refs,
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &self.directory_url,
            None,
        )
        .await
        .map_err(|e| AcmeError::Account(format!("Failed to create account: {}", e)))?;

        let mut stored = account_from_credentials(&credentials)?;
        stored.contacts = contacts.to_vec();
        self.activate(account);

        info!(
            directory = %self.directory_url,
            url = %stored.url,
            "Created ACME account"
        );
        Ok(stored)
    }

    async fn restore_account(
        &self,
        account: &Account,
        contacts: &[String],
    ) -> Result<Account, AcmeError> {
        let credentials = credentials_from_account(account, &self.directory_url)?;
        let restored = AcmeAccount::from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::Account(format!("Failed to restore account: {}", e)))?;
        self.activate(restored);

        // instant-acme has no account update call
        if contacts_changed(&account.contacts, contacts) {
            warn!(
                url = %account.url,
                registered = ?account.contacts,
                requested = ?contacts,
                "Contact change is not sent for existing ACME accounts"
            );
        }
        debug!(url = %account.url, "Restored ACME account");
        Ok(account.clone())
    }

    async fn new_order(&self, domains: &[String]) -> Result<Order, AcmeError> {
        let account = self.active_account()?;
        let identifiers: Vec<Identifier> =
            domains.iter().map(|d| Identifier::Dns(d.clone())).collect();

        let order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await
            .map_err(|e| AcmeError::Order(format!("Failed to create order: {}", e)))?;

        debug!(domains = ?domains, "Created ACME order");
        Ok(order)
    }

    async fn authorizations(&self, order: &mut Order) -> Result<Vec<Authorization>, AcmeError> {
        let authorizations = order
            .authorizations()
            .await
            .map_err(|e| AcmeError::Order(format!("Failed to get authorizations: {}", e)))?;

        Ok(authorizations
            .iter()
            .map(|authz| Authorization {
                domain: identifier_name(&authz.identifier),
                status: authorization_status(&authz.status),
                challenges: authz
                    .challenges
                    .iter()
                    .map(|c| Challenge {
                        kind: challenge_kind(&c.r#type),
                        url: c.url.clone(),
                        token: c.token.clone(),
                        key_authorization: order.key_authorization(c).as_str().to_string(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn submit_challenge(
        &self,
        order: &mut Order,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<AuthorizationStatus, AcmeError> {
        let domain = &authorization.domain;

        order
            .set_challenge_ready(&challenge.url)
            .await
            .map_err(|e| AcmeError::challenge(domain, "requesting validation", e))?;
        debug!(domain = %domain, url = %challenge.url, "Challenge marked ready");

        let deadline = Instant::now() + self.timeout;
        let mut delay = INITIAL_POLL_DELAY;
        let mut status = AuthorizationStatus::Pending;

        while Instant::now() < deadline {
            sleep(delay).await;
            delay = next_delay(delay);

            let authorizations = order
                .authorizations()
                .await
                .map_err(|e| AcmeError::challenge(domain, "polling authorization", e))?;

            // Locate by challenge URL: a wildcard and its base name share an identifier
            let current = authorizations
                .iter()
                .find(|a| a.challenges.iter().any(|c| c.url == challenge.url));
            let Some(current) = current else {
                return Err(AcmeError::challenge(
                    domain,
                    "polling authorization",
                    "authorization disappeared from the order",
                ));
            };

            status = authorization_status(&current.status);
            trace!(domain = %domain, status = ?status, "Polled authorization");
            if status.is_terminal() {
                break;
            }
        }

        Ok(status)
    }

    async fn finalize_order(&self, order: &mut Order, csr_der: &[u8]) -> Result<(), AcmeError> {
        let state = order
            .refresh()
            .await
            .map_err(|e| AcmeError::Order(format!("Failed to refresh order: {}", e)))?;
        if state.status != OrderStatus::Ready {
            return Err(AcmeError::Order(format!(
                "Order is not ready for finalization (status {:?})",
                state.status
            )));
        }

        order
            .finalize(csr_der)
            .await
            .map_err(|e| AcmeError::Order(format!("Failed to finalize order: {}", e)))?;

        let start = Instant::now();
        let mut delay = INITIAL_POLL_DELAY;
        loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| AcmeError::Order(format!("Failed to refresh order: {}", e)))?;

            match state.status {
                OrderStatus::Valid => {
                    debug!(elapsed_ms = start.elapsed().as_millis(), "Order finalized");
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    return Err(AcmeError::Order("Order became invalid".to_string()));
                }
                _ => {
                    trace!(status = ?state.status, "Waiting for certificate issuance");
                }
            }

            if start.elapsed() >= self.timeout {
                return Err(AcmeError::Timeout {
                    what: "certificate issuance".to_string(),
                    elapsed: start.elapsed(),
                });
            }
            sleep(delay).await;
            delay = next_delay(delay);
        }
    }

    async fn download_certificate(&self, order: &mut Order) -> Result<Vec<Vec<u8>>, AcmeError> {
        let mut chain_pem = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match order.certificate().await {
                Ok(Some(pem)) => {
                    chain_pem = Some(pem);
                    break;
                }
                Ok(None) => {
                    debug!(attempt, "Certificate not yet available");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Certificate download failed");
                }
            }
            sleep(Duration::from_secs(1)).await;
        }

        let chain_pem = chain_pem.ok_or_else(|| {
            AcmeError::Certificate(format!(
                "Certificate not available after {} attempts",
                DOWNLOAD_ATTEMPTS
            ))
        })?;

        let chain = rustls_pemfile::certs(&mut chain_pem.as_bytes())
            .map(|cert| cert.map(|der| der.as_ref().to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AcmeError::Certificate(format!("Failed to parse chain: {}", e)))?;

        if chain.is_empty() {
            return Err(AcmeError::Certificate(
                "Downloaded chain contains no certificates".to_string(),
            ));
        }

        debug!(certificates = chain.len(), "Downloaded certificate chain");
        Ok(chain)
    }
}
