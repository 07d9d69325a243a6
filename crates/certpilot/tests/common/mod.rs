//! Shared test utilities for integration tests
//!
//! Recording fakes for the DNS provider and the ACME transport. Both push
//! into one shared [`EventLog`] so tests can assert on the interleaving of
//! DNS and ACME calls.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tempfile::TempDir;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use certpilot::acme::{
    Account, AcmeError, AcmeTransport, Authorization, AuthorizationStatus, Challenge,
    ChallengeKind,
};
use certpilot::dns::{DnsProvider, DnsProviderError, DnsResult};
use certpilot_config::Settings;

/// One observable call made by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Register(Vec<String>),
    Restore(String),
    NewOrder(Vec<String>),
    Upsert { record: String, value: String },
    Delete { record: String, value: String },
    Validate(String),
    Finalize,
    Download,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Settings pointing every path into `dir`, with no propagation delay
pub fn test_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.account_file = dir.join("account.json");
    settings.store_file = dir.join("config.json");
    settings.work_dir = dir.join("tmp");
    settings.deploy_dir = dir.join("live");
    settings.propagation_delay_secs = 0;
    settings.default_contacts = vec!["ops@example.com".to_string()];
    settings
}

pub fn test_dir() -> TempDir {
    TempDir::new().unwrap()
}

pub fn domains(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// DNS provider
// ============================================================================

/// DNS provider that records every call
#[derive(Debug)]
pub struct RecordingDns {
    log: EventLog,
    /// Records written and not yet deleted
    live: Mutex<Vec<String>>,
    /// Upserts for this record name fail
    pub fail_upsert_for: Option<String>,
    /// Every delete fails
    pub fail_delete: bool,
}

impl RecordingDns {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            live: Mutex::new(Vec::new()),
            fail_upsert_for: None,
            fail_delete: false,
        }
    }

    /// Records that were written and never deleted
    pub fn live_records(&self) -> Vec<String> {
        self.live.lock().clone()
    }
}

#[async_trait]
impl DnsProvider for RecordingDns {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn resolve_zone(&self, name: &str) -> DnsResult<String> {
        Ok(format!("Z-{}", name))
    }

    async fn upsert_txt_record(
        &self,
        _zone: &str,
        record_name: &str,
        value: &str,
        _ttl: u32,
    ) -> DnsResult<()> {
        if self.fail_upsert_for.as_deref() == Some(record_name) {
            return Err(DnsProviderError::RecordUpsert {
                record_name: record_name.to_string(),
                message: "rejected".to_string(),
            });
        }
        self.log.lock().push(Event::Upsert {
            record: record_name.to_string(),
            value: value.to_string(),
        });
        self.live.lock().push(record_name.to_string());
        Ok(())
    }

    async fn delete_txt_record(&self, _zone: &str, record_name: &str, value: &str) -> DnsResult<()> {
        self.log.lock().push(Event::Delete {
            record: record_name.to_string(),
            value: value.to_string(),
        });
        if self.fail_delete {
            return Err(DnsProviderError::RecordDeletion {
                record_name: record_name.to_string(),
                message: "provider unavailable".to_string(),
            });
        }
        self.live.lock().retain(|r| r != record_name);
        Ok(())
    }
}

// ============================================================================
// ACME transport
// ============================================================================

/// Order handle of the fake CA
#[derive(Debug, Default)]
pub struct FakeOrder {
    pub domains: Vec<String>,
    /// Common name and SANs read back from the submitted CSR
    pub csr_names: Option<(String, Vec<String>)>,
}

/// In-memory ACME server with a self-signing CA
#[derive(Debug)]
pub struct FakeAcme {
    log: EventLog,
    accounts: Mutex<u32>,
    /// Offer only HTTP-01 challenges
    pub http01_only: bool,
    /// Validation of these domains ends in `Invalid`
    pub invalid: HashSet<String>,
    /// Validation of these domains never settles
    pub stuck: HashSet<String>,
    /// These domains are already authorized
    pub preauthorized: HashSet<String>,
    /// Restoring an existing account fails
    pub reject_restore: bool,
}

impl FakeAcme {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            accounts: Mutex::new(0),
            http01_only: false,
            invalid: HashSet::new(),
            stuck: HashSet::new(),
            preauthorized: HashSet::new(),
            reject_restore: false,
        }
    }

    fn record(&self, event: Event) {
        self.log.lock().push(event);
    }
}

fn challenge_for(domain: &str, index: usize, kind: ChallengeKind) -> Challenge {
    let token = format!("token-{}", index);
    Challenge {
        kind,
        url: format!("https://acme.test/chall/{}", index),
        key_authorization: format!("{}.thumbprint-{}", token, domain),
        token,
    }
}

/// Common name and DNS SANs of a DER CSR
pub fn csr_names(der: &[u8]) -> (String, Vec<String>) {
    let (_, csr) = X509CertificationRequest::from_der(der).unwrap();
    let cn = csr
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut sans = Vec::new();
    for ext in csr.requested_extensions().into_iter().flatten() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    sans.push(dns.to_string());
                }
            }
        }
    }
    (cn, sans)
}

/// Self-signed certificate for the given names, valid until `year-06-01`
pub fn self_signed(cn: &str, sans: &[String], year: i32) -> Vec<u8> {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(sans.to_vec()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_after = rcgen::date_time_ymd(year, 6, 1);
    params.self_signed(&key).unwrap().der().to_vec()
}

/// Expiry year of every certificate the fake CA issues
pub const ISSUED_UNTIL_YEAR: i32 = 2040;

#[async_trait]
impl AcmeTransport for FakeAcme {
    type Order = FakeOrder;

    async fn register_account(&self, contacts: &[String]) -> Result<Account, AcmeError> {
        self.record(Event::Register(contacts.to_vec()));
        let mut count = self.accounts.lock();
        *count += 1;
        Ok(Account {
            private_key_pem: KeyPair::generate().unwrap().serialize_pem(),
            url: format!("https://acme.test/acct/{}", *count),
            contacts: contacts.to_vec(),
        })
    }

    async fn restore_account(
        &self,
        account: &Account,
        _contacts: &[String],
    ) -> Result<Account, AcmeError> {
        self.record(Event::Restore(account.url.clone()));
        if self.reject_restore {
            return Err(AcmeError::Account("account is deactivated".to_string()));
        }
        Ok(account.clone())
    }

    async fn new_order(&self, domains: &[String]) -> Result<FakeOrder, AcmeError> {
        self.record(Event::NewOrder(domains.to_vec()));
        Ok(FakeOrder {
            domains: domains.to_vec(),
            csr_names: None,
        })
    }

    async fn authorizations(&self, order: &mut FakeOrder) -> Result<Vec<Authorization>, AcmeError> {
        Ok(order
            .domains
            .iter()
            .enumerate()
            .map(|(index, domain)| {
                let mut challenges = vec![challenge_for(domain, index, ChallengeKind::Http01)];
                if !self.http01_only {
                    challenges.push(challenge_for(domain, index, ChallengeKind::Dns01));
                }
                let status = if self.preauthorized.contains(domain) {
                    AuthorizationStatus::Valid
                } else {
                    AuthorizationStatus::Pending
                };
                Authorization {
                    domain: domain.clone(),
                    status,
                    challenges,
                }
            })
            .collect())
    }

    async fn submit_challenge(
        &self,
        _order: &mut FakeOrder,
        authorization: &Authorization,
        _challenge: &Challenge,
    ) -> Result<AuthorizationStatus, AcmeError> {
        let domain = &authorization.domain;
        self.record(Event::Validate(domain.clone()));
        if self.invalid.contains(domain) {
            Ok(AuthorizationStatus::Invalid)
        } else if self.stuck.contains(domain) {
            Ok(AuthorizationStatus::Pending)
        } else {
            Ok(AuthorizationStatus::Valid)
        }
    }

    async fn finalize_order(&self, order: &mut FakeOrder, csr_der: &[u8]) -> Result<(), AcmeError> {
        self.record(Event::Finalize);
        order.csr_names = Some(csr_names(csr_der));
        Ok(())
    }

    async fn download_certificate(&self, order: &mut FakeOrder) -> Result<Vec<Vec<u8>>, AcmeError> {
        self.record(Event::Download);
        let (cn, sans) = order
            .csr_names
            .clone()
            .ok_or_else(|| AcmeError::Order("order was not finalized".to_string()))?;
        let leaf = self_signed(&cn, &sans, ISSUED_UNTIL_YEAR);
        let root = self_signed("Fake Root CA", &["root.acme.test".to_string()], 2045);
        Ok(vec![leaf, root])
    }
}
