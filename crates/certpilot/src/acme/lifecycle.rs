//! Certificate lifecycle orchestration
//!
//! Chains account setup, challenge resolution, issuance, installation and
//! the store update for one certificate. The store is only touched once
//! everything else has succeeded.

use std::sync::Arc;

use certpilot_config::{CertificateRecord, ConfigError, ConfigStore, Settings};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::account::AccountManager;
use super::challenge::{ChallengeResolver, ChallengeSettings};
use super::error::AcmeError;
use super::issuer::CertificateIssuer;
use super::transport::AcmeTransport;
use crate::dns::DnsProvider;
use crate::install::Installer;

/// What to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Store key and work/deploy subdirectory name
    pub name: String,
    /// DNS names; the first one becomes the common name
    pub domains: Vec<String>,
    /// Contact emails; the configured defaults are used when empty
    pub emails: Vec<String>,
}

impl From<&CertificateRecord> for CertificateRequest {
    fn from(record: &CertificateRecord) -> Self {
        Self {
            name: record.name.clone(),
            domains: record.domains.clone(),
            emails: record.emails.clone(),
        }
    }
}

/// Issues and renews certificates end to end
pub struct CertificateManager<T> {
    transport: T,
    accounts: AccountManager,
    resolver: ChallengeResolver,
    issuer: CertificateIssuer,
    installer: Installer,
    store: ConfigStore,
    default_contacts: Vec<String>,
}

impl<T: AcmeTransport> CertificateManager<T> {
    /// Wire up a manager from the runtime settings
    pub fn new(transport: T, provider: Arc<dyn DnsProvider>, settings: &Settings) -> Self {
        Self {
            transport,
            accounts: AccountManager::new(&settings.account_file),
            resolver: ChallengeResolver::new(provider, ChallengeSettings::from(settings)),
            issuer: CertificateIssuer::new(),
            installer: Installer::from_settings(settings),
            store: ConfigStore::new(&settings.store_file),
            default_contacts: settings.default_contacts.clone(),
        }
    }

    /// The certificate store
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The ACME transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Obtain a certificate and record it in the store
    pub async fn obtain(&self, request: CertificateRequest) -> Result<CertificateRecord, AcmeError> {
        let CertificateRequest {
            name,
            domains,
            emails,
        } = request;

        if name.trim().is_empty() {
            return Err(ConfigError::Invalid("certificate name must not be empty".to_string()).into());
        }
        if domains.is_empty() {
            return Err(ConfigError::Invalid(format!("certificate '{}' has no domains", name)).into());
        }
        let emails = if emails.is_empty() {
            self.default_contacts.clone()
        } else {
            emails
        };

        let start = Instant::now();
        info!(name = %name, domains = ?domains, "Obtaining certificate");

        self.accounts
            .ensure_account(&self.transport, &emails)
            .await?;

        let mut order = self.transport.new_order(&domains).await?;
        let resolved = self
            .resolver
            .resolve_all(&self.transport, &mut order)
            .await?;
        debug!(name = %name, authorizations = resolved.len(), "All authorizations valid");

        let issued_at = Utc::now();
        let material = self
            .issuer
            .issue(&self.transport, &mut order, &domains)
            .await?;
        let expires_at = material.not_after()?;

        let work_dir = self.installer.cert_work_dir(&name);
        material.write_to(&work_dir)?;
        self.installer.install(&name)?;

        let record = CertificateRecord::new(name, domains, emails, issued_at, expires_at)?;
        self.store.upsert(&record)?;

        info!(
            name = %record.name,
            expires = %record.expires_at,
            elapsed_secs = start.elapsed().as_secs(),
            "Certificate obtained"
        );
        Ok(record)
    }

    /// Re-issue the certificate described by an existing record
    pub async fn renew(&self, record: &CertificateRecord) -> Result<CertificateRecord, AcmeError> {
        self.obtain(CertificateRequest::from(record)).await
    }
}

impl<T> std::fmt::Debug for CertificateManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("accounts", &self.accounts)
            .field("store", &self.store)
            .field("installer", &self.installer)
            .finish()
    }
}
