//! Certpilot Library
//!
//! ACME DNS-01 certificate issuance and renewal with pluggable DNS providers.
//!
//! This library provides the pieces behind the `certpilot` binary:
//!
//! - **ACME lifecycle**: Account handling, challenge resolution, issuance, renewal
//! - **DNS providers**: Publishing and withdrawing `_acme-challenge` TXT records
//! - **Installation**: Moving issued material into the deploy directory
//! - **Hooks**: Running a command after certificates were renewed
//!
//! # Example
//!
//! ```ignore
//! use certpilot::acme::{CertificateManager, CertificateRequest, InstantAcmeTransport};
//! use certpilot::dns::create_provider;
//! use certpilot_config::Settings;
//!
//! let settings = Settings::load(path)?;
//! let provider = create_provider(&settings.dns)?;
//! let transport = InstantAcmeTransport::new(settings.directory_url(), settings.validation_timeout());
//! let manager = CertificateManager::new(transport, provider, &settings);
//!
//! manager.obtain(CertificateRequest {
//!     name: "example".into(),
//!     domains: vec!["example.com".into(), "*.example.com".into()],
//!     emails: vec!["admin@example.com".into()],
//! }).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod dns;
pub mod hooks;
pub mod install;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Lifecycle
pub use acme::{
    AcmeError, CertificateManager, CertificateRequest, InstantAcmeTransport, RenewalScheduler,
    RenewalSummary,
};

// DNS providers
pub use dns::{create_provider, DnsProvider, DnsProviderError};

// Installation and hooks
pub use hooks::run_post_command;
pub use install::{InstallError, Installer};
