//! ACME error types

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use certpilot_config::ConfigError;

use crate::dns::DnsProviderError;
use crate::install::InstallError;

/// Errors that can occur while issuing or renewing a certificate
///
/// Every variant aborts the certificate currently being processed.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Store, settings, or account file unreadable or unparsable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Account registration or update failed
    #[error("ACME account error: {0}")]
    Account(String),

    /// Order creation or finalization failed
    #[error("Order error: {0}")]
    Order(String),

    /// The authorization offers no DNS-01 challenge
    #[error("No DNS-01 challenge available for domain '{domain}'")]
    ChallengeTypeUnsupported { domain: String },

    /// Challenge validation failed
    #[error("Challenge failed for domain '{domain}' while {step}: {message}")]
    Challenge {
        domain: String,
        step: &'static str,
        message: String,
    },

    /// DNS provider operation failed
    #[error("DNS provider error for domain '{domain}': {source}")]
    DnsProvider {
        domain: String,
        #[source]
        source: DnsProviderError,
    },

    /// CSR generation, download, or chain assembly failed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Issued material could not be written to disk
    #[error("Failed to write '{}': {source}", path.display())]
    MaterialWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Issued material could not be moved into the deploy directory
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Renewal requested for a name that is not in the store
    #[error("Unknown certificate '{0}'")]
    UnknownCertificate(String),

    /// Operation timed out
    #[error("Operation timed out after {elapsed:?}: {what}")]
    Timeout { what: String, elapsed: Duration },

    /// Post-renewal command failed
    #[error("Post-renewal command failed: {0}")]
    Hook(String),
}

impl AcmeError {
    pub(crate) fn challenge(domain: &str, step: &'static str, message: impl ToString) -> Self {
        AcmeError::Challenge {
            domain: domain.to_string(),
            step,
            message: message.to_string(),
        }
    }
}
