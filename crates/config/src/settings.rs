//! Runtime settings
//!
//! Loaded once at startup from a TOML file and handed to every component
//! that needs it. Nothing in here is read from globals.
//!
//! ```toml
//! account_file = "/etc/letsencrypt/account.json"
//! store_file = "/etc/letsencrypt/config.json"
//! work_dir = "/etc/letsencrypt/tmp"
//! deploy_dir = "/etc/letsencrypt/live"
//! staging = false
//! default_contacts = ["admin@example.com"]
//! renew_before_days = 30
//! propagation_delay_secs = 15
//!
//! [dns]
//! provider = "webhook"
//! url = "https://dns-hook.internal/api"
//! credentials_env = "CERTPILOT_DNS_TOKEN"
//! delegated_zone = "acme-delegate.example.net"
//! ttl = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Let's Encrypt production directory URL
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt staging directory URL
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/certpilot/certpilot.toml";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Persisted ACME account (key + URL)
    pub account_file: PathBuf,
    /// Certificate record store
    pub store_file: PathBuf,
    /// Per-certificate working directories are created under this path
    pub work_dir: PathBuf,
    /// Final location of issued certificates
    pub deploy_dir: PathBuf,
    /// Explicit ACME directory; overrides `staging`
    pub directory_url: Option<String>,
    /// Use the Let's Encrypt staging environment
    pub staging: bool,
    /// Contacts used when a command does not name any
    pub default_contacts: Vec<String>,
    /// Renew when a certificate has this many days or fewer left
    pub renew_before_days: u32,
    /// Fixed wait between provisioning a record and requesting validation
    pub propagation_delay_secs: u64,
    /// Upper bound on waiting for an authorization or order to settle
    pub validation_timeout_secs: u64,
    /// DNS provider for challenge records
    pub dns: DnsSettings,
}

/// Supported DNS provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProviderKind {
    /// Generic HTTP webhook
    Webhook,
}

/// DNS provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsSettings {
    pub provider: DnsProviderKind,
    /// Base URL of the provider API
    pub url: Option<String>,
    /// Custom header carrying the credential instead of `Authorization: Bearer`
    pub auth_header: Option<String>,
    /// Environment variable holding the credential
    pub credentials_env: Option<String>,
    /// File holding the credential (should be mode 0600)
    pub credentials_file: Option<PathBuf>,
    /// Zone that every `_acme-challenge` name is CNAMEd into
    pub delegated_zone: Option<String>,
    /// TTL of challenge records in seconds
    pub ttl: u32,
    /// Timeout of a single provider API call
    pub api_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_file: PathBuf::from("/etc/letsencrypt/account.json"),
            store_file: PathBuf::from("/etc/letsencrypt/config.json"),
            work_dir: PathBuf::from("/etc/letsencrypt/tmp"),
            deploy_dir: PathBuf::from("/etc/letsencrypt/live"),
            directory_url: None,
            staging: false,
            default_contacts: Vec::new(),
            renew_before_days: 30,
            propagation_delay_secs: 15,
            validation_timeout_secs: 120,
            dns: DnsSettings::default(),
        }
    }
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            provider: DnsProviderKind::Webhook,
            url: None,
            auth_header: None,
            credentials_env: None,
            credentials_file: None,
            delegated_zone: None,
            ttl: 10,
            api_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let settings: Settings =
            toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))?;

        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Parse settings from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::parse(Path::new("<inline>"), e))
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("work_dir must not be empty".to_string()));
        }
        if self.deploy_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("deploy_dir must not be empty".to_string()));
        }
        if self.renew_before_days == 0 {
            return Err(ConfigError::Invalid(
                "renew_before_days must be at least 1".to_string(),
            ));
        }
        if let Some(ref directory) = self.directory_url {
            url::Url::parse(directory).map_err(|e| {
                ConfigError::Invalid(format!("directory_url '{}': {}", directory, e))
            })?;
        }
        self.dns.validate()
    }

    /// ACME directory to talk to
    pub fn directory_url(&self) -> &str {
        match self.directory_url {
            Some(ref url) => url.as_str(),
            None if self.staging => LETSENCRYPT_STAGING,
            None => LETSENCRYPT_PRODUCTION,
        }
    }

    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

impl DnsSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            DnsProviderKind::Webhook => {
                let url = self.url.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("dns.url is required for the webhook provider".to_string())
                })?;
                url::Url::parse(url)
                    .map_err(|e| ConfigError::Invalid(format!("dns.url '{}': {}", url, e)))?;
            }
        }
        if let Some(ref zone) = self.delegated_zone {
            if zone.trim_matches('.').is_empty() {
                return Err(ConfigError::Invalid(
                    "dns.delegated_zone must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        account_file = "/tmp/acct.json"
        store_file = "/tmp/store.json"
        work_dir = "/tmp/work"
        deploy_dir = "/tmp/live"
        staging = true
        default_contacts = ["ops@example.com"]
        renew_before_days = 20
        propagation_delay_secs = 5

        [dns]
        provider = "webhook"
        url = "https://dns.example.net/api"
        credentials_env = "DNS_TOKEN"
        delegated_zone = "acme.example.net"
        ttl = 30
    "#;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.renew_before_days, 30);
        assert_eq!(settings.propagation_delay(), Duration::from_secs(15));
        assert_eq!(settings.directory_url(), LETSENCRYPT_PRODUCTION);
        assert_eq!(settings.dns.ttl, 10);
        assert_eq!(settings.work_dir, PathBuf::from("/etc/letsencrypt/tmp"));
    }

    #[test]
    fn test_parse_full() {
        let settings = Settings::from_toml_str(FULL).unwrap();
        assert_eq!(settings.account_file, PathBuf::from("/tmp/acct.json"));
        assert_eq!(settings.renew_before_days, 20);
        assert_eq!(settings.directory_url(), LETSENCRYPT_STAGING);
        assert_eq!(settings.dns.delegated_zone.as_deref(), Some("acme.example.net"));
        assert_eq!(settings.dns.ttl, 30);
        // Unset keys keep their defaults
        assert_eq!(settings.validation_timeout_secs, 120);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_explicit_directory_wins() {
        let settings = Settings {
            directory_url: Some("https://acme.internal/directory".to_string()),
            staging: true,
            ..Default::default()
        };
        assert_eq!(settings.directory_url(), "https://acme.internal/directory");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Settings::from_toml_str("renew_before = 3");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_requires_webhook_url() {
        let settings = Settings::default();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut settings = Settings::from_toml_str(FULL).unwrap();
        settings.renew_before_days = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/certpilot.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
