//! Certpilot configuration
//!
//! - [`Settings`] - runtime settings loaded from TOML
//! - [`ConfigStore`] - the JSON store of managed certificates
//! - [`CertificateRecord`] - one managed certificate

mod error;
mod record;
mod settings;
mod store;

pub use error::ConfigError;
pub use record::{parse_list, CertificateRecord};
pub use settings::{
    DnsProviderKind, DnsSettings, Settings, DEFAULT_SETTINGS_PATH, LETSENCRYPT_PRODUCTION,
    LETSENCRYPT_STAGING,
};
pub use store::{write_atomic, ConfigStore, RecordMap, StagedFiles, StagedWriteError};
