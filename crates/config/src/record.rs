//! Managed certificate records
//!
//! One [`CertificateRecord`] exists per certificate name. On disk the domain
//! and email lists are stored as comma-joined strings and the timestamps as
//! unix seconds:
//!
//! ```json
//! {
//!   "name": "example.com",
//!   "domains": "*.example.com,example.com",
//!   "emails": "admin@example.com",
//!   "install_time": 1700000000,
//!   "expire_time": 1707776000
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Persisted state of one managed certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Unique key within the store
    pub name: String,
    /// Requested DNS names; the first entry is the common name
    #[serde(with = "comma_list")]
    pub domains: Vec<String>,
    /// Contact emails used for the ACME account
    #[serde(with = "comma_list")]
    pub emails: Vec<String>,
    /// When the current certificate was issued
    #[serde(rename = "install_time", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    /// When the current certificate expires
    #[serde(rename = "expire_time", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl CertificateRecord {
    /// Build a record, checking its invariants
    pub fn new(
        name: impl Into<String>,
        domains: Vec<String>,
        emails: Vec<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let record = Self {
            name: name.into(),
            domains,
            emails,
            issued_at,
            expires_at,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "certificate name must not be empty".to_string(),
            ));
        }
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "certificate '{}' has no domains",
                self.name
            )));
        }
        if self.expires_at <= self.issued_at {
            return Err(ConfigError::Invalid(format!(
                "certificate '{}' expires ({}) before it was issued ({})",
                self.name, self.expires_at, self.issued_at
            )));
        }
        Ok(())
    }

    /// The common name of the certificate
    pub fn primary_domain(&self) -> &str {
        &self.domains[0]
    }

    /// Time left until expiry (negative once expired)
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Split a comma-separated list, trimming entries and dropping empty and
/// duplicate ones while keeping the first-seen order.
pub fn parse_list(raw: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

mod comma_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&items.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(super::parse_list(&raw))
    }
}
