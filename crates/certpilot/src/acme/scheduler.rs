//! Certificate renewal scheduler
//!
//! Picks the certificates that are close to expiry and renews them one at a
//! time, either once (cron style) or periodically.

use std::time::Duration;

use certpilot_config::{CertificateRecord, RecordMap};
use chrono::{DateTime, Utc};
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use super::error::AcmeError;
use super::lifecycle::CertificateManager;
use super::transport::AcmeTransport;
use crate::hooks::run_post_command;

/// Default check interval (12 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 hour)
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

const SECONDS_PER_DAY: i64 = 86_400;

/// Records whose remaining lifetime is within `threshold_days`, sorted by name
///
/// With `name`, only that record is considered and it must exist.
pub fn select_for_renewal(
    records: &RecordMap,
    name: Option<&str>,
    now: DateTime<Utc>,
    threshold_days: u32,
) -> Result<Vec<CertificateRecord>, AcmeError> {
    let threshold = i64::from(threshold_days) * SECONDS_PER_DAY;
    Ok(candidates(records, name)?
        .into_iter()
        .filter(|record| record.remaining(now).num_seconds() <= threshold)
        .collect())
}

fn candidates(records: &RecordMap, name: Option<&str>) -> Result<Vec<CertificateRecord>, AcmeError> {
    match name {
        Some(name) => records
            .get(name)
            .cloned()
            .map(|record| vec![record])
            .ok_or_else(|| AcmeError::UnknownCertificate(name.to_string())),
        None => Ok(records.values().cloned().collect()),
    }
}

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    /// Names renewed successfully
    pub renewed: Vec<String>,
    /// Names not due for renewal
    pub skipped: Vec<String>,
    /// Names whose renewal failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl RenewalSummary {
    /// Nothing was renewed and nothing failed
    pub fn is_noop(&self) -> bool {
        self.renewed.is_empty() && self.failed.is_empty()
    }
}

/// Renews due certificates through a [`CertificateManager`]
pub struct RenewalScheduler<T> {
    manager: CertificateManager<T>,
    threshold_days: u32,
    check_interval: Duration,
}

impl<T: AcmeTransport> RenewalScheduler<T> {
    pub fn new(manager: CertificateManager<T>, threshold_days: u32) -> Self {
        Self {
            manager,
            threshold_days,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour to avoid
    /// excessive polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn manager(&self) -> &CertificateManager<T> {
        &self.manager
    }

    /// Renew every due certificate once
    ///
    /// `force` renews regardless of the remaining lifetime. A failed renewal
    /// is recorded in the summary and the next certificate is still
    /// attempted; only an unreadable store or an unknown `name` is an error.
    pub async fn run_once(
        &self,
        name: Option<&str>,
        force: bool,
    ) -> Result<RenewalSummary, AcmeError> {
        let start = Instant::now();
        let records = self.manager.store().read()?;

        let due = if force {
            candidates(&records, name)?
        } else {
            select_for_renewal(&records, name, Utc::now(), self.threshold_days)?
        };

        let mut summary = RenewalSummary::default();
        for record in candidates(&records, name)? {
            if !due.iter().any(|d| d.name == record.name) {
                debug!(
                    name = %record.name,
                    expires = %record.expires_at,
                    "Certificate is still valid"
                );
                summary.skipped.push(record.name);
            }
        }

        info!(
            due = due.len(),
            total = records.len(),
            force,
            "Checking certificates for renewal"
        );

        for record in &due {
            info!(name = %record.name, expires = %record.expires_at, "Certificate needs renewal");
            match self.manager.renew(record).await {
                Ok(renewed) => {
                    info!(
                        name = %renewed.name,
                        expires = %renewed.expires_at,
                        "Certificate renewed successfully"
                    );
                    summary.renewed.push(renewed.name);
                }
                Err(e) => {
                    error!(name = %record.name, error = %e, "Certificate renewal failed");
                    summary.failed.push((record.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            renewed = summary.renewed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            elapsed_secs = start.elapsed().as_secs(),
            "Renewal pass complete"
        );
        Ok(summary)
    }

    /// Run the renewal loop
    ///
    /// Runs until the future is dropped. `post_command` runs after every pass
    /// that renewed at least one certificate.
    pub async fn run(&self, post_command: Option<&str>) {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            "Starting certificate renewal scheduler"
        );

        // The first tick completes immediately
        let mut interval = interval(self.check_interval);

        loop {
            interval.tick().await;
            debug!("Running scheduled certificate renewal check");

            match self.run_once(None, false).await {
                Ok(summary) if !summary.renewed.is_empty() => {
                    if let Some(command) = post_command {
                        if let Err(e) = run_post_command(command) {
                            error!(error = %e, "Post-renewal command failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Certificate renewal check failed"),
            }
        }
    }
}

impl<T> std::fmt::Debug for RenewalScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("threshold_days", &self.threshold_days)
            .field("check_interval", &self.check_interval)
            .finish()
    }
}
