//! Certpilot - Main entry point
//!
//! ACME DNS-01 certificate issuance and renewal.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use certpilot::acme::{CertificateManager, CertificateRequest, InstantAcmeTransport};
use certpilot::{create_provider, run_post_command, RenewalScheduler};
use certpilot_config::{parse_list, CertificateRecord, ConfigStore, Settings, DEFAULT_SETTINGS_PATH};

/// Certpilot - ACME DNS-01 certificate automation
#[derive(Parser, Debug)]
#[command(name = "certpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file path
    #[arg(short = 'c', long = "config", env = "CERTPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List managed certificates
    List,
    /// Issue a new certificate
    Create {
        /// Comma-separated domains; the first becomes the common name
        #[arg(short = 'd', long = "domains")]
        domains: String,
        /// Comma-separated contact emails
        #[arg(short = 'e', long = "emails")]
        emails: Option<String>,
        /// Certificate name
        #[arg(short = 'n', long = "name")]
        name: String,
        /// Command to run after the certificate is installed
        #[arg(short = 'r', long = "run")]
        run: Option<String>,
    },
    /// Renew certificates that are close to expiry
    Update {
        /// Only consider this certificate
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
        /// Command to run if anything was renewed
        #[arg(short = 'r', long = "run")]
        run: Option<String>,
        /// Renew regardless of remaining lifetime
        #[arg(long = "force")]
        force: bool,
    },
    /// Keep running and renew on a fixed interval
    Daemon {
        /// Hours between renewal checks (minimum 1)
        #[arg(long = "interval-hours", default_value_t = 12)]
        interval_hours: u64,
        /// Command to run after each pass that renewed something
        #[arg(short = 'r', long = "run")]
        run: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    settings.validate().context("Settings validation failed")?;

    if let Commands::List = cli.command {
        return list(&settings);
    }

    // Orchestration is strictly sequential: a current-thread runtime is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(cli.command, settings))
}

async fn run(command: Commands, settings: Settings) -> Result<()> {
    let provider = create_provider(&settings.dns).context("Failed to set up DNS provider")?;
    let transport =
        InstantAcmeTransport::new(settings.directory_url(), settings.validation_timeout());
    info!(
        directory = %transport.directory_url(),
        dns_provider = provider.name(),
        "Initialized"
    );
    let manager = CertificateManager::new(transport, provider, &settings);

    match command {
        Commands::List => list(&settings),
        Commands::Create {
            domains,
            emails,
            name,
            run,
        } => {
            let request = CertificateRequest {
                name,
                domains: parse_list(&domains),
                emails: emails.as_deref().map(parse_list).unwrap_or_default(),
            };
            let record = manager
                .obtain(request)
                .await
                .context("Certificate issuance failed")?;
            println!(
                "certpilot: issued '{}' for {} (expires {})",
                record.name,
                record.domains.join(","),
                record.expires_at.format("%Y-%m-%d")
            );

            if let Some(command) = run {
                run_post_command(&command)?;
            }
            Ok(())
        }
        Commands::Update { name, run, force } => {
            let scheduler = RenewalScheduler::new(manager, settings.renew_before_days);
            let summary = scheduler.run_once(name.as_deref(), force).await?;

            if summary.renewed.is_empty() {
                println!("certpilot: no certificates renewed");
            } else {
                println!("certpilot: renewed {}", summary.renewed.join(", "));
                if let Some(command) = run {
                    run_post_command(&command)?;
                }
            }

            if !summary.failed.is_empty() {
                for (name, error) in &summary.failed {
                    eprintln!("certpilot: failed to renew '{}': {}", name, error);
                }
                bail!("{} certificate(s) failed to renew", summary.failed.len());
            }
            Ok(())
        }
        Commands::Daemon {
            interval_hours,
            run,
        } => {
            let scheduler = RenewalScheduler::new(manager, settings.renew_before_days)
                .with_interval(Duration::from_secs(interval_hours.saturating_mul(3600)));

            tokio::select! {
                _ = scheduler.run(run.as_deref()) => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Shutting down");
                }
            }
            Ok(())
        }
    }
}

/// Print the managed certificates
fn list(settings: &Settings) -> Result<()> {
    let store = ConfigStore::new(&settings.store_file);
    let records = store
        .list()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    print!("{}", render_table(&records));
    Ok(())
}

fn render_table(records: &[CertificateRecord]) -> String {
    let mut out = format!("{:<20}| {:<12}| Domains\n", "Name", "Expires");
    for record in records {
        out.push_str(&format!(
            "{:<20}| {:<12}| {}\n",
            record.name,
            record.expires_at.format("%Y-%m-%d").to_string(),
            record.domains.join(",")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "certpilot",
            "create",
            "-d",
            "example.com,*.example.com",
            "-n",
            "example",
            "-r",
            "systemctl reload nginx",
        ])
        .unwrap();

        match cli.command {
            Commands::Create {
                domains,
                emails,
                name,
                run,
            } => {
                assert_eq!(parse_list(&domains), vec!["example.com", "*.example.com"]);
                assert!(emails.is_none());
                assert_eq!(name, "example");
                assert_eq!(run.as_deref(), Some("systemctl reload nginx"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_defaults() {
        let cli = Cli::try_parse_from(["certpilot", "--verbose", "update"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Update {
                name: None,
                run: None,
                force: false
            }
        ));
    }

    #[test]
    fn test_render_table() {
        let record = CertificateRecord::new(
            "example",
            vec!["example.com".to_string(), "www.example.com".to_string()],
            Vec::new(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap(),
        )
        .unwrap();

        let table = render_table(&[record]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "Name                | Expires     | Domains");
        assert_eq!(
            lines[1],
            "example             | 2024-03-31  | example.com,www.example.com"
        );
    }
}
