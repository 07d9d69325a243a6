//! Credential loading for DNS providers
//!
//! Credentials come from an environment variable or a file, never from the
//! settings file itself. Files may hold plain text or JSON
//! (`{"token": "..."}` / `{"api_token": "..."}`).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::provider::DnsProviderError;

/// API token for a DNS provider
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<redacted>)")
    }
}

/// Load a token from a file
///
/// Warns when the file is readable by group or others.
pub fn load_from_file(path: &Path) -> Result<ApiToken, DnsProviderError> {
    let read_error = |e: std::io::Error| {
        DnsProviderError::Credentials(format!(
            "Failed to read credentials file '{}': {}",
            path.display(),
            e
        ))
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = fs::metadata(path).map_err(read_error)?.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode),
                "Credentials file has overly permissive permissions (should be 0600 or 0400)"
            );
        }
    }

    let content = fs::read_to_string(path).map_err(read_error)?;
    parse_token(&content).map_err(|e| match e {
        DnsProviderError::Credentials(message) => {
            DnsProviderError::Credentials(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

/// Load a token from an environment variable
pub fn load_from_env(var_name: &str) -> Result<ApiToken, DnsProviderError> {
    let value = std::env::var(var_name).map_err(|_| {
        DnsProviderError::Credentials(format!("Environment variable '{}' not set", var_name))
    })?;
    parse_token(&value)
}

fn parse_token(content: &str) -> Result<ApiToken, DnsProviderError> {
    #[derive(Deserialize)]
    struct TokenFormat {
        token: Option<String>,
        api_token: Option<String>,
    }

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DnsProviderError::Credentials("credential is empty".to_string()));
    }

    if trimmed.starts_with('{') {
        let parsed: TokenFormat = serde_json::from_str(trimmed).map_err(|e| {
            DnsProviderError::Credentials(format!("invalid JSON credentials: {}", e))
        })?;
        return parsed
            .token
            .or(parsed.api_token)
            .map(ApiToken)
            .ok_or_else(|| {
                DnsProviderError::Credentials(
                    "expected {\"token\": \"...\"} or {\"api_token\": \"...\"}".to_string(),
                )
            });
    }

    debug!("Loaded credentials as plain text token");
    Ok(ApiToken(trimmed.to_string()))
}
