//! Generic webhook DNS provider
//!
//! Integrates with any DNS backend that can be fronted by a small HTTP API.
//!
//! # Webhook API
//!
//! ## Resolve Zone
//! ```text
//! GET {url}/zones?name={name}
//!
//! Response: { "zone": "zone-id" }     (404 when no zone manages the name)
//! ```
//!
//! ## Upsert Record
//! ```text
//! POST {url}/records
//! Content-Type: application/json
//!
//! { "zone": "zone-id", "name": "_acme-challenge.example.com",
//!   "type": "TXT", "value": "challenge-value", "ttl": 10 }
//! ```
//!
//! ## Delete Record
//! ```text
//! DELETE {url}/records
//! Content-Type: application/json
//!
//! { "zone": "zone-id", "name": "_acme-challenge.example.com",
//!   "type": "TXT", "value": "challenge-value" }
//!
//! Response: 200/204, or 404 if already gone
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::ApiToken;
use super::provider::{DnsProvider, DnsProviderError, DnsResult};

/// Webhook DNS provider for custom integrations
#[derive(Debug)]
pub struct WebhookProvider {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
    token: Option<ApiToken>,
    timeout: Duration,
}

impl WebhookProvider {
    /// Create a new webhook DNS provider
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for the webhook API
    /// * `auth_header` - Optional custom auth header name (e.g., "X-API-Key")
    /// * `token` - Optional credential; sent as bearer token without `auth_header`
    /// * `timeout` - Request timeout
    pub fn new(
        base_url: String,
        auth_header: Option<String>,
        token: Option<ApiToken>,
        timeout: Duration,
    ) -> DnsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            auth_header,
            token,
            timeout,
        })
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.auth_header, &self.token) {
            (Some(header), Some(token)) => request.header(header.as_str(), token.expose()),
            (None, Some(token)) => request.bearer_auth(token.expose()),
            _ => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> DnsResult<Response> {
        let response = self.add_auth(request).send().await.map_err(|e| {
            if e.is_timeout() {
                DnsProviderError::Timeout {
                    elapsed_secs: self.timeout.as_secs(),
                }
            } else {
                DnsProviderError::ApiRequest(format!("Webhook request failed: {}", e))
            }
        })?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(DnsProviderError::Authentication(
                "Webhook authentication failed".to_string(),
            ));
        }
        Ok(response)
    }
}

async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("Webhook returned HTTP {} - {}", status, body)
}

#[async_trait]
impl DnsProvider for WebhookProvider {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn resolve_zone(&self, name: &str) -> DnsResult<String> {
        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", name)]);
        let response = self.send(request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DnsProviderError::ZoneNotFound {
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(DnsProviderError::ApiRequest(failure_message(response).await));
        }

        let zone: ZoneResponse = response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse webhook response: {}", e))
        })?;

        debug!(name = %name, zone = %zone.zone, "Resolved zone via webhook");
        Ok(zone.zone)
    }

    async fn upsert_txt_record(
        &self,
        zone: &str,
        record_name: &str,
        value: &str,
        ttl: u32,
    ) -> DnsResult<()> {
        debug!(
            zone = %zone,
            record = %record_name,
            url = %self.base_url,
            "Upserting TXT record via webhook"
        );

        let body = RecordRequest {
            zone,
            name: record_name,
            record_type: "TXT",
            value,
            ttl: Some(ttl),
        };
        let request = self
            .client
            .post(format!("{}/records", self.base_url))
            .json(&body);
        let response = self.send(request).await?;

        if !response.status().is_success() {
            return Err(DnsProviderError::RecordUpsert {
                record_name: record_name.to_string(),
                message: failure_message(response).await,
            });
        }

        debug!(record = %record_name, "TXT record upserted via webhook");
        Ok(())
    }

    async fn delete_txt_record(&self, zone: &str, record_name: &str, value: &str) -> DnsResult<()> {
        debug!(zone = %zone, record = %record_name, "Deleting TXT record via webhook");

        let body = RecordRequest {
            zone,
            name: record_name,
            record_type: "TXT",
            value,
            ttl: None,
        };
        let request = self
            .client
            .delete(format!("{}/records", self.base_url))
            .json(&body);
        let response = self.send(request).await?;

        // 404 is acceptable - record might already be deleted
        if response.status() == StatusCode::NOT_FOUND {
            debug!(record = %record_name, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(DnsProviderError::RecordDeletion {
                record_name: record_name.to_string(),
                message: failure_message(response).await,
            });
        }

        debug!(record = %record_name, "TXT record deleted via webhook");
        Ok(())
    }
}

// Webhook API types

#[derive(Debug, Serialize)]
struct RecordRequest<'a> {
    zone: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'static str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ZoneResponse {
    zone: String,
}
