//! Remote API proxy source
//!
//! Fetches one HTTP and one SOCKS5 upstream per call from a JSON endpoint.
//! Calls are serialized and spaced at least [`MIN_CALL_INTERVAL`] apart.

use super::ProxySource;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::{ProxyRecord, ProxyType};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Minimum spacing between two API calls
pub const MIN_CALL_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout applied to each API request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(rename = "proxyData")]
    proxy_data: ProxyData,
}

#[derive(Debug, Default, Deserialize)]
struct ProxyData {
    #[serde(default)]
    proxyhttp: String,
    #[serde(default)]
    proxysocks5: String,
}

/// Parse an `IP:PORT:USER:PASS` entry returned by the API
///
/// The IP must be a dotted IPv4 address, the port within 1..=65535 and
/// both credentials non-empty.
pub fn parse_api_proxy(entry: &str, proxy_type: ProxyType) -> GatewayResult<ProxyRecord> {
    let parts: Vec<&str> = entry.trim().split(':').collect();
    if parts.len() != 4 {
        return Err(GatewayError::Source(format!(
            "invalid proxy format: {}, expected IP:PORT:USER:PASS",
            entry
        )));
    }

    let ip: Ipv4Addr = parts[0]
        .parse()
        .map_err(|_| GatewayError::Source(format!("invalid IP address: {}", parts[0])))?;

    let port = match parts[1].parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => return Err(GatewayError::Source(format!("invalid port: {}", parts[1]))),
    };

    let (username, password) = (parts[2], parts[3]);
    if username.is_empty() || password.is_empty() {
        return Err(GatewayError::Source(
            "username or password is empty".to_string(),
        ));
    }

    let mut record = ProxyRecord::new(format!("{}://{}:{}", proxy_type.scheme(), ip, port), proxy_type)
        .with_credentials(username, password);
    record.last_checked = Some(Instant::now());
    Ok(record)
}

/// Turn an API response into records
///
/// An `{"error": ...}` body is reported even when the status is 200.
pub(crate) fn decode_response(status: u16, body: &[u8]) -> GatewayResult<Vec<ProxyRecord>> {
    if let Ok(err) = serde_json::from_slice::<ErrorResponse>(body) {
        if !err.error.is_empty() {
            return Err(GatewayError::Source(format!("API error: {}", err.error)));
        }
    }

    if status != 200 {
        return Err(GatewayError::Source(format!(
            "API returned non-200 status code: {}",
            status
        )));
    }

    let response: ProxyResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Source(format!("failed to decode API response: {}", e)))?;

    let mut records = Vec::new();
    for (entry, proxy_type) in [
        (&response.proxy_data.proxyhttp, ProxyType::Http),
        (&response.proxy_data.proxysocks5, ProxyType::Socks5),
    ] {
        if entry.is_empty() {
            continue;
        }
        let record = parse_api_proxy(entry, proxy_type).map_err(|e| {
            GatewayError::Source(format!("invalid {} proxy from API: {}", proxy_type, e))
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(GatewayError::Source(
            "no valid proxies found in API response".to_string(),
        ));
    }

    Ok(records)
}

/// [`ProxySource`] backed by the remote proxy API
pub struct ApiSource {
    client: reqwest::Client,
    url: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl ApiSource {
    /// Create a source for `url`
    pub fn new(url: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Source(format!("failed to build HTTP client: {}", e)))?;

        Ok(ApiSource {
            client,
            url: url.into(),
            min_interval: MIN_CALL_INTERVAL,
            last_call: Mutex::new(None),
        })
    }

    /// Override the spacing between calls
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Endpoint this source calls
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self) -> GatewayResult<(u16, Vec<u8>)> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GatewayError::Source(format!("failed to fetch proxy from API: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Source(format!("failed to read API response: {}", e)))?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl ProxySource for ApiSource {
    async fn fetch_upstream_proxies(&self) -> GatewayResult<Vec<ProxyRecord>> {
        // Held for the whole call so concurrent callers queue up
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        debug!("Fetching upstream proxies from {}", self.url);
        let result = self.request().await;
        *last_call = Some(Instant::now());

        let (status, body) = result?;
        let records = decode_response(status, &body)?;
        info!("Fetched {} upstream proxies from API", records.len());
        Ok(records)
    }
}
