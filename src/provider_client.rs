use crate::config::{self, ProviderConfig};
use crate::error::ProviderError;
use crate::processor;
use chrono::{DateTime, Utc};
use reqwest::{Client, header};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, warn};

// -----------------------------------------------
// RAW RESPONSE + METADATA
// -----------------------------------------------

/// What the debug panel shows about one provider call.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub content_type: Option<String>,
    pub elapsed_ms: u64,
    pub bytes: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Provider response kept exactly as received.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub meta: RequestMeta,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Lossy text preview for logs and error messages.
    pub fn preview(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.body).chars().take(max_chars).collect()
    }

    /// Status, JSON and in-band API message checks.
    pub fn validate(&self) -> Result<Value, ProviderError> {
        if !(200..300).contains(&self.meta.status) {
            error!(
                url = %self.meta.url,
                status = self.meta.status,
                body = %self.preview(config::BODY_PREVIEW_CHARS),
                "provider returned an error status"
            );
            return Err(ProviderError::Status {
                status: self.meta.status,
                url: self.meta.url.clone(),
            });
        }

        let value: Value = serde_json::from_slice(&self.body).map_err(|e| {
            error!(error = %e, body = %self.preview(config::BODY_PREVIEW_CHARS), "provider returned non-JSON");
            ProviderError::NonJson(self.preview(200))
        })?;

        if let Some(msg) = api_message(&value) {
            error!(message = %msg, "provider API message");
            return Err(ProviderError::Api(msg));
        }

        Ok(value)
    }
}

/// RapidAPI answers quota/subscription problems with 200 and a `message`.
fn api_message(value: &Value) -> Option<String> {
    match value.get("message")? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// -----------------------------------------------
// CLIENT
// -----------------------------------------------

/// Client for the RapidAPI "Yahoo Finance 15" options endpoints.
pub struct YahooOptionsClient {
    client: Client,
    config: ProviderConfig,
}

impl YahooOptionsClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(&config)?,
            config,
        })
    }

    /// One GET. Only transport failures are errors here; see [`RawResponse::validate`].
    pub async fn send(&self, path: &str, params: &[(&str, String)]) -> Result<RawResponse, ProviderError> {
        let url = format!("{}{}", self.config.base_url, path);
        let request = self.client.get(&url).query(params).build()?;

        let meta_url = request.url().to_string();
        let headers = redacted_headers(&self.config);
        debug!(url = %meta_url, "GET");

        let started = Instant::now();
        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            meta: RequestMeta {
                method: "GET".to_string(),
                url: meta_url,
                headers,
                status,
                content_type,
                elapsed_ms: started.elapsed().as_millis() as u64,
                bytes: body.len(),
                fetched_at: Utc::now(),
            },
            body,
        })
    }

    /// Raw option chain; `date` selects the expiration (unix seconds).
    pub async fn fetch_options_raw(&self, symbol: &str, date: Option<i64>) -> Result<RawResponse, ProviderError> {
        let params: Vec<(&str, String)> = date.map(|d| vec![("date", d.to_string())]).unwrap_or_default();
        self.send(&config::options_path(symbol), &params).await
    }

    /// Expiration dates (unix seconds) listed for the ticker.
    pub async fn fetch_expirations(&self, symbol: &str) -> Result<Vec<i64>, ProviderError> {
        let raw = self.fetch_options_raw(symbol, None).await?;
        raw.validate()?;
        let result = processor::first_result(processor::parse_envelope(&raw.body)?)?;

        let mut dates = result.expiration_dates.unwrap_or_default();
        dates.sort_unstable();
        dates.dedup();
        Ok(dates)
    }

    /// Spot price from the quote endpoints when the chain carries none.
    /// Tries hiresquotes first, then the plain quote endpoint.
    pub async fn fetch_quote_spot(&self, symbol: &str) -> Option<(f64, Option<i64>)> {
        for path in [config::hires_quote_path(symbol), config::quote_path(symbol)] {
            match self.send(&path, &[]).await.and_then(|raw| raw.validate()) {
                Ok(value) => {
                    if let Some(found) = spot_from_quote_payload(&value) {
                        return Some(found);
                    }
                }
                Err(e) => debug!(path = %path, error = %e, "quote lookup failed"),
            }
        }
        warn!(symbol, "could not obtain a quote for the underlying");
        None
    }
}

/// Price and timestamp from either quote payload shape.
pub fn spot_from_quote_payload(value: &Value) -> Option<(f64, Option<i64>)> {
    use crate::models::value_as_f64;

    let node = match value.get("body") {
        Some(Value::Array(items)) => items.first()?,
        Some(obj) if obj.is_object() => obj,
        _ => value,
    };

    let price = node
        .get("regularMarketPrice")
        .and_then(value_as_f64)
        .or_else(|| {
            node.get("price")
                .and_then(|p| p.get("regularMarketPrice"))
                .and_then(value_as_f64)
        })
        .filter(|p| *p > 0.0)?;

    let time = node
        .get("regularMarketTime")
        .and_then(value_as_f64)
        .map(|t| t as i64);

    Some((price, time))
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client(config: &ProviderConfig) -> Result<Client, ProviderError> {
    let mut headers = header::HeaderMap::new();

    // Values were checked when the config was loaded; this only fails on a hand-built config.
    let host = header::HeaderValue::from_str(&config.host)
        .map_err(|e| ProviderError::Payload(format!("invalid host header: {}", e)))?;
    let mut key = header::HeaderValue::from_str(&config.key)
        .map_err(|e| ProviderError::Payload(format!("invalid key header: {}", e)))?;
    key.set_sensitive(true);

    headers.insert(config::HEADER_RAPIDAPI_HOST, host);
    headers.insert(config::HEADER_RAPIDAPI_KEY, key);
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    Ok(Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .build()?)
}

fn redacted_headers(config: &ProviderConfig) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(config::HEADER_RAPIDAPI_HOST.to_string(), config.host.clone());
    headers.insert(config::HEADER_RAPIDAPI_KEY.to_string(), "***".to_string());
    headers
}
