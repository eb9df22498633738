use super::config;
use super::error::UpstoxError;
use super::models::{RawContract, RawStrikeRecord, parse_rows, value_to_f64};
use crate::analysis::scan::ChainSource;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::{seq::SliceRandom, thread_rng};
use reqwest::{Client, header};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

// -----------------------------------------------
// EXPIRY NORMALIZATION
// -----------------------------------------------

/// Epoch values above this are milliseconds
const EPOCH_MS_CUTOFF: f64 = 1e10;

fn epoch_to_date(raw: f64) -> Option<NaiveDate> {
    let secs = if raw > EPOCH_MS_CUTOFF { raw / 1000.0 } else { raw };
    DateTime::<Utc>::from_timestamp(secs as i64, 0).map(|dt| dt.date_naive())
}

/// Contract expiry as `YYYY-MM-DD`. Accepts `YYYY-MM-DD`, `DD-Mon-YYYY`,
/// RFC 3339 and epoch seconds or milliseconds (as number or string).
pub fn normalize_expiry(value: &Value) -> Option<String> {
    let date = match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%d-%b-%Y"))
                .ok()
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc).date_naive())
                })
                .or_else(|| value_to_f64(value).and_then(epoch_to_date))
        }
        Value::Number(_) => value_to_f64(value).and_then(epoch_to_date),
        _ => None,
    }?;

    Some(date.format("%Y-%m-%d").to_string())
}

/// Unique, ascending expiries of a contract list
pub fn collect_expiries(contracts: &[RawContract]) -> Vec<String> {
    contracts
        .iter()
        .filter_map(|c| c.expiry.as_ref().and_then(normalize_expiry))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// -----------------------------------------------
// CLIENT
// -----------------------------------------------
pub struct UpstoxClient {
    client: Client,
    base_url: String,
}

impl UpstoxClient {
    pub fn new(access_token: &str) -> Result<Self, UpstoxError> {
        Ok(Self {
            client: build_client(access_token)?,
            base_url: config::UPSTOX_BASE_URL.to_string(),
        })
    }

    /// Client authenticated with `UPSTOX_ACCESS_TOKEN`
    pub fn from_env() -> Result<Self, UpstoxError> {
        let token = config::get_access_token().ok_or(UpstoxError::MissingToken)?;
        Self::new(&token)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<String, UpstoxError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            let preview: String = text.chars().take(200).collect();
            return Err(UpstoxError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let trimmed = text.trim_start();
        if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
            let preview: String = text.chars().take(200).collect();
            return Err(UpstoxError::NonJson(preview));
        }

        Ok(text)
    }

    /// GET with exponential backoff on network errors, 429 and 5xx
    async fn fetch_json(&self, url: &str) -> Result<String, UpstoxError> {
        let backoff = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        RetryIf::spawn(
            backoff,
            || async {
                let result = self.fetch_once(url).await;
                if let Err(e) = &result {
                    tracing::debug!(url, error = %e, "Upstox request failed");
                }
                result
            },
            |e: &UpstoxError| e.is_retryable(),
        )
        .await
    }

    // -----------------------------------------------
    // EXPIRIES (option contracts)
    // -----------------------------------------------
    pub async fn fetch_expiries(&self, instrument_key: &str) -> Result<Vec<String>, UpstoxError> {
        let url = config::option_contract_url(&self.base_url, instrument_key);
        let text = self.fetch_json(&url).await?;
        let contracts: Vec<RawContract> = parse_rows(&text)?;

        Ok(collect_expiries(&contracts))
    }

    // -----------------------------------------------
    // OPTION CHAIN
    // -----------------------------------------------
    pub async fn fetch_option_chain(
        &self,
        instrument_key: &str,
        expiry: &str,
    ) -> Result<Vec<RawStrikeRecord>, UpstoxError> {
        let url = config::option_chain_url(&self.base_url, instrument_key, expiry);
        let text = self.fetch_json(&url).await?;
        Ok(parse_rows(&text)?)
    }
}

#[async_trait]
impl ChainSource for UpstoxClient {
    async fn fetch_expiries(&self, instrument_key: &str) -> anyhow::Result<Vec<String>> {
        Ok(UpstoxClient::fetch_expiries(self, instrument_key).await?)
    }

    async fn fetch_chain(&self, instrument_key: &str, expiry: &str) -> anyhow::Result<Vec<RawStrikeRecord>> {
        Ok(self.fetch_option_chain(instrument_key, expiry).await?)
    }
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client(access_token: &str) -> Result<Client, UpstoxError> {
    let mut headers = header::HeaderMap::new();

    let lang = config::ACCEPT_LANGUAGES
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or("en-US,en;q=0.9");
    headers.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_str(lang)?);
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(config::HEADER_ACCEPT_JSON));

    let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", access_token.trim()))?;
    auth.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth);

    Ok(Client::builder()
        .default_headers(headers)
        .user_agent(config::USER_AGENT)
        .timeout(config::HTTP_TIMEOUT)
        .build()?)
}
