//! GoldAPI quote source.
//!
//! API: `https://www.goldapi.io/api/XAU/USD`
//! Auth: `x-access-token` header.
//! Response: JSON object with a numeric `price` field (USD per ounce).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::QuoteSource;
use crate::types::DeskError;

pub const DEFAULT_GOLDAPI_URL: &str = "https://www.goldapi.io/api/XAU/USD";

#[derive(Debug, Deserialize)]
struct GoldApiQuote {
    #[serde(default)]
    price: Option<f64>,
}

pub struct GoldApiSource {
    http: Client,
    url: String,
    api_key: SecretString,
}

impl GoldApiSource {
    pub fn new(url: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("BullionDesk/0.1.0")
            .build()
            .context("Failed to build GoldAPI HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            api_key,
        })
    }

    /// Pull the price out of a response body.
    fn parse_price(body: &str) -> Result<f64, DeskError> {
        let quote: GoldApiQuote = serde_json::from_str(body)
            .map_err(|e| DeskError::QuoteFetch(format!("malformed body: {e}")))?;
        quote
            .price
            .filter(|p| p.is_finite())
            .ok_or_else(|| DeskError::QuoteFetch("response has no numeric price".into()))
    }
}

#[async_trait]
impl QuoteSource for GoldApiSource {
    async fn fetch_price(&self) -> Result<f64, DeskError> {
        let resp = self
            .http
            .get(&self.url)
            .header("x-access-token", self.api_key.expose_secret())
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| DeskError::QuoteFetch(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeskError::QuoteFetch(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| DeskError::QuoteFetch(format!("failed to read body: {e}")))?;
        let price = Self::parse_price(&body)?;
        debug!(price, "GoldAPI quote received");
        Ok(price)
    }

    fn name(&self) -> &'static str {
        "goldapi"
    }
}
