//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `desk.toml` (optional, every field has a default) and
//! deserializes into strongly-typed structs. Secrets are referenced by
//! env-var name in the config and resolved once at startup into
//! [`Secrets`].

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::bot::telegram::DEFAULT_API_BASE;
use crate::bot::LoopTiming;
use crate::format::SecondaryCurrency;
use crate::market::cache::is_price_in_band;
use crate::market::goldapi::DEFAULT_GOLDAPI_URL;
use crate::market::UpdaterTiming;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub desk: DeskConfig,
    pub quote: QuoteConfig,
    pub transport: TransportConfig,
    pub ledger: LedgerConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeskConfig {
    /// Price served until the first successful refresh.
    pub seed_price_usd: f64,
    pub secondary_currency: SecondaryCurrency,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            seed_price_usd: 2000.0,
            secondary_currency: SecondaryCurrency::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuoteConfig {
    pub url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub retry_interval_secs: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GOLDAPI_URL.to_string(),
            api_key_env: "GOLD_API_KEY".to_string(),
            timeout_secs: 10,
            refresh_interval_secs: 15 * 60,
            retry_interval_secs: 10 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    pub api_base: String,
    pub bot_token_env: String,
    pub poll_timeout_secs: u64,
    pub error_pause_secs: u64,
    pub restart_pause_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token_env: "BOT_TOKEN".to_string(),
            poll_timeout_secs: 30,
            error_pause_secs: 10,
            restart_pause_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub spreadsheet_id_env: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id_env: "SPREADSHEET_ID".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` when it exists, otherwise use the defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the desk misbehave.
    pub fn validate(&self) -> Result<()> {
        if !is_price_in_band(self.desk.seed_price_usd) {
            bail!("desk.seed_price_usd {} is outside the accepted band", self.desk.seed_price_usd);
        }
        let rate = self.desk.secondary_currency.rate;
        if !(rate.is_finite() && rate > 0.0) {
            bail!("desk.secondary_currency.rate must be positive, got {rate}");
        }
        if self.quote.refresh_interval_secs == 0 || self.quote.retry_interval_secs == 0 {
            bail!("quote refresh and retry intervals must be non-zero");
        }
        if self.quote.timeout_secs == 0 {
            bail!("quote.timeout_secs must be non-zero");
        }
        Ok(())
    }

    pub fn updater_timing(&self) -> UpdaterTiming {
        UpdaterTiming {
            refresh_interval: Duration::from_secs(self.quote.refresh_interval_secs),
            retry_interval: Duration::from_secs(self.quote.retry_interval_secs),
        }
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            poll_timeout: Duration::from_secs(self.transport.poll_timeout_secs),
            transport_error_pause: Duration::from_secs(self.transport.error_pause_secs),
            restart_pause: Duration::from_secs(self.transport.restart_pause_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Environment variables holding the ledger service-account fields.
pub const SERVICE_ACCOUNT_ENV: &[(&str, &str)] = &[
    ("type", "GOOGLE_TYPE"),
    ("project_id", "GOOGLE_PROJECT_ID"),
    ("private_key_id", "GOOGLE_PRIVATE_KEY_ID"),
    ("private_key", "GOOGLE_PRIVATE_KEY"),
    ("client_email", "GOOGLE_CLIENT_EMAIL"),
    ("client_id", "GOOGLE_CLIENT_ID"),
    ("auth_uri", "GOOGLE_AUTH_URI"),
    ("token_uri", "GOOGLE_TOKEN_URI"),
    ("auth_provider_x509_cert_url", "GOOGLE_AUTH_PROVIDER_X509_CERT_URL"),
    ("client_x509_cert_url", "GOOGLE_CLIENT_X509_CERT_URL"),
];

/// Spreadsheet service-account credential. Assembled at startup for the
/// ledger integration; the console itself never calls the ledger.
#[derive(Clone, Serialize, Default, PartialEq)]
pub struct ServiceAccountCredential {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_x509_cert_url: String,
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ServiceAccountCredential {
    /// Build from a variable lookup. Returns `None` unless both the client
    /// email and private key are present.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |field: &str| -> String {
            SERVICE_ACCOUNT_ENV
                .iter()
                .find(|(name, _)| *name == field)
                .and_then(|&(_, env)| lookup(env))
                .unwrap_or_default()
        };

        let cred = Self {
            account_type: get("type"),
            project_id: get("project_id"),
            private_key_id: get("private_key_id"),
            // Keys pasted into env files carry literal "\n" sequences.
            private_key: get("private_key").replace("\\n", "\n"),
            client_email: get("client_email"),
            client_id: get("client_id"),
            auth_uri: get("auth_uri"),
            token_uri: get("token_uri"),
            auth_provider_x509_cert_url: get("auth_provider_x509_cert_url"),
            client_x509_cert_url: get("client_x509_cert_url"),
        };

        if cred.client_email.is_empty() || cred.private_key.is_empty() {
            None
        } else {
            Some(cred)
        }
    }
}

/// Secrets resolved from the environment.
pub struct Secrets {
    pub bot_token: SecretString,
    pub quote_api_key: SecretString,
    pub spreadsheet_id: Option<String>,
    pub service_account: Option<ServiceAccountCredential>,
}

impl Secrets {
    pub fn from_env(config: &AppConfig) -> Result<Self> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolve using an arbitrary lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |env: &str| -> Result<SecretString> {
            lookup(env)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::new)
                .with_context(|| format!("Environment variable not set: {env}"))
        };

        Ok(Self {
            bot_token: required(&config.transport.bot_token_env)?,
            quote_api_key: required(&config.quote.api_key_env)?,
            spreadsheet_id: lookup(&config.ledger.spreadsheet_id_env).filter(|v| !v.is_empty()),
            service_account: ServiceAccountCredential::from_lookup(&lookup),
        })
    }
}
