use crate::error::ConfigError;
use reqwest::header::HeaderValue;
use std::time::Duration;

// -----------------------------------------------
// PROVIDER ENDPOINTS
// -----------------------------------------------
pub const DEFAULT_RAPIDAPI_HOST: &str = "yahoo-finance15.p.rapidapi.com";
pub const OPTIONS_PATH: &str = "/api/yahoo/v7/finance/options";
pub const HIRES_QUOTE_PATH: &str = "/api/yahoo/hiresquotes";
pub const QUOTE_PATH: &str = "/api/yahoo/qu/quote";

pub fn options_path(symbol: &str) -> String {
    format!("{}/{}", OPTIONS_PATH, urlencoding::encode(symbol))
}

pub fn hires_quote_path(symbol: &str) -> String {
    format!("{}/{}", HIRES_QUOTE_PATH, urlencoding::encode(symbol))
}

pub fn quote_path(symbol: &str) -> String {
    format!("{}/{}", QUOTE_PATH, urlencoding::encode(symbol))
}

// -----------------------------------------------
// SECRETS
// -----------------------------------------------
pub const ENV_RAPIDAPI_HOST: &str = "RAPIDAPI_HOST";
pub const ENV_RAPIDAPI_KEY: &str = "RAPIDAPI_KEY";

pub const HEADER_RAPIDAPI_HOST: &str = "x-rapidapi-host";
pub const HEADER_RAPIDAPI_KEY: &str = "x-rapidapi-key";

/// Keys whose values never reach logs or the debug panel.
pub const REDACTED_KEYS: &[&str] = &[HEADER_RAPIDAPI_KEY, ENV_RAPIDAPI_KEY];

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const BODY_PREVIEW_CHARS: usize = 500;

// -----------------------------------------------
// UI DEFAULTS
// -----------------------------------------------
pub const DEFAULT_TICKER: &str = "SPY";
pub const DEFAULT_PORT: u16 = 3001;

/// Expirations up to an hour in the past still count as "nearest".
pub const EXPIRATION_GRACE_SECS: i64 = 3600;

// -----------------------------------------------
// NET GEX CALIBRATION
// -----------------------------------------------
pub const CONTRACT_MULTIPLIER: f64 = 100.0;
pub const SCALE_DIVISOR: f64 = 1000.0;
pub const CORE_SIZE: usize = 11;

pub const IV_SENTINEL_MAX: f64 = 1e-4;
pub const IV_MAX_FRACTION: f64 = 3.0;
pub const IV_MIN_FRACTION: f64 = 0.01;
pub const IV_FALLBACK: f64 = 0.20;

pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const MIN_YEARS_TO_EXPIRY: f64 = 1e-6;

// -----------------------------------------------
// DEBUG PANEL
// -----------------------------------------------
pub const DEFAULT_DEBUG_DIR: &str = "./debug";
pub const ERROR_LOG_CAPACITY: usize = 50;
pub const RAW_PANEL_MAX_CHARS: usize = 200_000;

// -----------------------------------------------
// PROVIDER CREDENTIALS
// -----------------------------------------------

/// Host and key for the RapidAPI provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub host: String,
    pub key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("key", &"***")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary lookup (environment, secrets file, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(&lookup, ENV_RAPIDAPI_HOST)?;
        let key = required(&lookup, ENV_RAPIDAPI_KEY)?;

        Ok(Self {
            base_url: format!("https://{}", host),
            host,
            key,
            timeout: HTTP_TIMEOUT,
        })
    }

    /// Point the client at another base URL (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))?;

    HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader(name))?;
    Ok(value)
}
