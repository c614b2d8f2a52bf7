use crate::config;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

/// Execution modes selectable through `NETGEX_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Server,
    Single,
}

/// Application configuration handler
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: Mode,
    pub port: u16,
    pub ticker: String,
    pub expiration: Option<NaiveDate>,
    pub fixed_k: Option<f64>,
    pub debug_dir: PathBuf,
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Create new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("NETGEX_MODE").as_deref() {
            None | Some("server") => Mode::Server,
            Some("single") => Mode::Single,
            Some(other) => return Err(anyhow!("Invalid mode '{}'. Use 'server' or 'single'", other)),
        };

        let port = match get("NETGEX_PORT") {
            Some(p) => p.parse::<u16>().with_context(|| format!("Invalid NETGEX_PORT: {}", p))?,
            None => config::DEFAULT_PORT,
        };

        let expiration = get("NETGEX_EXPIRATION")
            .map(|d| parse_expiration(&d))
            .transpose()?;

        let fixed_k = get("NETGEX_K")
            .map(|k| k.parse::<f64>().with_context(|| format!("Invalid NETGEX_K: {}", k)))
            .transpose()?;

        let http_timeout = match get("NETGEX_HTTP_TIMEOUT_SECS") {
            Some(s) => Duration::from_secs(
                s.parse::<u64>()
                    .with_context(|| format!("Invalid NETGEX_HTTP_TIMEOUT_SECS: {}", s))?,
            ),
            None => config::HTTP_TIMEOUT,
        };

        let cfg = Self {
            mode,
            port,
            ticker: normalize_ticker(get("NETGEX_TICKER").as_deref().unwrap_or_default()),
            expiration,
            fixed_k,
            debug_dir: get("NETGEX_DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(config::DEFAULT_DEBUG_DIR)),
            http_timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(k) = self.fixed_k {
            if !k.is_finite() {
                return Err(anyhow!("NETGEX_K must be a finite number"));
            }
        }
        if self.http_timeout.is_zero() {
            return Err(anyhow!("NETGEX_HTTP_TIMEOUT_SECS must be positive"));
        }
        Ok(())
    }
}

/// Trimmed, upper-cased ticker; blank input falls back to the default.
pub fn normalize_ticker(raw: &str) -> String {
    let t = raw.trim();
    if t.is_empty() {
        config::DEFAULT_TICKER.to_string()
    } else {
        t.to_uppercase()
    }
}

/// Parse an expiration date given as `YYYY-MM-DD`.
pub fn parse_expiration(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Failed to parse expiration date '{}'", raw))
}
