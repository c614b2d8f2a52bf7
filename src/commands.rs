use crate::analysis;
use crate::api_server_axum;
use crate::app_config::{AppConfig, Mode};
use crate::config::ProviderConfig;
use crate::debug::DebugState;
use crate::models::QuoteRequest;
use crate::net_gex::{CalibrationParams, KSource};
use crate::provider_client::YahooOptionsClient;
use crate::render;

use anyhow::{Context, Result};
use colored::Colorize;

/// Command handler for the two execution modes.
pub struct Commands;

impl Commands {
    pub async fn run(app_config: &AppConfig) -> Result<()> {
        match app_config.mode {
            Mode::Server => Self::run_server(app_config).await,
            Mode::Single => Self::run_single(app_config).await,
        }
    }

    /// Run API server mode
    pub async fn run_server(app_config: &AppConfig) -> Result<()> {
        println!("{}", "=".repeat(60).blue());
        println!("{}", "Net GEX Server".green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();

        api_server_axum::start_server(app_config).await
    }

    /// One fetch for `NETGEX_TICKER` / `NETGEX_EXPIRATION`, printed as tables.
    /// The provider body is written to `raw.json` in the debug directory.
    pub async fn run_single(app_config: &AppConfig) -> Result<()> {
        println!("{}", "=".repeat(60).blue());
        println!("{}", "Net GEX Single Ticker".green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();

        // Missing credentials stop here, before any request is built.
        let provider = ProviderConfig::from_env()
            .context("Provider credentials unavailable")?
            .with_timeout(app_config.http_timeout);
        let client = YahooOptionsClient::new(provider)?;

        let request = QuoteRequest::new(&app_config.ticker, app_config.expiration);
        let k_source = app_config.fixed_k.map(KSource::Fixed).unwrap_or(KSource::Calibrated);
        let debug = DebugState::new(Some(app_config.debug_dir.clone()));

        println!("{} Ticker: {}", "→".cyan(), request.ticker.yellow());
        match request.expiration {
            Some(date) => println!("{} Expiration: {}", "→".cyan(), date.to_string().yellow()),
            None => println!("{} Expiration: {}", "→".cyan(), "nearest".yellow()),
        }
        println!();

        let result = analysis::analyze(&client, &request, k_source, &CalibrationParams::default(), &debug).await;

        // raw.json mirrors the last response whether or not it parsed.
        if let Some(body) = debug.last_body().await {
            let path = app_config.debug_dir.join("raw.json");
            std::fs::create_dir_all(&app_config.debug_dir)
                .and_then(|_| std::fs::write(&path, &body))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Saved provider response to {}", "✓".green(), path.display());
        }

        match result {
            Ok(analysis) => {
                print!("{}", render::render_terminal(&analysis));
                println!("{}", "=".repeat(60).blue());
                Ok(())
            }
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                Err(e.into())
            }
        }
    }
}
