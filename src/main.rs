use anyhow::Result;
use netgex::app_config::AppConfig;
use netgex::commands::Commands;
use netgex::logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let app_config = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!("Set NETGEX_MODE to control execution mode");
            eprintln!("Examples:");
            eprintln!("  NETGEX_MODE=server NETGEX_PORT=3001 cargo run          # Start the web page on port 3001");
            eprintln!("  NETGEX_MODE=single NETGEX_TICKER=SPY cargo run         # Nearest expiration in the terminal");
            eprintln!("  NETGEX_MODE=single NETGEX_TICKER=SPY NETGEX_EXPIRATION=2025-01-17 NETGEX_K=2.5 cargo run");
            eprintln!("Provider secrets: RAPIDAPI_HOST, RAPIDAPI_KEY");
            std::process::exit(1);
        }
    };

    Commands::run(&app_config).await
}
