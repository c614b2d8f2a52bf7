pub mod analysis;
pub mod api_server_axum;
pub mod app_config;
pub mod commands;
pub mod config;
pub mod debug;
pub mod error;
pub mod logging;
pub mod models;
pub mod net_gex;
pub mod processor;
pub mod provider_client;
pub mod render;

// Re-exports (public API)
pub use error::{ConfigError, NetGexError, ProviderError};
pub use models::{ChainSnapshot, NetGexRow, OptionRow, QuoteRequest};
pub use net_gex::{CalibrationParams, KSource, NetGexResult, apply_net_gex, calculate_net_gex};
pub use provider_client::{RawResponse, YahooOptionsClient};
