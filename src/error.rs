use thiserror::Error;

/// Provider credentials are missing or unusable. Blocks any request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set (check the provider secrets)")]
    Missing(&'static str),

    #[error("{0} contains characters that are not valid in an HTTP header")]
    InvalidHeader(&'static str),
}

/// Failures talking to the options provider or reading what it returned.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Non-JSON response: {0}")]
    NonJson(String),

    #[error("API message: {0}")]
    Api(String),

    #[error("Unexpected payload: {0}")]
    Payload(String),
}

/// Everything that can stop one calculate action.
#[derive(Debug, Error)]
pub enum NetGexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
