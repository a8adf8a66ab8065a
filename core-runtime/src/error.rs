use bridge_traits::BridgeError;
use thiserror::Error;

/// Failures while assembling the runtime: config, default adapters, logging.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Default {adapter} could not be created: {source}")]
    DefaultAdapter {
        adapter: &'static str,
        #[source]
        source: BridgeError,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
