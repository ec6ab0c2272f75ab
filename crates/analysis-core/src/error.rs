use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Too many fields missing for an instrument; the instrument is excluded from the run.
    #[error("Insufficient data for {symbol}: {reason}")]
    DataInsufficient { symbol: String, reason: String },

    /// The ensemble predictor could not be loaded or trained. Callers fall back to quant-only blending.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// A policy definition is corrupt (weights, thresholds, ratios). Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(String),
}

impl AnalysisError {
    pub fn insufficient(symbol: &str, reason: impl Into<String>) -> Self {
        AnalysisError::DataInsufficient {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(e: std::io::Error) -> Self {
        AnalysisError::Io(e.to_string())
    }
}
