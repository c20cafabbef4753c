use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A tick source could not load its backing data set. Fatal before any
    /// task is started.
    #[error("data source '{source_name}' unavailable: {reason}")]
    DataUnavailable { source_name: String, reason: String },

    #[error("invalid parameters for strategy '{strategy}': {reason}")]
    InvalidParameters { strategy: String, reason: String },

    #[error("configuration error: {0}")]
    InvalidConfiguration(String),

    #[error("invalid transaction: amount {amount} at price {price}")]
    InvalidTransaction { amount: f64, price: f64 },

    #[error("tick has no field '{0}'")]
    MissingField(String),

    #[error("strategy '{0}' used before configure()")]
    NotConfigured(String),

    /// The other end of a pipeline channel went away. Expected during
    /// shutdown, not a failure of the component that observed it.
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn data_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Error::DataUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_parameters(strategy: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidParameters {
            strategy: strategy.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
