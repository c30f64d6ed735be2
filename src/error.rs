use crate::types::FieldCategory;
use thiserror::Error;

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Conflicting field registration, invalid options, bad config values.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A symbol or field the provider never returned.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// The operation needs a panel that has not been populated yet.
    #[error("Panel state error: the {0} panel does not exist yet, populate it before appending")]
    MissingPanel(FieldCategory),

    /// A formula references a variable or function that cannot be resolved.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Formula parse error: {0}")]
    Parse(String),

    #[error("Formula evaluation error: {0}")]
    Eval(String),

    /// Failure reported by an external collaborator (data provider,
    /// calendar, membership service). Never retried here.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl PanelError {
    /// Whether the error came from an external collaborator.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, PanelError::Provider(_))
    }
}

impl From<polars::error::PolarsError> for PanelError {
    fn from(err: polars::error::PolarsError) -> Self {
        PanelError::Persistence(err.to_string())
    }
}
