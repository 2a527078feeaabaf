use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefGraphError {
    #[error("Model '{model}' is missing a filter")]
    MissingFilter { model: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid selector path '{path}': {reason}")]
    InvalidSelector { path: String, reason: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model '{0}' is readonly")]
    ReadOnly(String),

    #[error("Document not found: {model}/{id}")]
    NotFound { model: String, id: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RefGraphError>;
