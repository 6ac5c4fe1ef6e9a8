use reqwest::StatusCode;

/// Transport failure talking to the RAG backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("{op} failed (status {status})")]
    Status { op: &'static str, status: StatusCode },

    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Collection registry is unavailable: {0}")]
    Unavailable(#[source] ApiError),

    #[error("Failed to delete collection '{collection_name}': {source}")]
    DeleteFailed {
        collection_name: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file selected")]
    MissingFile,

    #[error("An upload is already in progress")]
    AlreadyInProgress,

    #[error("{0}")]
    Failed(#[from] ApiError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A question is already being answered")]
    SendInProgress,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("History database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("History database lock is poisoned")]
    Poisoned,

    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}
