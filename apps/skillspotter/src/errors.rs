use thiserror::Error;

/// Client-level error type.
/// Read paths inspect `is_fallback_eligible` to decide whether the fallback cache
/// may answer instead; write paths surface `user_message` to the caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Session expired")]
    AuthExpired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a read operation may fall back to locally cached data after this error.
    /// Only transport failures and backend errors other than 401/403 qualify.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::NotFound(_) => true,
            AppError::Api { status, .. } => !matches!(status, 401 | 403),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::AuthExpired | AppError::Api { status: 401, .. })
    }

    /// Message shown to the user when a write operation fails.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Network(_) => "Network or server error. Please try again.".to_string(),
            AppError::AuthExpired | AppError::Api { status: 401, .. } => {
                "Authentication required. Please log in again.".to_string()
            }
            AppError::Api { status: 400, message } if !message.is_empty() => message.clone(),
            AppError::Api { status: 400, .. } => {
                "Invalid data. Please check your inputs.".to_string()
            }
            AppError::Api { status: 403, .. } => "You do not have access to this action.".to_string(),
            AppError::Api { .. } => "The server could not complete the request.".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::UploadFailed(_) => {
                "Failed to upload file. Please try again.".to_string()
            }
            AppError::NotFound(what) => format!("{what} could not be found."),
            AppError::Storage(_) => "The file could not be stored. Please try again.".to_string(),
            AppError::Cache(_) => "Local storage is unavailable.".to_string(),
            AppError::Serialization(_) | AppError::Internal(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}
