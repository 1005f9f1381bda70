use serde::Serialize;

/// Crate-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly for the frontend bridge so the canvas gets structured error messages.
///
/// Connection-graph rejections are not errors; see
/// [`ConnectionRejection`](crate::engine::connection_graph::ConnectionRejection).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same operation later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Remote(_) | AppError::Timeout(_) | AppError::Io(_) | AppError::Pool(_)
        )
    }
}

/// The frontend bridge requires `Serialize` on returned errors.
/// We serialize as `{ error: "...", kind: "..." }` for frontend consumption.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field(
            "kind",
            match self {
                AppError::Database(_) => "database",
                AppError::Pool(_) => "pool",
                AppError::NotFound(_) => "not_found",
                AppError::Validation(_) => "validation",
                AppError::Io(_) => "io",
                AppError::Serde(_) => "serde",
                AppError::Config(_) => "config",
                AppError::Remote(_) => "remote",
                AppError::Timeout(_) => "timeout",
                AppError::Internal(_) => "internal",
            },
        )?;
        s.end()
    }
}
