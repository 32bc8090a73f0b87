use thiserror::Error;

/// Failure of a permission-checked entity operation, shared by every access path.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl EntityError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        EntityError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EntityError::Validation(message.into())
    }

    /// Stable machine-readable name, used in tool failures.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "not_found",
            EntityError::Forbidden(_) => "forbidden",
            EntityError::Validation(_) => "validation",
            EntityError::Conflict(_) => "conflict",
            EntityError::Database(_) | EntityError::Serialization(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for EntityError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return EntityError::Conflict(format!(
                    "a record with this value already exists ({})",
                    db_err.message()
                ));
            }
            if db_err.is_foreign_key_violation() {
                return EntityError::Validation("referenced record does not exist".to_string());
            }
            if db_err.is_check_violation() {
                return EntityError::Validation(db_err.message().to_string());
            }
        }
        EntityError::Database(err)
    }
}
