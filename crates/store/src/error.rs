use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated (duplicate SKU, promotion code, order number).
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A delete was refused by a referential rule.
    #[error("Delete restricted: {0}")]
    Restricted(String),

    /// A row lock could not be acquired within the configured timeout.
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    /// A numeric value left the range its column can hold.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// A row referenced by the operation does not exist.
    #[error("Row not found: {entity} {id}")]
    RowNotFound { entity: &'static str, id: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    let constraint = db_err.constraint().unwrap_or("unique").to_string();
                    tracing::debug!(%constraint, "unique constraint violated");
                    return StoreError::UniqueViolation(constraint);
                }
                // lock_not_available
                Some("55P03") => {
                    tracing::warn!("row lock wait exceeded lock_timeout");
                    return StoreError::LockTimeout;
                }
                // numeric_value_out_of_range
                Some("22003") => {
                    tracing::warn!(detail = %db_err.message(), "numeric value out of range");
                    return StoreError::OutOfRange(db_err.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

impl From<common::ParseStatusError> for StoreError {
    fn from(err: common::ParseStatusError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
