/// Storage-layer error, kept separate from the shared domain error so
/// repositories stay usable without the rest of the stack.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database: {0}")]
    Database(sqlx::Error),

    #[error("migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) => {
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                    Self::Conflict(db.message().to_string())
                } else {
                    Self::Database(e)
                }
            }
            _ => Self::Database(e),
        }
    }
}

impl From<StorageError> for scriberr_domain::Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound("record not found".into()),
            StorageError::Conflict(m) => Self::Conflict(m),
            StorageError::Database(e) => Self::Internal(format!("database: {e}")),
            StorageError::Migration(e) => Self::Internal(format!("migration: {e}")),
            StorageError::Corrupt(m) => Self::Internal(format!("corrupt record: {m}")),
        }
    }
}
