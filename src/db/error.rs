use thiserror::Error;

/// Check constraint keeping wallet balances non-negative.
pub const WALLET_BALANCE_CHECK: &str = "wallets_balance_check";
/// Unique key on `user_accounts.username`.
pub const USERNAME_UNIQUE_KEY: &str = "user_accounts_username_key";

/// Storage-level errors, before translation into domain errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique violation on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("check violation on {constraint}")]
    CheckViolation { constraint: String },

    #[error("foreign key violation on {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("length of rows should be at most 1")]
    TooManyRows,

    #[error("undecodable row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Backend(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        let kind = err
            .as_database_error()
            .map(|db_err| (db_err.kind(), db_err.constraint().unwrap_or_default().to_string()));

        match kind {
            Some((ErrorKind::UniqueViolation, constraint)) => StoreError::UniqueViolation { constraint },
            Some((ErrorKind::CheckViolation, constraint)) => StoreError::CheckViolation { constraint },
            Some((ErrorKind::ForeignKeyViolation, constraint)) => {
                StoreError::ForeignKeyViolation { constraint }
            }
            _ => match err {
                sqlx::Error::ColumnDecode { index, source } => {
                    StoreError::Corrupt(format!("column {index}: {source}"))
                }
                other => StoreError::Backend(other),
            },
        }
    }
}
