use thiserror::Error;

use crate::db::{FailureKind, StoreError, WALLET_BALANCE_CHECK};
use crate::validate::ValidationError;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Domain errors surfaced to callers of the wallet service.
///
/// Display strings are part of the API: they are returned verbatim in the
/// `error` field of HTTP responses.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("resource: {0} not found")]
    NotFound(&'static str),

    #[error("unique_violation")]
    UniqueViolation,

    #[error("insufficient_funds")]
    InsufficientFunds,

    #[error("currency_mismatch")]
    CurrencyMismatch,

    #[error("requestor and wallet owner mismatch")]
    OwnershipMismatch,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// More rows than a unique lookup allows. Never expected.
    #[error("length of rows should be at most 1")]
    Inconsistent,

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl LedgerError {
    /// Kind recorded on a transaction as `error_<kind>` when the operation
    /// fails after its pending record was written.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            LedgerError::InsufficientFunds => FailureKind::InsufficientFunds,
            LedgerError::CurrencyMismatch => FailureKind::CurrencyMismatch,
            LedgerError::OwnershipMismatch => FailureKind::OwnershipMismatch,
            LedgerError::NotFound(_) => FailureKind::NotFound,
            LedgerError::Validation(_) | LedgerError::UniqueViolation | LedgerError::ConstraintViolation(_) => {
                FailureKind::ConstraintViolation
            }
            LedgerError::Inconsistent | LedgerError::Storage(_) => FailureKind::Storage,
        }
    }

    /// Errors caused by the request itself rather than by the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Inconsistent | LedgerError::Storage(_))
    }
}

/// Translates storage failures into domain errors, keyed on constraint identity.
impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. } => LedgerError::UniqueViolation,
            StoreError::CheckViolation { constraint } if constraint == WALLET_BALANCE_CHECK => {
                LedgerError::InsufficientFunds
            }
            StoreError::CheckViolation { constraint } | StoreError::ForeignKeyViolation { constraint } => {
                LedgerError::ConstraintViolation(constraint)
            }
            StoreError::NotFound(resource) => LedgerError::NotFound(resource),
            StoreError::TooManyRows => LedgerError::Inconsistent,
            other @ (StoreError::Corrupt(_) | StoreError::Backend(_)) => LedgerError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::USERNAME_UNIQUE_KEY;

    #[test]
    fn error_display_formats_correctly() {
        assert_eq!(LedgerError::NotFound("user").to_string(), "resource: user not found");
        assert_eq!(LedgerError::InsufficientFunds.to_string(), "insufficient_funds");
        assert_eq!(LedgerError::CurrencyMismatch.to_string(), "currency_mismatch");
        assert_eq!(LedgerError::UniqueViolation.to_string(), "unique_violation");
        assert_eq!(
            LedgerError::ConstraintViolation("ledgers_amount_check".into()).to_string(),
            "constraint violation: ledgers_amount_check"
        );
        assert_eq!(LedgerError::from(ValidationError::InvalidAmount).to_string(), "invalid_amount");
    }

    #[test]
    fn balance_check_becomes_insufficient_funds() {
        let err = LedgerError::from(StoreError::CheckViolation { constraint: WALLET_BALANCE_CHECK.into() });
        assert!(matches!(err, LedgerError::InsufficientFunds));
        assert_eq!(err.failure_kind(), FailureKind::InsufficientFunds);
    }

    #[test]
    fn other_check_constraints_stay_generic() {
        let err = LedgerError::from(StoreError::CheckViolation { constraint: "ledgers_amount_check".into() });
        match err {
            LedgerError::ConstraintViolation(name) => assert_eq!(name, "ledgers_amount_check"),
            other => panic!("Expected ConstraintViolation, got {other:?}"),
        }
    }

    #[test]
    fn unique_key_becomes_unique_violation() {
        let err = LedgerError::from(StoreError::UniqueViolation { constraint: USERNAME_UNIQUE_KEY.into() });
        assert!(matches!(err, LedgerError::UniqueViolation));
    }

    #[test]
    fn row_count_errors_map_to_not_found_and_inconsistent() {
        assert!(matches!(LedgerError::from(StoreError::NotFound("wallet")), LedgerError::NotFound("wallet")));
        let err = LedgerError::from(StoreError::TooManyRows);
        assert!(matches!(err, LedgerError::Inconsistent));
        assert!(!err.is_client_error());
    }

    #[test]
    fn backend_failures_are_opaque_storage_errors() {
        let err = LedgerError::from(StoreError::Backend(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(err.failure_kind(), FailureKind::Storage);
    }
}
