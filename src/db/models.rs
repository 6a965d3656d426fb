use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Alphabetic ISO 4217 style code, always upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrency);
        }
        Ok(Currency(code.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        code.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_account_id: i64,
    pub currency: Currency,
    pub balance: Decimal,
}

/// A wallet read together with its owner, as returned by the locking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWallet {
    pub user: User,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deposit,
    Withdraw,
    Transfer,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
            Operation::Transfer => "transfer",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Operation::Deposit),
            "withdraw" => Ok(Operation::Withdraw),
            "transfer" => Ok(Operation::Transfer),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "credit",
            EntryType::Debit => "debit",
        }
    }

    /// Applies this entry to a balance. `None` when the result does not fit a `Decimal`.
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Option<Decimal> {
        let next = match self {
            EntryType::Credit => balance.checked_add(amount),
            EntryType::Debit => balance.checked_sub(amount),
        };
        next.map(|value| value.normalize())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(EntryType::Credit),
            "debit" => Ok(EntryType::Debit),
            other => Err(format!("unknown entry type: {other}")),
        }
    }
}

/// Why a transaction ended in an error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InsufficientFunds,
    CurrencyMismatch,
    OwnershipMismatch,
    NotFound,
    ConstraintViolation,
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InsufficientFunds => "insufficient_funds",
            FailureKind::CurrencyMismatch => "currency_mismatch",
            FailureKind::OwnershipMismatch => "ownership_mismatch",
            FailureKind::NotFound => "not_found",
            FailureKind::ConstraintViolation => "constraint_violation",
            FailureKind::Storage => "storage",
        }
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insufficient_funds" => Ok(FailureKind::InsufficientFunds),
            "currency_mismatch" => Ok(FailureKind::CurrencyMismatch),
            "ownership_mismatch" => Ok(FailureKind::OwnershipMismatch),
            "not_found" => Ok(FailureKind::NotFound),
            "constraint_violation" => Ok(FailureKind::ConstraintViolation),
            "storage" => Ok(FailureKind::Storage),
            other => Err(format!("unknown failure kind: {other}")),
        }
    }
}

/// Lifecycle of a transaction record: created `pending`, then set once to
/// `success` or `error_<kind>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransactionStatus {
    Pending,
    Success,
    Error(FailureKind),
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => f.write_str("pending"),
            TransactionStatus::Success => f.write_str("success"),
            TransactionStatus::Error(kind) => write!(f, "error_{}", kind.as_str()),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            other => match other.strip_prefix("error_") {
                Some(kind) => kind.parse().map(TransactionStatus::Error),
                None => Err(format!("unknown transaction status: {other}")),
            },
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        s.parse()
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.to_string()
    }
}

/// Operation-specific context kept on the transaction row, including on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub source_wallet_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_wallet_id: Option<i64>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub requestor_id: i64,
    pub nonce: i64,
    pub operation: Operation,
    pub status: TransactionStatus,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub requestor_id: i64,
    pub nonce: i64,
    pub operation: Operation,
    pub metadata: TransactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: i64,
    pub wallet_id: i64,
    pub transaction_id: i64,
    pub entry_type: EntryType,
    pub amount: Decimal,
    /// Wallet balance right after this entry was posted.
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedger {
    pub wallet_id: i64,
    pub transaction_id: i64,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLedgers {
    pub transaction: Transaction,
    pub ledgers: Vec<Ledger>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for text in ["pending", "success", "error_insufficient_funds", "error_currency_mismatch"] {
            let status: TransactionStatus = text.parse().unwrap();
            assert_eq!(status.to_string(), text);
        }
    }

    #[test]
    fn status_deserializes_from_its_text() {
        let status: TransactionStatus = serde_json::from_str("\"error_storage\"").unwrap();
        assert_eq!(status, TransactionStatus::Error(FailureKind::Storage));
        assert_eq!(TransactionStatus::try_from("success".to_string()), Ok(TransactionStatus::Success));
        assert!(serde_json::from_str::<TransactionStatus>("\"settled\"").is_err());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("error_bogus".parse::<TransactionStatus>().is_err());
        assert!("done".parse::<TransactionStatus>().is_err());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Error(FailureKind::Storage).is_terminal());
    }

    #[test]
    fn currency_is_upper_cased() {
        let currency: Currency = "sgd".parse().unwrap();
        assert_eq!(currency.as_str(), "SGD");
        assert_eq!("US".parse::<Currency>(), Err(ValidationError::InvalidCurrency));
        assert_eq!("U$D".parse::<Currency>(), Err(ValidationError::InvalidCurrency));
    }

    #[test]
    fn entry_application_normalizes_balance() {
        let balance: Decimal = "40.123".parse().unwrap();
        let drained = EntryType::Debit.apply(balance, balance).unwrap();
        assert_eq!(drained.to_string(), "0");
        assert_eq!(EntryType::Credit.apply(Decimal::ZERO, balance).unwrap().to_string(), "40.123");
    }

    #[test]
    fn entry_application_reports_overflow() {
        assert_eq!(EntryType::Credit.apply(Decimal::MAX, Decimal::ONE), None);
        assert_eq!(EntryType::Debit.apply(Decimal::MIN, Decimal::ONE), None);
        assert_eq!(EntryType::Credit.apply(Decimal::MAX, Decimal::ZERO), Some(Decimal::MAX));
    }

    #[test]
    fn metadata_amount_serializes_as_string() {
        let metadata = TransactionMetadata {
            source_wallet_id: 7,
            destination_wallet_id: None,
            amount: "50.1".parse().unwrap(),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["amount"], "50.1");
        assert_eq!(json["source_wallet_id"], 7);
        assert!(json.get("destination_wallet_id").is_none());
    }
}
