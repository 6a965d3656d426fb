//! Stateless request checks, run before any storage is touched.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::Currency;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid_amount")]
    InvalidAmount,

    #[error("invalid_nonce")]
    InvalidNonce,

    #[error("user id cannot be empty")]
    EmptyIdentifier,

    #[error("invalid_currency")]
    InvalidCurrency,

    #[error("invalid_wallet_id")]
    InvalidWalletId,

    #[error("invalid_destination")]
    SameWallet,
}

#[inline]
pub fn amount(amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::InvalidAmount);
    }
    Ok(amount)
}

/// Parses a decimal amount given as text, e.g. `"40.123"`.
pub fn amount_str(raw: &str) -> Result<Decimal, ValidationError> {
    let parsed: Decimal = raw.trim().parse().map_err(|_| ValidationError::InvalidAmount)?;
    amount(parsed)
}

#[inline]
pub fn nonce(nonce: i64) -> Result<i64, ValidationError> {
    if nonce == 0 {
        return Err(ValidationError::InvalidNonce);
    }
    Ok(nonce)
}

#[inline]
pub fn username(username: &str) -> Result<&str, ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    Ok(username)
}

#[inline]
pub fn wallet_id(wallet_id: i64) -> Result<i64, ValidationError> {
    if wallet_id <= 0 {
        return Err(ValidationError::InvalidWalletId);
    }
    Ok(wallet_id)
}

pub fn currency(code: &str) -> Result<Currency, ValidationError> {
    code.parse()
}

pub fn transfer_wallets(source: i64, destination: i64) -> Result<(i64, i64), ValidationError> {
    let source = wallet_id(source)?;
    let destination = wallet_id(destination)?;
    if source == destination {
        return Err(ValidationError::SameWallet);
    }
    Ok((source, destination))
}
