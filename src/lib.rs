//! Multi-user wallet ledger.
//!
//! Wallet balances move only through [`service::WalletService`] deposits,
//! withdrawals and transfers. Every attempt leaves a transaction record and
//! every successful one a double-entry ledger trail.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod service;
pub mod validate;

pub use error::{LedgerError, Result};
pub use service::WalletService;
