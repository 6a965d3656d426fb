//! Storage seam for the ledger.
//!
//! A [`Store`] hands out units of work ([`StoreTx`]). Everything done through a
//! unit of work becomes visible atomically on [`StoreTx::commit`]; dropping it
//! without committing rolls it back and releases any row locks it holds.

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod utils;

pub use error::{StoreError, USERNAME_UNIQUE_KEY, WALLET_BALANCE_CHECK};
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;
pub use utils::Isolation;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self, isolation: Isolation) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError>;

    async fn user_by_username(&mut self, username: &str) -> Result<User, StoreError>;

    async fn insert_wallet(&mut self, owner_id: i64, currency: &Currency) -> Result<Wallet, StoreError>;

    /// Plain read, no lock.
    async fn wallet_by_id(&mut self, wallet_id: i64) -> Result<Wallet, StoreError>;

    async fn wallets_by_owner(&mut self, owner_id: i64) -> Result<Vec<Wallet>, StoreError>;

    /// Reads the wallet with its owner and holds an exclusive lock on the
    /// wallet row until the unit of work ends.
    async fn wallet_for_update(&mut self, wallet_id: i64) -> Result<UserWallet, StoreError>;

    /// Fails with a check violation on [`WALLET_BALANCE_CHECK`] for negative balances.
    async fn update_balance(&mut self, wallet_id: i64, balance: rust_decimal::Decimal) -> Result<(), StoreError>;

    async fn insert_transaction(&mut self, new: &NewTransaction) -> Result<Transaction, StoreError>;

    async fn set_transaction_status(
        &mut self,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError>;

    async fn append_ledger(&mut self, new: &NewLedger) -> Result<Ledger, StoreError>;

    /// Transactions requested by the user or touching one of the user's
    /// wallets, newest first, each with the entries posted to the user's wallets.
    async fn transaction_ledgers_for_user(&mut self, user_id: i64) -> Result<Vec<TransactionLedgers>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
