//! Wallet service: account directory, wallet store, ledger engine and history.

use serde::Serialize;

use crate::db::{Store, User, Wallet};

mod accounts;
mod history;
mod ledger;

pub use ledger::{Posting, TransferReceipt, BALANCE_OVERFLOW};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserWallets {
    pub user: User,
    pub wallets: Vec<Wallet>,
}

pub struct WalletService<S> {
    store: S,
}

impl<S: Store> WalletService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}
