use crate::db::{Isolation, Store, StoreTx, TransactionLedgers};
use crate::error::Result;
use crate::validate;

use super::{UserWallets, WalletService};

impl<S: Store> WalletService<S> {
    /// Current balances of every wallet the user owns. Takes no locks.
    pub async fn get_wallets(&self, username: &str) -> Result<UserWallets> {
        let username = validate::username(username)?;

        let mut tx = self.store.begin(Isolation::RepeatableRead).await?;
        let user = tx.user_by_username(username).await?;
        let wallets = tx.wallets_by_owner(user.id).await?;
        tx.commit().await?;

        Ok(UserWallets { user, wallets })
    }

    /// Every transaction the user requested or that posted to one of the
    /// user's wallets, newest first. Ledger entries against other users'
    /// wallets are left out.
    pub async fn get_transactions(&self, username: &str) -> Result<Vec<TransactionLedgers>> {
        let username = validate::username(username)?;

        let mut tx = self.store.begin(Isolation::RepeatableRead).await?;
        let user = tx.user_by_username(username).await?;
        let history = tx.transaction_ledgers_for_user(user.id).await?;
        tx.commit().await?;

        tracing::debug!("loaded {} transactions for user: {}", history.len(), user.username);
        Ok(history)
    }
}
