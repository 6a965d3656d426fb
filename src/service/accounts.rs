use crate::db::{Isolation, Store, StoreTx, User, Wallet};
use crate::error::Result;
use crate::validate;

use super::WalletService;

impl<S: Store> WalletService<S> {
    pub async fn create_user(&self, username: &str) -> Result<User> {
        let username = validate::username(username)?;

        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let user = tx.insert_user(username).await?;
        tx.commit().await?;

        tracing::info!("user created with username: {}", user.username);
        Ok(user)
    }

    /// Opens a zero-balance wallet for an existing user.
    pub async fn create_wallet(&self, username: &str, currency: &str) -> Result<Wallet> {
        let username = validate::username(username)?;
        let currency = validate::currency(currency)?;

        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let user = tx.user_by_username(username).await?;
        let wallet = tx.insert_wallet(user.id, &currency).await?;
        tx.commit().await?;

        tracing::info!("wallet {} ({}) created for user: {}", wallet.id, wallet.currency, user.username);
        Ok(wallet)
    }

    pub async fn user(&self, username: &str) -> Result<User> {
        let username = validate::username(username)?;

        let mut tx = self.store.begin(Isolation::RepeatableRead).await?;
        let user = tx.user_by_username(username).await?;
        tx.commit().await?;
        Ok(user)
    }
}
