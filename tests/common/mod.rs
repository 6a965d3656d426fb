#![allow(dead_code)]

use rust_decimal::Decimal;
use wallet_ledger::db::{MemoryStore, Wallet};
use wallet_ledger::WalletService;

pub type Service = WalletService<MemoryStore>;

pub fn service() -> Service {
    WalletService::new(MemoryStore::new())
}

pub fn dec(value: &str) -> Decimal {
    value.parse().expect("valid decimal literal")
}

/// Creates a user with one wallet in `currency`.
pub async fn user_with_wallet(service: &Service, username: &str, currency: &str) -> Wallet {
    service.create_user(username).await.expect("create user");
    service.create_wallet(username, currency).await.expect("create wallet")
}

pub async fn balance_of(service: &Service, username: &str, wallet_id: i64) -> Decimal {
    service
        .get_wallets(username)
        .await
        .expect("get wallets")
        .wallets
        .into_iter()
        .find(|w| w.id == wallet_id)
        .expect("wallet belongs to user")
        .balance
}
