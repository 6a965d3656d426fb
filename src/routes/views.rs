//! JSON shapes returned by the HTTP layer. Decimals are rendered as
//! normalized strings so `0.000` reads as `"0"`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{EntryType, Ledger, Operation, Transaction, TransactionLedgers, TransactionStatus, User, Wallet};
use crate::service::{Posting, TransferReceipt, UserWallets};

fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub id: i64,
    pub user_account_id: i64,
    pub currency: String,
    pub balance: String,
}

impl From<Wallet> for WalletView {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_account_id: wallet.user_account_id,
            currency: wallet.currency.into(),
            balance: decimal_text(wallet.balance),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserWalletsView {
    pub user: User,
    pub wallets: Vec<WalletView>,
}

impl From<UserWallets> for UserWalletsView {
    fn from(user_wallets: UserWallets) -> Self {
        Self {
            user: user_wallets.user,
            wallets: user_wallets.wallets.into_iter().map(WalletView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerView {
    pub id: i64,
    pub wallet_id: i64,
    pub transaction_id: i64,
    pub entry_type: EntryType,
    pub amount: String,
    pub balance: String,
    pub created_at: DateTime<Utc>,
}

impl From<Ledger> for LedgerView {
    fn from(ledger: Ledger) -> Self {
        Self {
            id: ledger.id,
            wallet_id: ledger.wallet_id,
            transaction_id: ledger.transaction_id,
            entry_type: ledger.entry_type,
            amount: decimal_text(ledger.amount),
            balance: decimal_text(ledger.balance),
            created_at: ledger.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetadataView {
    pub source_wallet_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_wallet_id: Option<i64>,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: i64,
    pub requestor_id: i64,
    pub nonce: i64,
    pub operation: Operation,
    pub status: TransactionStatus,
    pub metadata: MetadataView,
    pub created_at: DateTime<Utc>,
    pub ledgers: Vec<LedgerView>,
}

impl TransactionView {
    pub fn new(transaction: Transaction, ledgers: Vec<Ledger>) -> Self {
        Self {
            id: transaction.id,
            requestor_id: transaction.requestor_id,
            nonce: transaction.nonce,
            operation: transaction.operation,
            status: transaction.status,
            metadata: MetadataView {
                source_wallet_id: transaction.metadata.source_wallet_id,
                destination_wallet_id: transaction.metadata.destination_wallet_id,
                amount: decimal_text(transaction.metadata.amount),
            },
            created_at: transaction.created_at,
            ledgers: ledgers.into_iter().map(LedgerView::from).collect(),
        }
    }
}

impl From<TransactionLedgers> for TransactionView {
    fn from(entry: TransactionLedgers) -> Self {
        Self::new(entry.transaction, entry.ledgers)
    }
}

impl From<Posting> for TransactionView {
    fn from(posting: Posting) -> Self {
        Self::new(posting.transaction, vec![posting.ledger])
    }
}

impl From<TransferReceipt> for TransactionView {
    fn from(receipt: TransferReceipt) -> Self {
        Self::new(receipt.transaction, receipt.ledgers.into())
    }
}
