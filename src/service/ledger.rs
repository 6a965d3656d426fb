//! Ledger engine: deposit, withdraw and transfer.
//!
//! Each operation runs as two units of work. The first commits a `pending`
//! transaction record. The second locks the wallet rows, moves the balance,
//! appends ledger entries and marks the record `success`, all or nothing.
//! When the second unit of work fails it is rolled back and the record is
//! set to `error_<kind>` by a third, separate write, so failed attempts stay
//! visible in history.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::utils::lock_order;
use crate::db::{
    EntryType, Isolation, Ledger, NewLedger, NewTransaction, Operation, Store, StoreTx, Transaction,
    TransactionMetadata, TransactionStatus, User, Wallet,
};
use crate::error::{LedgerError, Result};
use crate::validate;

use super::WalletService;

/// Reported when a new balance would not fit the decimal representation.
pub const BALANCE_OVERFLOW: &str = "wallets_balance_overflow";

/// Outcome of a successful deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub transaction: Transaction,
    pub ledger: Ledger,
}

/// Outcome of a successful transfer: the source debit, then the destination credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub transaction: Transaction,
    pub ledgers: [Ledger; 2],
}

impl<S: Store> WalletService<S> {
    pub async fn deposit(&self, requestor: &str, nonce: i64, wallet_id: i64, amount: Decimal) -> Result<Posting> {
        self.post(Operation::Deposit, EntryType::Credit, requestor, nonce, wallet_id, amount)
            .await
    }

    pub async fn withdraw(&self, requestor: &str, nonce: i64, wallet_id: i64, amount: Decimal) -> Result<Posting> {
        self.post(Operation::Withdraw, EntryType::Debit, requestor, nonce, wallet_id, amount)
            .await
    }

    pub async fn transfer(
        &self,
        requestor: &str,
        nonce: i64,
        source_wallet_id: i64,
        destination_wallet_id: i64,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let requestor = validate::username(requestor)?;
        let nonce = validate::nonce(nonce)?;
        let (source, destination) = validate::transfer_wallets(source_wallet_id, destination_wallet_id)?;
        let amount = validate::amount(amount)?;

        let user = self.preflight(requestor, source, Some(destination)).await?;
        let pending = self
            .open(NewTransaction {
                requestor_id: user.id,
                nonce,
                operation: Operation::Transfer,
                metadata: TransactionMetadata {
                    source_wallet_id: source,
                    destination_wallet_id: Some(destination),
                    amount,
                },
            })
            .await?;
        tracing::info!(
            "transfer {} pending: {} from wallet {} to wallet {} by {}",
            pending.id,
            amount,
            source,
            destination,
            user.username
        );

        let outcome = match self.store.begin(Isolation::ReadCommitted).await {
            Ok(mut tx) => {
                let outcome = transfer_entries(&mut tx, &user, pending.id, source, destination, amount).await;
                finish(tx, outcome).await
            }
            Err(err) => Err(err.into()),
        };
        match outcome {
            Ok(receipt) => {
                tracing::info!("transfer {} succeeded", pending.id);
                Ok(receipt)
            }
            Err(err) => Err(self.fail(&pending, err).await),
        }
    }

    async fn post(
        &self,
        operation: Operation,
        entry_type: EntryType,
        requestor: &str,
        nonce: i64,
        wallet_id: i64,
        amount: Decimal,
    ) -> Result<Posting> {
        let requestor = validate::username(requestor)?;
        let nonce = validate::nonce(nonce)?;
        let wallet_id = validate::wallet_id(wallet_id)?;
        let amount = validate::amount(amount)?;

        let user = self.preflight(requestor, wallet_id, None).await?;
        let pending = self
            .open(NewTransaction {
                requestor_id: user.id,
                nonce,
                operation,
                metadata: TransactionMetadata {
                    source_wallet_id: wallet_id,
                    destination_wallet_id: None,
                    amount,
                },
            })
            .await?;
        tracing::info!(
            "{} {} pending: {} on wallet {} by {}",
            operation.as_str(),
            pending.id,
            amount,
            wallet_id,
            user.username
        );

        let outcome = match self.store.begin(Isolation::ReadCommitted).await {
            Ok(mut tx) => {
                let outcome = post_single(&mut tx, &user, pending.id, wallet_id, entry_type, amount).await;
                finish(tx, outcome).await
            }
            Err(err) => Err(err.into()),
        };
        match outcome {
            Ok(posting) => {
                tracing::info!(
                    "{} {} succeeded, wallet {} balance: {}",
                    operation.as_str(),
                    pending.id,
                    wallet_id,
                    posting.ledger.balance
                );
                Ok(posting)
            }
            Err(err) => Err(self.fail(&pending, err).await),
        }
    }

    /// Resolves the requestor and checks, without locks, that the source
    /// wallet exists and belongs to them. Failures here leave no record.
    async fn preflight(&self, requestor: &str, source: i64, destination: Option<i64>) -> Result<User> {
        let mut tx = self.store.begin(Isolation::RepeatableRead).await?;
        let user = tx.user_by_username(requestor).await?;

        let wallet = tx.wallet_by_id(source).await?;
        if wallet.user_account_id != user.id {
            tracing::warn!("user {} does not own wallet {}", user.username, wallet.id);
            return Err(LedgerError::OwnershipMismatch);
        }
        if let Some(destination) = destination {
            tx.wallet_by_id(destination).await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn open(&self, new: NewTransaction) -> Result<Transaction> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let transaction = tx.insert_transaction(&new).await?;
        tx.commit().await?;
        Ok(transaction)
    }

    /// Records the failure on the transaction and hands the error back.
    async fn fail(&self, pending: &Transaction, err: LedgerError) -> LedgerError {
        let status = TransactionStatus::Error(err.failure_kind());
        match self.mark(pending.id, status).await {
            Ok(_) => tracing::warn!("transaction {} finalized as {}: {}", pending.id, status, err),
            Err(mark_err) => tracing::error!(
                "transaction {} could not be finalized as {}: {} (operation error: {})",
                pending.id,
                status,
                mark_err,
                err
            ),
        }
        err
    }

    async fn mark(&self, transaction_id: i64, status: TransactionStatus) -> Result<Transaction> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let transaction = tx.set_transaction_status(transaction_id, status).await?;
        tx.commit().await?;
        Ok(transaction)
    }
}

/// Commits on success, rolls back on failure.
async fn finish<T, X: StoreTx>(tx: X, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

async fn post_single<X: StoreTx>(
    tx: &mut X,
    requestor: &User,
    transaction_id: i64,
    wallet_id: i64,
    entry_type: EntryType,
    amount: Decimal,
) -> Result<Posting> {
    let locked = tx.wallet_for_update(wallet_id).await?;
    if locked.user.id != requestor.id {
        return Err(LedgerError::OwnershipMismatch);
    }

    let ledger = post_entry(tx, &locked.wallet, transaction_id, entry_type, amount).await?;
    let transaction = tx
        .set_transaction_status(transaction_id, TransactionStatus::Success)
        .await?;
    Ok(Posting { transaction, ledger })
}

async fn transfer_entries<X: StoreTx>(
    tx: &mut X,
    requestor: &User,
    transaction_id: i64,
    source: i64,
    destination: i64,
    amount: Decimal,
) -> Result<TransferReceipt> {
    let (first, second) = lock_order(source, destination);
    let first_locked = tx.wallet_for_update(first).await?;
    let second_locked = tx.wallet_for_update(second).await?;
    let (source, destination) = if first_locked.wallet.id == source {
        (first_locked, second_locked)
    } else {
        (second_locked, first_locked)
    };

    if source.user.id != requestor.id {
        return Err(LedgerError::OwnershipMismatch);
    }
    if source.wallet.currency != destination.wallet.currency {
        return Err(LedgerError::CurrencyMismatch);
    }

    let debit = post_entry(tx, &source.wallet, transaction_id, EntryType::Debit, amount).await?;
    let credit = post_entry(tx, &destination.wallet, transaction_id, EntryType::Credit, amount).await?;
    let transaction = tx
        .set_transaction_status(transaction_id, TransactionStatus::Success)
        .await?;
    Ok(TransferReceipt { transaction, ledgers: [debit, credit] })
}

/// Writes the new balance of a locked wallet and the ledger entry recording it.
async fn post_entry<X: StoreTx>(
    tx: &mut X,
    wallet: &Wallet,
    transaction_id: i64,
    entry_type: EntryType,
    amount: Decimal,
) -> Result<Ledger> {
    let balance = entry_type
        .apply(wallet.balance, amount)
        .ok_or_else(|| LedgerError::ConstraintViolation(BALANCE_OVERFLOW.to_string()))?;
    tx.update_balance(wallet.id, balance).await?;

    let ledger = tx
        .append_ledger(&NewLedger {
            wallet_id: wallet.id,
            transaction_id,
            entry_type,
            amount,
            balance,
        })
        .await?;
    Ok(ledger)
}
