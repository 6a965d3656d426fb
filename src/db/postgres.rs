use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};

use super::error::StoreError;
use super::models::*;
use super::utils::Isolation;
use super::{Store, StoreTx};

// Database repository
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

pub struct PgStoreTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgStoreTx;

    async fn begin(&self, isolation: Isolation) -> Result<PgStoreTx, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(isolation.statement()).execute(&mut *tx).await?;

        if isolation == Isolation::ReadCommitted {
            // SET does not take bind parameters
            let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }

        Ok(PgStoreTx { tx })
    }
}

#[derive(FromRow)]
struct WalletRow {
    id: i64,
    user_account_id: i64,
    currency: String,
    balance: Decimal,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(Wallet {
            id: row.id,
            user_account_id: row.user_account_id,
            currency: row
                .currency
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("wallet {} currency {}", row.id, row.currency)))?,
            balance: row.balance,
        })
    }
}

#[derive(FromRow)]
struct UserWalletRow {
    user_id: i64,
    username: String,
    #[sqlx(flatten)]
    wallet: WalletRow,
}

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    requestor_id: i64,
    nonce: i64,
    status: String,
    operation: String,
    metadata: Json<TransactionMetadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            requestor_id: row.requestor_id,
            nonce: row.nonce,
            operation: row.operation.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LedgerRow {
    id: i64,
    wallet_id: i64,
    transaction_id: i64,
    entry_type: String,
    amount: Decimal,
    balance: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for Ledger {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Ledger {
            id: row.id,
            wallet_id: row.wallet_id,
            transaction_id: row.transaction_id,
            entry_type: row.entry_type.parse().map_err(StoreError::Corrupt)?,
            amount: row.amount,
            balance: row.balance,
            created_at: row.created_at,
        })
    }
}

/// Enforces "exactly one row" on reads keyed by a unique column.
fn exactly_one<T>(mut rows: Vec<T>, resource: &'static str) -> Result<T, StoreError> {
    match rows.len() {
        0 => Err(StoreError::NotFound(resource)),
        1 => Ok(rows.remove(0)),
        _ => Err(StoreError::TooManyRows),
    }
}

const TRANSACTION_COLUMNS: &str = "id, requestor_id, nonce, status, operation, metadata, created_at";

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError> {
        let (id, username): (i64, String) = sqlx::query_as(
            r#"
            INSERT INTO user_accounts (username)
            VALUES ($1)
            RETURNING id, username
            "#,
        )
        .bind(username)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(User { id, username })
    }

    async fn user_by_username(&mut self, username: &str) -> Result<User, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, username
            FROM user_accounts
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_all(&mut *self.tx)
        .await?;

        let (id, username) = exactly_one(rows, "user")?;
        Ok(User { id, username })
    }

    async fn insert_wallet(&mut self, owner_id: i64, currency: &Currency) -> Result<Wallet, StoreError> {
        let row: WalletRow = sqlx::query_as(
            r#"
            INSERT INTO wallets (user_account_id, currency, balance)
            VALUES ($1, $2, $3)
            RETURNING id, user_account_id, currency, balance
            "#,
        )
        .bind(owner_id)
        .bind(currency.as_str())
        .bind(Decimal::ZERO)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn wallet_by_id(&mut self, wallet_id: i64) -> Result<Wallet, StoreError> {
        let rows: Vec<WalletRow> = sqlx::query_as(
            "SELECT id, user_account_id, currency, balance FROM wallets WHERE id = $1",
        )
        .bind(wallet_id)
        .fetch_all(&mut *self.tx)
        .await?;

        exactly_one(rows, "wallet")?.try_into()
    }

    async fn wallets_by_owner(&mut self, owner_id: i64) -> Result<Vec<Wallet>, StoreError> {
        let rows: Vec<WalletRow> = sqlx::query_as(
            "SELECT id, user_account_id, currency, balance FROM wallets WHERE user_account_id = $1 ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Wallet::try_from).collect()
    }

    async fn wallet_for_update(&mut self, wallet_id: i64) -> Result<UserWallet, StoreError> {
        let rows: Vec<UserWalletRow> = sqlx::query_as(
            r#"
            SELECT ua.id AS user_id, ua.username, w.id, w.user_account_id, w.currency, w.balance
            FROM user_accounts ua
            JOIN wallets w ON w.user_account_id = ua.id
            WHERE w.id = $1
            FOR UPDATE OF w
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let row = exactly_one(rows, "wallet")?;
        Ok(UserWallet {
            user: User { id: row.user_id, username: row.username },
            wallet: row.wallet.try_into()?,
        })
    }

    async fn update_balance(&mut self, wallet_id: i64, balance: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE wallets SET balance = $1 WHERE id = $2")
            .bind(balance)
            .bind(wallet_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("wallet"));
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, new: &NewTransaction) -> Result<Transaction, StoreError> {
        let row: TransactionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO transactions (requestor_id, nonce, status, operation, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, clock_timestamp())
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(new.requestor_id)
        .bind(new.nonce)
        .bind(TransactionStatus::Pending.to_string())
        .bind(new.operation.as_str())
        .bind(Json(&new.metadata))
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn set_transaction_status(
        &mut self,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "UPDATE transactions SET status = $1 WHERE id = $2 RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(status.to_string())
        .bind(transaction_id)
        .fetch_all(&mut *self.tx)
        .await?;

        exactly_one(rows, "transaction")?.try_into()
    }

    async fn append_ledger(&mut self, new: &NewLedger) -> Result<Ledger, StoreError> {
        let row: LedgerRow = sqlx::query_as(
            r#"
            INSERT INTO ledgers (wallet_id, transaction_id, entry_type, amount, balance, created_at)
            VALUES ($1, $2, $3, $4, $5, clock_timestamp())
            RETURNING id, wallet_id, transaction_id, entry_type, amount, balance, created_at
            "#,
        )
        .bind(new.wallet_id)
        .bind(new.transaction_id)
        .bind(new.entry_type.as_str())
        .bind(new.amount)
        .bind(new.balance)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn transaction_ledgers_for_user(&mut self, user_id: i64) -> Result<Vec<TransactionLedgers>, StoreError> {
        let transactions: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.requestor_id, t.nonce, t.status, t.operation, t.metadata, t.created_at
            FROM transactions t
            WHERE t.requestor_id = $1
               OR EXISTS (
                    SELECT 1
                    FROM ledgers l
                    JOIN wallets w ON w.id = l.wallet_id
                    WHERE l.transaction_id = t.id AND w.user_account_id = $1
               )
            ORDER BY t.created_at DESC, t.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let ledgers: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT l.id, l.wallet_id, l.transaction_id, l.entry_type, l.amount, l.balance, l.created_at
            FROM ledgers l
            JOIN wallets w ON w.id = l.wallet_id
            WHERE w.user_account_id = $1
            ORDER BY l.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_transaction: HashMap<i64, Vec<Ledger>> = HashMap::new();
        for row in ledgers {
            let ledger = Ledger::try_from(row)?;
            by_transaction.entry(ledger.transaction_id).or_default().push(ledger);
        }

        transactions
            .into_iter()
            .map(|row| {
                let transaction = Transaction::try_from(row)?;
                let ledgers = by_transaction.remove(&transaction.id).unwrap_or_default();
                Ok(TransactionLedgers { transaction, ledgers })
            })
            .collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_distinguishes_missing_and_duplicate_rows() {
        assert!(matches!(exactly_one(Vec::<i64>::new(), "user"), Err(StoreError::NotFound("user"))));
        assert_eq!(exactly_one(vec![4], "user").unwrap(), 4);
        assert!(matches!(exactly_one(vec![1, 2], "user"), Err(StoreError::TooManyRows)));
    }

    #[test]
    fn transaction_row_with_unknown_status_is_corrupt() {
        let row = TransactionRow {
            id: 1,
            requestor_id: 1,
            nonce: 1,
            status: "settled".into(),
            operation: "deposit".into(),
            metadata: Json(TransactionMetadata {
                source_wallet_id: 1,
                destination_wallet_id: None,
                amount: Decimal::ONE,
            }),
            created_at: Utc::now(),
        };
        assert!(matches!(Transaction::try_from(row), Err(StoreError::Corrupt(_))));
    }
}
