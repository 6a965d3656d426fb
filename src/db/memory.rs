//! In-process storage backend.
//!
//! Mirrors the PostgreSQL backend closely enough to run the ledger against:
//! writes are staged per unit of work and published atomically on commit,
//! `wallet_for_update` takes an exclusive per-wallet lock held until the unit
//! of work ends, repeatable-read units of work read from a snapshot taken at
//! begin, and the balance check and username unique key surface as the same
//! constraint violations.
//!
//! Committed tables sit behind an `Arc`; a snapshot is a pointer copy and a
//! commit copies the tables only while some snapshot still shares them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;

use super::error::{StoreError, USERNAME_UNIQUE_KEY, WALLET_BALANCE_CHECK};
use super::models::*;
use super::utils::Isolation;
use super::{Store, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    usernames: HashMap<String, i64>,
    wallets: BTreeMap<i64, Wallet>,
    transactions: BTreeMap<i64, Transaction>,
    ledgers: BTreeMap<i64, Ledger>,
}

/// A staged row write. Updates carry the whole row.
#[derive(Debug, Clone)]
enum Write {
    User(User),
    Wallet(Wallet),
    Transaction(Transaction),
    Ledger(Ledger),
}

impl Tables {
    fn apply(&mut self, write: &Write) {
        match write {
            Write::User(user) => {
                self.usernames.insert(user.username.clone(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Write::Wallet(wallet) => {
                self.wallets.insert(wallet.id, wallet.clone());
            }
            Write::Transaction(transaction) => {
                self.transactions.insert(transaction.id, transaction.clone());
            }
            Write::Ledger(ledger) => {
                self.ledgers.insert(ledger.id, ledger.clone());
            }
        }
    }

    fn username_taken(&self, username: &str, except_id: i64) -> bool {
        self.usernames.get(username).is_some_and(|id| *id != except_id)
    }
}

#[derive(Debug, Default)]
struct Sequences {
    users: AtomicI64,
    wallets: AtomicI64,
    transactions: AtomicI64,
    ledgers: AtomicI64,
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Arc<Tables>>,
    row_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
    sequences: Sequences,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    snapshot: Option<Arc<Tables>>,
    writes: Vec<Write>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self, isolation: Isolation) -> Result<MemoryTx, StoreError> {
        let snapshot = match isolation {
            Isolation::RepeatableRead => Some(self.inner.tables.lock().clone()),
            Isolation::ReadCommitted => None,
        };
        Ok(MemoryTx {
            inner: self.inner.clone(),
            snapshot,
            writes: Vec::new(),
            locks: HashMap::new(),
        })
    }
}

impl MemoryTx {
    /// Committed state this unit of work reads from: its snapshot, or the latest commit.
    fn base(&self) -> Arc<Tables> {
        match &self.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => self.inner.tables.lock().clone(),
        }
    }

    fn staged_users(&self) -> impl Iterator<Item = &User> + '_ {
        self.writes.iter().filter_map(|write| match write {
            Write::User(user) => Some(user),
            _ => None,
        })
    }

    fn staged_wallets(&self) -> impl DoubleEndedIterator<Item = &Wallet> + '_ {
        self.writes.iter().filter_map(|write| match write {
            Write::Wallet(wallet) => Some(wallet),
            _ => None,
        })
    }

    fn staged_transactions(&self) -> impl DoubleEndedIterator<Item = &Transaction> + '_ {
        self.writes.iter().filter_map(|write| match write {
            Write::Transaction(transaction) => Some(transaction),
            _ => None,
        })
    }

    fn staged_ledgers(&self) -> impl Iterator<Item = &Ledger> + '_ {
        self.writes.iter().filter_map(|write| match write {
            Write::Ledger(ledger) => Some(ledger),
            _ => None,
        })
    }

    fn user(&self, user_id: i64) -> Option<User> {
        match self.staged_users().find(|u| u.id == user_id) {
            Some(user) => Some(user.clone()),
            None => self.base().users.get(&user_id).cloned(),
        }
    }

    fn wallet(&self, wallet_id: i64) -> Option<Wallet> {
        match self.staged_wallets().rev().find(|w| w.id == wallet_id) {
            Some(wallet) => Some(wallet.clone()),
            None => self.base().wallets.get(&wallet_id).cloned(),
        }
    }

    fn transaction(&self, transaction_id: i64) -> Option<Transaction> {
        match self.staged_transactions().rev().find(|t| t.id == transaction_id) {
            Some(transaction) => Some(transaction.clone()),
            None => self.base().transactions.get(&transaction_id).cloned(),
        }
    }

    fn publish(&self) -> Result<(), StoreError> {
        let mut committed = self.inner.tables.lock();
        for user in self.staged_users() {
            if committed.username_taken(&user.username, user.id) {
                return Err(StoreError::UniqueViolation { constraint: USERNAME_UNIQUE_KEY.to_string() });
            }
        }
        let tables = Arc::make_mut(&mut committed);
        for write in &self.writes {
            tables.apply(write);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError> {
        let staged = self.staged_users().any(|u| u.username == username);
        if staged || self.base().username_taken(username, 0) {
            return Err(StoreError::UniqueViolation { constraint: USERNAME_UNIQUE_KEY.to_string() });
        }
        let user = User {
            id: next_id(&self.inner.sequences.users),
            username: username.to_string(),
        };
        self.writes.push(Write::User(user.clone()));
        Ok(user)
    }

    async fn user_by_username(&mut self, username: &str) -> Result<User, StoreError> {
        if let Some(user) = self.staged_users().find(|u| u.username == username) {
            return Ok(user.clone());
        }
        let base = self.base();
        base.usernames
            .get(username)
            .and_then(|id| base.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn insert_wallet(&mut self, owner_id: i64, currency: &Currency) -> Result<Wallet, StoreError> {
        if self.user(owner_id).is_none() {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "wallets_user_account_id_fkey".to_string(),
            });
        }
        let wallet = Wallet {
            id: next_id(&self.inner.sequences.wallets),
            user_account_id: owner_id,
            currency: currency.clone(),
            balance: Decimal::ZERO,
        };
        self.writes.push(Write::Wallet(wallet.clone()));
        Ok(wallet)
    }

    async fn wallet_by_id(&mut self, wallet_id: i64) -> Result<Wallet, StoreError> {
        self.wallet(wallet_id).ok_or(StoreError::NotFound("wallet"))
    }

    async fn wallets_by_owner(&mut self, owner_id: i64) -> Result<Vec<Wallet>, StoreError> {
        let mut wallets: BTreeMap<i64, Wallet> = self
            .base()
            .wallets
            .values()
            .filter(|w| w.user_account_id == owner_id)
            .map(|w| (w.id, w.clone()))
            .collect();
        for wallet in self.staged_wallets().filter(|w| w.user_account_id == owner_id) {
            wallets.insert(wallet.id, wallet.clone());
        }
        Ok(wallets.into_values().collect())
    }

    async fn wallet_for_update(&mut self, wallet_id: i64) -> Result<UserWallet, StoreError> {
        if !self.locks.contains_key(&wallet_id) {
            // wallets are never deleted, so one seen here still exists once locked
            if self.wallet(wallet_id).is_none() {
                return Err(StoreError::NotFound("wallet"));
            }
            let row_lock = self.inner.row_locks.entry(wallet_id).or_default().clone();
            let guard = row_lock.lock_owned().await;
            self.locks.insert(wallet_id, guard);
        }

        let wallet = self.wallet(wallet_id).ok_or(StoreError::NotFound("wallet"))?;
        let user = self.user(wallet.user_account_id).ok_or(StoreError::NotFound("wallet"))?;
        Ok(UserWallet { user, wallet })
    }

    async fn update_balance(&mut self, wallet_id: i64, balance: Decimal) -> Result<(), StoreError> {
        let mut wallet = self.wallet(wallet_id).ok_or(StoreError::NotFound("wallet"))?;
        if balance < Decimal::ZERO {
            return Err(StoreError::CheckViolation { constraint: WALLET_BALANCE_CHECK.to_string() });
        }
        wallet.balance = balance;
        self.writes.push(Write::Wallet(wallet));
        Ok(())
    }

    async fn insert_transaction(&mut self, new: &NewTransaction) -> Result<Transaction, StoreError> {
        if self.user(new.requestor_id).is_none() {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "transactions_requestor_id_fkey".to_string(),
            });
        }
        let transaction = Transaction {
            id: next_id(&self.inner.sequences.transactions),
            requestor_id: new.requestor_id,
            nonce: new.nonce,
            operation: new.operation,
            status: TransactionStatus::Pending,
            metadata: new.metadata.clone(),
            created_at: Utc::now(),
        };
        self.writes.push(Write::Transaction(transaction.clone()));
        Ok(transaction)
    }

    async fn set_transaction_status(
        &mut self,
        transaction_id: i64,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let mut transaction = self
            .transaction(transaction_id)
            .ok_or(StoreError::NotFound("transaction"))?;
        transaction.status = status;
        self.writes.push(Write::Transaction(transaction.clone()));
        Ok(transaction)
    }

    async fn append_ledger(&mut self, new: &NewLedger) -> Result<Ledger, StoreError> {
        if self.wallet(new.wallet_id).is_none() {
            return Err(StoreError::ForeignKeyViolation { constraint: "ledgers_wallet_id_fkey".to_string() });
        }
        if self.transaction(new.transaction_id).is_none() {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "ledgers_transaction_id_fkey".to_string(),
            });
        }
        if new.amount <= Decimal::ZERO {
            return Err(StoreError::CheckViolation { constraint: "ledgers_amount_check".to_string() });
        }
        let ledger = Ledger {
            id: next_id(&self.inner.sequences.ledgers),
            wallet_id: new.wallet_id,
            transaction_id: new.transaction_id,
            entry_type: new.entry_type,
            amount: new.amount,
            balance: new.balance,
            created_at: Utc::now(),
        };
        self.writes.push(Write::Ledger(ledger.clone()));
        Ok(ledger)
    }

    async fn transaction_ledgers_for_user(&mut self, user_id: i64) -> Result<Vec<TransactionLedgers>, StoreError> {
        let base = self.base();
        let own_wallets: HashSet<i64> = base
            .wallets
            .values()
            .chain(self.staged_wallets())
            .filter(|w| w.user_account_id == user_id)
            .map(|w| w.id)
            .collect();

        let mut by_transaction: HashMap<i64, Vec<Ledger>> = HashMap::new();
        for ledger in base
            .ledgers
            .values()
            .chain(self.staged_ledgers())
            .filter(|l| own_wallets.contains(&l.wallet_id))
        {
            by_transaction.entry(ledger.transaction_id).or_default().push(ledger.clone());
        }

        let mut visible: BTreeMap<i64, Transaction> = BTreeMap::new();
        for transaction in base.transactions.values().chain(self.staged_transactions()) {
            if transaction.requestor_id == user_id || by_transaction.contains_key(&transaction.id) {
                visible.insert(transaction.id, transaction.clone());
            }
        }
        let mut transactions: Vec<Transaction> = visible.into_values().collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(transactions
            .into_iter()
            .map(|transaction| {
                let ledgers = by_transaction.remove(&transaction.id).unwrap_or_default();
                TransactionLedgers { transaction, ledgers }
            })
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        // row locks are released when `self` drops, after publishing
        self.publish()
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
