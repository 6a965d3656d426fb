mod common;

use common::{dec, service, user_with_wallet};
use wallet_ledger::db::{EntryType, Operation, TransactionStatus};
use wallet_ledger::LedgerError;

#[tokio::test]
async fn wallets_of_unknown_user_are_not_found() {
    let service = service();
    let err = service.get_wallets("nobody").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("user")));
    assert_eq!(err.to_string(), "resource: user not found");
}

#[tokio::test]
async fn user_without_wallets_has_empty_list() {
    let service = service();
    service.create_user("alice").await.unwrap();

    let wallets = service.get_wallets("alice").await.unwrap();
    assert_eq!(wallets.user.username, "alice");
    assert!(wallets.wallets.is_empty());
    assert!(service.get_transactions("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn user_lists_every_owned_wallet() {
    let service = service();
    let sgd = user_with_wallet(&service, "alice", "SGD").await;
    let usd = service.create_wallet("alice", "usd").await.unwrap();
    assert_eq!(usd.currency.as_str(), "USD");
    user_with_wallet(&service, "bob", "SGD").await;

    let ids: Vec<i64> = service
        .get_wallets("alice")
        .await
        .unwrap()
        .wallets
        .iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&sgd.id) && ids.contains(&usd.id));
}

#[tokio::test]
async fn wallet_for_unknown_user_or_bad_currency_is_rejected() {
    let service = service();
    let err = service.create_wallet("ghost", "SGD").await.unwrap_err();
    assert_eq!(err.to_string(), "resource: user not found");

    service.create_user("alice").await.unwrap();
    let err = service.create_wallet("alice", "dollars").await.unwrap_err();
    assert_eq!(err.to_string(), "invalid_currency");
}

#[tokio::test]
async fn duplicate_username_is_a_unique_violation() {
    let service = service();
    let first = service.create_user("alice").await.unwrap();

    let err = service.create_user("alice").await.unwrap_err();
    assert!(matches!(err, LedgerError::UniqueViolation));
    assert_eq!(err.to_string(), "unique_violation");

    assert_eq!(service.user("alice").await.unwrap(), first);
}

#[tokio::test]
async fn history_is_newest_first() {
    let service = service();
    let wallet = user_with_wallet(&service, "alice", "SGD").await;

    service.deposit("alice", 1, wallet.id, dec("60.2")).await.unwrap();
    service.withdraw("alice", 2, wallet.id, dec("100")).await.unwrap_err();
    service.withdraw("alice", 3, wallet.id, dec("50.1")).await.unwrap();

    let history = service.get_transactions("alice").await.unwrap();
    let nonces: Vec<i64> = history.iter().map(|t| t.transaction.nonce).collect();
    assert_eq!(nonces, vec![3, 2, 1]);

    let ids: Vec<i64> = history.iter().map(|t| t.transaction.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);

    let ledger_counts: Vec<usize> = history.iter().map(|t| t.ledgers.len()).collect();
    assert_eq!(ledger_counts, vec![1, 0, 1]);
    assert!(history.iter().all(|t| t.transaction.status.is_terminal()));
}

#[tokio::test]
async fn recipient_sees_incoming_transfer_with_only_their_entry() {
    let service = service();
    let alice = user_with_wallet(&service, "alice", "SGD").await;
    let bob = user_with_wallet(&service, "bob", "SGD").await;
    service.deposit("alice", 1, alice.id, dec("40.123")).await.unwrap();
    let receipt = service.transfer("alice", 2, alice.id, bob.id, dec("40.123")).await.unwrap();

    let history = service.get_transactions("bob").await.unwrap();
    assert_eq!(history.len(), 1);
    let incoming = &history[0];
    assert_eq!(incoming.transaction.id, receipt.transaction.id);
    assert_eq!(incoming.transaction.operation, Operation::Transfer);
    assert_eq!(incoming.transaction.status, TransactionStatus::Success);
    assert_eq!(incoming.ledgers.len(), 1);
    assert_eq!(incoming.ledgers[0].wallet_id, bob.id);
    assert_eq!(incoming.ledgers[0].entry_type, EntryType::Credit);
    assert_eq!(incoming.ledgers[0].balance, dec("40.123"));

    let history = service.get_transactions("alice").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].ledgers.len(), 1);
    assert_eq!(history[0].ledgers[0].entry_type, EntryType::Debit);
    assert_eq!(history[0].ledgers[0].balance, dec("0"));
}

#[tokio::test]
async fn transfer_between_own_wallets_shows_both_entries() {
    let service = service();
    let main = user_with_wallet(&service, "alice", "SGD").await;
    let savings = service.create_wallet("alice", "SGD").await.unwrap();
    service.deposit("alice", 1, main.id, dec("10")).await.unwrap();
    service.transfer("alice", 2, main.id, savings.id, dec("4")).await.unwrap();

    let history = service.get_transactions("alice").await.unwrap();
    let transfer = &history[0];
    assert_eq!(transfer.ledgers.len(), 2);
    let debit = transfer.ledgers.iter().find(|l| l.entry_type == EntryType::Debit).unwrap();
    let credit = transfer.ledgers.iter().find(|l| l.entry_type == EntryType::Credit).unwrap();
    assert_eq!((debit.wallet_id, debit.balance), (main.id, dec("6")));
    assert_eq!((credit.wallet_id, credit.balance), (savings.id, dec("4")));
}
