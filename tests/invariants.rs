mod common;

use std::collections::HashMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use wallet_ledger::db::{EntryType, Operation, TransactionStatus};

use common::{service, user_with_wallet, Service};

#[derive(Debug, Clone)]
enum Step {
    Deposit { wallet: usize, cents: i64 },
    Withdraw { wallet: usize, cents: i64 },
    Transfer { from: usize, to: usize, cents: i64 },
}

fn step() -> impl Strategy<Value = Step> {
    let cents = 1i64..5_000;
    prop_oneof![
        (0usize..3, cents.clone()).prop_map(|(wallet, cents)| Step::Deposit { wallet, cents }),
        (0usize..3, cents.clone()).prop_map(|(wallet, cents)| Step::Withdraw { wallet, cents }),
        (0usize..3, 1usize..3, cents).prop_map(|(from, offset, cents)| Step::Transfer {
            from,
            to: (from + offset) % 3,
            cents,
        }),
    ]
}

async fn apply(service: &Service, wallets: &[i64], nonce: i64, step: &Step) {
    // failures are part of the scenario; the invariants are checked afterwards
    let _ = match *step {
        Step::Deposit { wallet, cents } => service
            .deposit("alice", nonce, wallets[wallet], Decimal::new(cents, 2))
            .await
            .map(|_| ()),
        Step::Withdraw { wallet, cents } => service
            .withdraw("alice", nonce, wallets[wallet], Decimal::new(cents, 2))
            .await
            .map(|_| ()),
        Step::Transfer { from, to, cents } => service
            .transfer("alice", nonce, wallets[from], wallets[to], Decimal::new(cents, 2))
            .await
            .map(|_| ()),
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn balances_match_ledger_sums(steps in prop::collection::vec(step(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let service = service();
            let mut wallets = vec![user_with_wallet(&service, "alice", "SGD").await.id];
            for _ in 0..2 {
                wallets.push(service.create_wallet("alice", "SGD").await.unwrap().id);
            }

            for (nonce, step) in steps.iter().enumerate() {
                apply(&service, &wallets, nonce as i64 + 1, step).await;
            }

            let history = service.get_transactions("alice").await.unwrap();
            assert_eq!(history.len(), steps.len());

            let mut sums: HashMap<i64, Decimal> = HashMap::new();
            for entry in history.iter().rev() {
                let expected_ledgers = match (entry.transaction.status, entry.transaction.operation) {
                    (TransactionStatus::Success, Operation::Transfer) => 2,
                    (TransactionStatus::Success, _) => 1,
                    (TransactionStatus::Error(_), _) => 0,
                    (TransactionStatus::Pending, _) => panic!("transaction {} left pending", entry.transaction.id),
                };
                assert_eq!(entry.ledgers.len(), expected_ledgers);

                for ledger in &entry.ledgers {
                    assert_eq!(ledger.amount, entry.transaction.metadata.amount);
                    let sum = sums.entry(ledger.wallet_id).or_default();
                    *sum = match ledger.entry_type {
                        EntryType::Credit => *sum + ledger.amount,
                        EntryType::Debit => *sum - ledger.amount,
                    };
                    assert_eq!(ledger.balance, *sum);
                }
            }

            for wallet in service.get_wallets("alice").await.unwrap().wallets {
                let expected = sums.get(&wallet.id).copied().unwrap_or_default();
                assert_eq!(wallet.balance, expected);
                assert!(wallet.balance >= Decimal::ZERO);
            }
        });
    }
}
