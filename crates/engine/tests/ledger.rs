use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    CacheRefresh, CreateExpenseCmd, Engine, EngineError, ExpenseKind, MemberStatus, MoneyCents,
    SettleBalanceCmd, SettlementInstruction, SplitPolicy,
};
use migration::MigratorTrait;

async fn engine_with_db(mode: CacheRefresh) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .cache_refresh(mode)
        .build()
        .await
        .unwrap();
    for user in ["alice", "bob", "carol", "dave"] {
        engine.create_user(user, None).await.unwrap();
    }
    (engine, db)
}

/// Group administered by alice where every user in `members` has joined.
async fn group_with(engine: &Engine, members: &[&str]) -> String {
    let group = engine.create_group("Trip", "alice").await.unwrap();
    let group_id = group.id.to_string();
    for member in members {
        engine
            .invite_member(&group_id, member, "alice")
            .await
            .unwrap();
        engine.accept_invitation(&group_id, member).await.unwrap();
    }
    group_id
}

fn cents(value: i64) -> MoneyCents {
    MoneyCents::new(value)
}

fn equal_expense(group_id: &str, payer: &str, amount: i64, participants: &[&str]) -> CreateExpenseCmd {
    CreateExpenseCmd::new(group_id, payer, cents(amount), "expense", Utc::now())
        .participants(participants.iter().copied())
}

fn nets(balances: &[engine::Balance]) -> Vec<(String, i64)> {
    balances
        .iter()
        .map(|b| (b.user_id.clone(), b.net.cents()))
        .collect()
}

#[tokio::test]
async fn equal_split_balances_and_settlement() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob", "carol"]).await;

    let expense = engine
        .create_expense(equal_expense(&group_id, "alice", 90_00, &["alice", "bob", "carol"]))
        .await
        .unwrap();
    let splits: Vec<(String, i64, bool)> = expense
        .splits
        .iter()
        .map(|s| (s.user_id.clone(), s.amount.cents(), s.settled))
        .collect();
    assert_eq!(
        splits,
        vec![
            ("alice".to_string(), 30_00, true),
            ("bob".to_string(), 30_00, false),
            ("carol".to_string(), 30_00, false),
        ]
    );

    let balances = engine.get_balances(&group_id, "bob").await.unwrap();
    assert_eq!(
        nets(&balances),
        vec![
            ("alice".to_string(), 60_00),
            ("bob".to_string(), -30_00),
            ("carol".to_string(), -30_00),
        ]
    );
    assert_eq!(balances[1].pending_payments, 1);

    let plan = engine.get_simplified_debts(&group_id, "carol").await.unwrap();
    assert_eq!(
        plan,
        vec![
            SettlementInstruction {
                from: "bob".to_string(),
                to: "alice".to_string(),
                amount: cents(30_00),
            },
            SettlementInstruction {
                from: "carol".to_string(),
                to: "alice".to_string(),
                amount: cents(30_00),
            },
        ]
    );

    let expense_id = expense.id.to_string();
    assert!(engine.settle_split(&expense_id, "bob", "bob").await.unwrap());
    let balances = engine.get_balances(&group_id, "alice").await.unwrap();
    assert_eq!(
        nets(&balances),
        vec![
            ("alice".to_string(), 30_00),
            ("bob".to_string(), 0),
            ("carol".to_string(), -30_00),
        ]
    );

    // Settling again changes nothing.
    assert!(!engine.settle_split(&expense_id, "bob", "alice").await.unwrap());
    assert_eq!(engine.get_balances(&group_id, "alice").await.unwrap(), balances);

    let cached = engine
        .cached_simplified_debts(&group_id, "alice")
        .await
        .unwrap();
    assert_eq!(
        cached,
        Some(engine.get_simplified_debts(&group_id, "alice").await.unwrap())
    );
}

#[tokio::test]
async fn reads_are_idempotent() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob", "carol"]).await;
    engine
        .create_expense(equal_expense(&group_id, "bob", 100_00, &["alice", "bob", "carol"]))
        .await
        .unwrap();
    engine
        .create_expense(equal_expense(&group_id, "carol", 10_01, &["alice", "carol"]))
        .await
        .unwrap();

    let first = engine.get_balances(&group_id, "alice").await.unwrap();
    let second = engine.get_balances(&group_id, "alice").await.unwrap();
    assert_eq!(first, second);
    let total: i64 = first.iter().map(|b| b.net.cents()).sum();
    assert_eq!(total, 0);

    assert_eq!(
        engine.get_simplified_debts(&group_id, "bob").await.unwrap(),
        engine.get_simplified_debts(&group_id, "bob").await.unwrap()
    );
}

#[tokio::test]
async fn leftover_cents_go_to_first_participant() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob", "carol"]).await;
    let expense = engine
        .create_expense(equal_expense(&group_id, "carol", 100_00, &["carol", "bob", "alice"]))
        .await
        .unwrap();

    let amounts: Vec<i64> = expense.splits.iter().map(|s| s.amount.cents()).collect();
    assert_eq!(amounts, vec![33_34, 33_33, 33_33]);
}

#[tokio::test]
async fn unequal_split_is_validated_before_anything_is_stored() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob"]).await;

    let bad = SplitPolicy::Unequal(BTreeMap::from([
        ("alice".to_string(), cents(40_00)),
        ("bob".to_string(), cents(50_00)),
    ]));
    let err = engine
        .create_expense(equal_expense(&group_id, "alice", 100_00, &["alice", "bob"]).policy(bad))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(
        engine
            .list_expenses(&group_id, "alice", true)
            .await
            .unwrap()
            .is_empty()
    );

    let good = SplitPolicy::Unequal(BTreeMap::from([
        ("alice".to_string(), cents(25_00)),
        ("bob".to_string(), cents(75_00)),
    ]));
    engine
        .create_expense(
            equal_expense(&group_id, "alice", 100_00, &["alice", "bob"])
                .policy(good)
                .category("food"),
        )
        .await
        .unwrap();
    let balances = engine.get_balances(&group_id, "bob").await.unwrap();
    assert_eq!(
        nets(&balances),
        vec![("alice".to_string(), 75_00), ("bob".to_string(), -75_00)]
    );
    let group = engine.group(&group_id, "bob").await.unwrap();
    assert_eq!(group.total_expenses, cents(100_00));
}

#[tokio::test]
async fn membership_rules() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob"]).await;

    assert!(matches!(
        engine.invite_member(&group_id, "carol", "bob").await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        engine.invite_member(&group_id, "bob", "alice").await,
        Err(EngineError::ExistingKey(_))
    ));
    assert!(matches!(
        engine.invite_member(&group_id, "nobody", "alice").await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.create_user("alice", None).await,
        Err(EngineError::ExistingKey(_))
    ));

    let invited = engine
        .invite_member(&group_id, "dave", "alice")
        .await
        .unwrap();
    assert_eq!(invited.status, MemberStatus::Pending);

    // Pending members neither read nor take part in expenses.
    assert!(matches!(
        engine.get_balances(&group_id, "dave").await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        engine
            .create_expense(equal_expense(&group_id, "alice", 10_00, &["alice", "dave"]))
            .await,
        Err(EngineError::Validation(_))
    ));

    let joined = engine.accept_invitation(&group_id, "dave").await.unwrap();
    assert_eq!(joined.status, MemberStatus::Active);
    let members: Vec<String> = engine
        .list_members(&group_id, "dave")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    assert_eq!(members, vec!["alice", "bob", "dave"]);

    let groups = engine.list_groups("dave").await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].1, MemberStatus::Active);
}

#[tokio::test]
async fn only_parties_may_settle_a_split() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob", "carol"]).await;
    let expense = engine
        .create_expense(equal_expense(&group_id, "alice", 60_00, &["alice", "bob", "carol"]))
        .await
        .unwrap();
    let expense_id = expense.id.to_string();

    assert!(matches!(
        engine.settle_split(&expense_id, "bob", "carol").await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        engine.settle_split(&expense_id, "dave", "alice").await,
        Err(EngineError::NotFound(_))
    ));
    // The payer may confirm a debtor's payment.
    assert!(engine.settle_split(&expense_id, "bob", "alice").await.unwrap());

    let stored = engine.expense(&expense_id, "carol").await.unwrap();
    assert!(stored.split_for("bob").unwrap().settled);
    assert!(!stored.split_for("carol").unwrap().settled);
}

#[tokio::test]
async fn partial_split_payments() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob"]).await;
    let expense = engine
        .create_expense(equal_expense(&group_id, "alice", 50_00, &["alice", "bob"]))
        .await
        .unwrap();
    let expense_id = expense.id.to_string();

    let split = engine
        .record_split_payment(&expense_id, "bob", cents(10_00), "bob")
        .await
        .unwrap();
    assert_eq!(split.amount_paid, cents(10_00));
    assert!(!split.settled);
    assert!(matches!(
        engine
            .record_split_payment(&expense_id, "bob", cents(20_00), "bob")
            .await,
        Err(EngineError::Validation(_))
    ));

    let balances = engine.get_balances(&group_id, "bob").await.unwrap();
    assert_eq!(
        nets(&balances),
        vec![("alice".to_string(), 15_00), ("bob".to_string(), -15_00)]
    );

    let split = engine
        .record_split_payment(&expense_id, "bob", cents(15_00), "alice")
        .await
        .unwrap();
    assert!(split.settled);
}

#[tokio::test]
async fn settle_balance_covers_oldest_splits_first() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob"]).await;

    let older = engine
        .create_expense(
            CreateExpenseCmd::new(
                &group_id,
                "alice",
                cents(30_00),
                "hotel",
                Utc::now() - Duration::days(2),
            )
            .participants(["alice", "bob"]),
        )
        .await
        .unwrap();
    let newer = engine
        .create_expense(
            CreateExpenseCmd::new(
                &group_id,
                "alice",
                cents(40_00),
                "dinner",
                Utc::now() - Duration::days(1),
            )
            .participants(["alice", "bob"]),
        )
        .await
        .unwrap();

    let outcome = engine
        .settle_balance(SettleBalanceCmd::new(
            &group_id,
            "bob",
            "alice",
            cents(25_00),
            "bob",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.settled_splits, vec![older.split_for("bob").unwrap().id]);
    assert_eq!(outcome.partially_paid, Some(newer.split_for("bob").unwrap().id));
    assert_eq!(outcome.applied_to_splits, cents(25_00));
    assert_eq!(outcome.settlement_record, None);

    let balances = engine.get_balances(&group_id, "alice").await.unwrap();
    assert_eq!(
        nets(&balances),
        vec![("alice".to_string(), 10_00), ("bob".to_string(), -10_00)]
    );

    // Paying more than owed: the excess is kept as a settlement record.
    let outcome = engine
        .settle_balance(SettleBalanceCmd::new(
            &group_id,
            "bob",
            "alice",
            cents(30_00),
            "alice",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.applied_to_splits, cents(10_00));
    assert!(outcome.settlement_record.is_some());

    let balances = engine.get_balances(&group_id, "alice").await.unwrap();
    assert!(balances.iter().all(|b| b.net.is_zero()));

    let regular = engine.list_expenses(&group_id, "bob", false).await.unwrap();
    assert_eq!(regular.len(), 2);
    assert_eq!(regular[0].id, newer.id);
    let all = engine.list_expenses(&group_id, "bob", true).await.unwrap();
    assert_eq!(all.len(), 3);
    let record = all
        .iter()
        .find(|e| e.kind == ExpenseKind::Settlement)
        .unwrap();
    assert_eq!(record.amount, cents(20_00));
    assert_eq!(record.paid_by, "bob");
    assert!(record.splits.iter().all(|s| s.settled));

    let group = engine.group(&group_id, "bob").await.unwrap();
    assert_eq!(group.total_expenses, cents(70_00));
}

#[tokio::test]
async fn settle_balance_without_debt_records_a_transfer() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob", "carol"]).await;
    engine
        .create_expense(equal_expense(&group_id, "alice", 20_00, &["alice", "bob"]))
        .await
        .unwrap();
    let before = engine.get_balances(&group_id, "carol").await.unwrap();

    let outcome = engine
        .settle_balance(SettleBalanceCmd::new(
            &group_id,
            "carol",
            "bob",
            cents(5_00),
            "carol",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert!(outcome.settled_splits.is_empty());
    assert_eq!(outcome.applied_to_splits, MoneyCents::ZERO);
    assert!(outcome.settlement_record.is_some());
    assert_eq!(engine.get_balances(&group_id, "carol").await.unwrap(), before);

    // Only the two parties may record their settlement.
    assert!(matches!(
        engine
            .settle_balance(SettleBalanceCmd::new(
                &group_id,
                "bob",
                "alice",
                cents(5_00),
                "carol",
                Utc::now(),
            ))
            .await,
        Err(EngineError::Forbidden(_))
    ));
    let outcome = engine
        .settle_balance(SettleBalanceCmd::new(
            &group_id,
            "bob",
            "alice",
            cents(1_00),
            " bob ",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.applied_to_splits, cents(1_00));
    assert!(outcome.partially_paid.is_some());
    assert!(matches!(
        engine
            .settle_balance(SettleBalanceCmd::new(
                &group_id,
                "bob",
                "bob",
                cents(5_00),
                "bob",
                Utc::now(),
            ))
            .await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn failed_expense_rolls_back_every_write() {
    let (engine, _db) = engine_with_db(CacheRefresh::Inline).await;
    let group_id = group_with(&engine, &["bob"]).await;
    let huge = cents(i64::MAX - 10);
    engine
        .create_expense(equal_expense(&group_id, "alice", huge.cents(), &["alice"]))
        .await
        .unwrap();

    // The rows are inserted before the group total overflows.
    let err = engine
        .create_expense(equal_expense(&group_id, "bob", 1_00, &["alice", "bob"]))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Validation("amount too large".to_string()));

    let expenses = engine.list_expenses(&group_id, "alice", true).await.unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, huge);
    let group = engine.group(&group_id, "alice").await.unwrap();
    assert_eq!(group.total_expenses, huge);
    assert!(
        nets(&engine.get_balances(&group_id, "bob").await.unwrap())
            .iter()
            .all(|(_, net)| *net == 0)
    );
}

#[tokio::test]
async fn malformed_and_unknown_ids() {
    let (engine, db) = engine_with_db(CacheRefresh::Inline).await;

    assert_eq!(
        engine.get_balances("not-a-uuid", "alice").await.unwrap_err(),
        EngineError::Validation("invalid group id".to_string())
    );
    assert!(matches!(
        engine.settle_split("xyz", "bob", "bob").await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine
            .get_balances("00000000-0000-0000-0000-000000000000", "alice")
            .await,
        Err(EngineError::NotFound(_))
    ));

    // A group row with no members behaves like any other unknown access.
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        r#"INSERT INTO "groups" (id, name, admin_id, total_expenses_minor, created_at) VALUES (?, ?, ?, ?, ?)"#,
        vec![
            "11111111-1111-1111-1111-111111111111".into(),
            "Orphan".into(),
            "alice".into(),
            0i64.into(),
            Utc::now().into(),
        ],
    ))
    .await
    .unwrap();
    assert!(matches!(
        engine
            .get_balances("11111111-1111-1111-1111-111111111111", "alice")
            .await,
        Err(EngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn background_refresh_fills_the_cache() {
    let (engine, _db) = engine_with_db(CacheRefresh::Background).await;
    let group_id = group_with(&engine, &["bob"]).await;
    engine
        .create_expense(equal_expense(&group_id, "alice", 10_00, &["alice", "bob"]))
        .await
        .unwrap();

    let expected = vec![SettlementInstruction {
        from: "bob".to_string(),
        to: "alice".to_string(),
        amount: cents(5_00),
    }];
    let mut cached = None;
    for _ in 0..50 {
        cached = engine
            .cached_simplified_debts(&group_id, "bob")
            .await
            .unwrap();
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(cached, Some(expected));
}
