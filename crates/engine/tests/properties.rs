use std::collections::BTreeMap;

use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use engine::{
    Expense, ExpenseKind, MoneyCents, SplitPolicy, compute_group_balances, compute_splits,
    simplify_debts,
};

const USERS: [&str; 6] = ["ada", "ben", "cleo", "dan", "eve", "finn"];

fn participants(mask: u8) -> Vec<String> {
    USERS
        .iter()
        .enumerate()
        .filter(|(idx, _)| mask & (1 << idx) != 0)
        .map(|(_, user)| user.to_string())
        .collect()
}

proptest! {
    #[test]
    fn equal_split_sums_to_amount(
        amount in 1i64..=10_000_000,
        mask in 1u8..64,
        payer_idx in 0usize..6,
    ) {
        let users = participants(mask);
        let splits = compute_splits(
            Uuid::new_v4(),
            MoneyCents::new(amount),
            &users,
            &SplitPolicy::Equal,
            USERS[payer_idx],
            Utc::now(),
        )
        .unwrap();

        let total: MoneyCents = splits.iter().map(|s| s.amount).sum();
        prop_assert_eq!(total, MoneyCents::new(amount));
        let max = splits.iter().map(|s| s.amount).max().unwrap();
        let min = splits.iter().map(|s| s.amount).min().unwrap();
        prop_assert!((max - min).cents() <= 1);
    }

    #[test]
    fn unequal_split_sums_to_amount(
        shares in prop::collection::vec(0i64..=50_000, 1..=6),
        drift in -1i64..=1,
    ) {
        let users: Vec<String> = USERS[..shares.len()].iter().map(ToString::to_string).collect();
        let explicit: BTreeMap<String, MoneyCents> = users
            .iter()
            .cloned()
            .zip(shares.iter().map(|s| MoneyCents::new(*s)))
            .collect();
        let amount = shares.iter().sum::<i64>() + drift;
        prop_assume!(amount > 0);

        match compute_splits(
            Uuid::new_v4(),
            MoneyCents::new(amount),
            &users,
            &SplitPolicy::Unequal(explicit),
            "ada",
            Utc::now(),
        ) {
            Ok(splits) => {
                let total: MoneyCents = splits.iter().map(|s| s.amount).sum();
                prop_assert_eq!(total, MoneyCents::new(amount));
                prop_assert!(splits.iter().all(|s| !s.amount.is_negative()));
            }
            // Only a residual that would push the first share below zero is refused.
            Err(err) => prop_assert_eq!(err.kind(), engine::ErrorKind::Validation),
        }
    }

    #[test]
    fn balances_sum_to_zero_and_plan_clears_them(
        amounts in prop::collection::vec(1i64..=100_000, 0..=20),
        masks in prop::collection::vec(1u8..64, 20),
        payers in prop::collection::vec(0usize..6, 20),
        settle_every in 2usize..5,
    ) {
        let mut expenses = Vec::with_capacity(amounts.len());
        for (idx, amount) in amounts.iter().enumerate() {
            let payer = USERS[payers[idx]];
            let mut expense = Expense::new(
                Uuid::nil(),
                format!("expense {idx}"),
                MoneyCents::new(*amount),
                payer.to_string(),
                Utc::now(),
                None,
                ExpenseKind::Regular,
                payer.to_string(),
            )
            .unwrap();
            expense.splits = compute_splits(
                expense.id,
                expense.amount,
                &participants(masks[idx]),
                &SplitPolicy::Equal,
                payer,
                Utc::now(),
            )
            .unwrap();
            if idx % settle_every == 0 {
                for split in &mut expense.splits {
                    split.settle(Utc::now());
                }
            }
            expenses.push(expense);
        }

        let members: Vec<String> = USERS.iter().map(ToString::to_string).collect();
        let balances = compute_group_balances(&expenses, &members).unwrap();
        prop_assert_eq!(balances.total_net(), MoneyCents::ZERO);

        let plan = simplify_debts(&balances).unwrap();
        prop_assert!(plan.len() < members.len().max(1));
        let mut remaining: BTreeMap<String, MoneyCents> = balances
            .balances
            .iter()
            .map(|(id, b)| (id.clone(), b.net))
            .collect();
        for instruction in &plan {
            prop_assert!(instruction.amount.is_positive());
            prop_assert_ne!(&instruction.from, &instruction.to);
            *remaining.get_mut(&instruction.from).unwrap() += instruction.amount;
            *remaining.get_mut(&instruction.to).unwrap() -= instruction.amount;
        }
        prop_assert!(remaining.values().all(|v| v.is_zero()));
    }
}
