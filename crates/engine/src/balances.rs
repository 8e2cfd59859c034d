//! Balance aggregation.
//!
//! Folds a group's expenses into per-member [`Balance`]s and pairwise debts.
//! Balances are never stored: they are a pure function of the expense/split
//! ledger, so the fold can be re-run at any time with identical results.
//!
//! Only the outstanding part of unsettled splits counts. For every such
//! split the debtor's `owed` and the payer's `paid` grow by the same amount,
//! which keeps the sum of all `net` values at zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EngineError, Expense, MoneyCents, ResultEngine};

/// Derived per-member aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: String,
    /// Outstanding amount others still owe this member for expenses they paid.
    pub paid: MoneyCents,
    /// Outstanding amount this member still owes others.
    pub owed: MoneyCents,
    /// `paid - owed`; positive means the member is owed money.
    pub net: MoneyCents,
    /// Number of unsettled splits in which this member is the debtor.
    pub pending_payments: u32,
}

impl Balance {
    pub fn zero(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            paid: MoneyCents::ZERO,
            owed: MoneyCents::ZERO,
            net: MoneyCents::ZERO,
            pending_payments: 0,
        }
    }
}

/// Net amount `debtor` owes `creditor` after netting both directions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseDebt {
    pub debtor: String,
    pub creditor: String,
    pub amount: MoneyCents,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBalances {
    pub balances: BTreeMap<String, Balance>,
    /// Ordered by `(debtor, creditor)`.
    pub pairwise: Vec<PairwiseDebt>,
}

impl GroupBalances {
    pub fn net_of(&self, user_id: &str) -> MoneyCents {
        self.balances
            .get(user_id)
            .map_or(MoneyCents::ZERO, |b| b.net)
    }

    /// Sum of every member's net; zero for a consistent ledger.
    pub fn total_net(&self) -> MoneyCents {
        self.balances.values().map(|b| b.net).sum()
    }
}

/// Computes balances and pairwise debts for a group.
///
/// Every entry of `members` gets a balance row even if it never appears in
/// the ledger. Users who appear in the ledger but are no longer members get
/// a row as well, so money is never dropped.
pub fn compute_group_balances(
    expenses: &[Expense],
    members: &[String],
) -> ResultEngine<GroupBalances> {
    let mut balances: BTreeMap<String, Balance> = members
        .iter()
        .map(|user_id| (user_id.clone(), Balance::zero(user_id.as_str())))
        .collect();
    // Key `(low, high)` by user id; value is what `high` owes `low`.
    let mut pairs: BTreeMap<(String, String), MoneyCents> = BTreeMap::new();

    for expense in expenses {
        if expense.is_settlement() {
            if let Some(split) = expense.splits.iter().find(|s| !s.settled) {
                tracing::error!(
                    expense_id = %expense.id,
                    user_id = %split.user_id,
                    "settlement record carries an unsettled split"
                );
                return Err(EngineError::Consistency(format!(
                    "settlement record {} has an unsettled split",
                    expense.id
                )));
            }
            continue;
        }

        for split in &expense.splits {
            if split.user_id == expense.paid_by {
                continue;
            }
            let outstanding = split.outstanding();
            if outstanding.is_zero() {
                continue;
            }
            if outstanding.is_negative() {
                return Err(EngineError::Consistency(format!(
                    "split {} has paid more than its share",
                    split.id
                )));
            }

            let debtor = balances
                .entry(split.user_id.clone())
                .or_insert_with(|| Balance::zero(split.user_id.as_str()));
            debtor.owed += outstanding;
            debtor.net -= outstanding;
            debtor.pending_payments += 1;

            let creditor = balances
                .entry(expense.paid_by.clone())
                .or_insert_with(|| Balance::zero(expense.paid_by.as_str()));
            creditor.paid += outstanding;
            creditor.net += outstanding;

            if expense.paid_by < split.user_id {
                *pairs
                    .entry((expense.paid_by.clone(), split.user_id.clone()))
                    .or_default() += outstanding;
            } else {
                *pairs
                    .entry((split.user_id.clone(), expense.paid_by.clone()))
                    .or_default() -= outstanding;
            }
        }
    }

    let mut pairwise: Vec<PairwiseDebt> = pairs
        .into_iter()
        .filter(|(_, amount)| amount.abs() >= MoneyCents::CENT)
        .map(|((low, high), amount)| {
            if amount.is_positive() {
                PairwiseDebt {
                    debtor: high,
                    creditor: low,
                    amount,
                }
            } else {
                PairwiseDebt {
                    debtor: low,
                    creditor: high,
                    amount: -amount,
                }
            }
        })
        .collect();
    pairwise.sort_by(|a, b| (&a.debtor, &a.creditor).cmp(&(&b.debtor, &b.creditor)));

    let out = GroupBalances { balances, pairwise };
    let total = out.total_net();
    if !total.is_zero() {
        tracing::error!("group balances do not conserve money: total net {total}");
        return Err(EngineError::Consistency(format!(
            "total net balance is {total}, expected 0.00"
        )));
    }

    tracing::debug!(
        members = out.balances.len(),
        pairs = out.pairwise.len(),
        "computed group balances"
    );
    Ok(out)
}
