//! Split calculation.
//!
//! Turns an expense amount, its participants and a [`SplitPolicy`] into the
//! per-participant [`Split`]s. The calculation is pure: persisting the
//! result is the caller's job.
//!
//! Shares are always returned in ascending user-id order and always add up
//! to the expense amount exactly. Residual cents (from an equal division or
//! from a tolerated mismatch in explicit amounts) are assigned to the first
//! participants in that order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, Split};

/// How an expense amount is shared among its participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "amounts", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Divide evenly; leftover cents go to the first participants by id.
    Equal,
    /// Caller-provided share for every participant.
    Unequal(BTreeMap<String, MoneyCents>),
}

/// Computes the splits of an expense.
///
/// The payer's own split (if the payer participates) is created settled.
pub fn compute_splits(
    expense_id: Uuid,
    amount: MoneyCents,
    participants: &[String],
    policy: &SplitPolicy,
    payer: &str,
    at: DateTime<Utc>,
) -> ResultEngine<Vec<Split>> {
    if !amount.is_positive() {
        return Err(EngineError::Validation(
            "expense amount must be > 0".to_string(),
        ));
    }
    let ordered = ordered_participants(participants)?;

    let shares = match policy {
        SplitPolicy::Equal => equal_shares(amount, &ordered),
        SplitPolicy::Unequal(explicit) => unequal_shares(amount, &ordered, explicit)?,
    };

    let total: MoneyCents = shares.iter().map(|(_, share)| *share).sum();
    if total != amount {
        tracing::error!("split calculation produced {total} for amount {amount}");
        return Err(EngineError::Consistency(format!(
            "split sum {total} != amount {amount}"
        )));
    }

    Ok(shares
        .into_iter()
        .map(|(user_id, share)| {
            if user_id == payer {
                Split::new_settled(expense_id, user_id.to_string(), share, at)
            } else {
                Split::new(expense_id, user_id.to_string(), share)
            }
        })
        .collect())
}

fn ordered_participants(participants: &[String]) -> ResultEngine<Vec<&str>> {
    if participants.is_empty() {
        return Err(EngineError::Validation(
            "at least one participant is required".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for participant in participants {
        if participant.trim().is_empty() {
            return Err(EngineError::Validation(
                "participant id must not be empty".to_string(),
            ));
        }
        if !seen.insert(participant.as_str()) {
            return Err(EngineError::Validation(format!(
                "duplicate participant: {participant}"
            )));
        }
    }
    Ok(seen.into_iter().collect())
}

fn equal_shares<'a>(amount: MoneyCents, ordered: &[&'a str]) -> Vec<(&'a str, MoneyCents)> {
    let count = ordered.len() as i64;
    let base = amount.cents() / count;
    let remainder = amount.cents() % count;

    ordered
        .iter()
        .enumerate()
        .map(|(idx, user_id)| {
            let extra = i64::from((idx as i64) < remainder);
            (*user_id, MoneyCents::new(base + extra))
        })
        .collect()
}

fn unequal_shares<'a>(
    amount: MoneyCents,
    ordered: &[&'a str],
    explicit: &BTreeMap<String, MoneyCents>,
) -> ResultEngine<Vec<(&'a str, MoneyCents)>> {
    if let Some(extra) = explicit
        .keys()
        .find(|user_id| !ordered.iter().any(|p| *p == user_id.as_str()))
    {
        return Err(EngineError::Validation(format!(
            "explicit amount for non-participant: {extra}"
        )));
    }

    let mut shares = Vec::with_capacity(ordered.len());
    for user_id in ordered {
        let share = explicit.get(*user_id).copied().ok_or_else(|| {
            EngineError::Validation(format!("missing explicit amount for {user_id}"))
        })?;
        if share.is_negative() {
            return Err(EngineError::Validation(format!(
                "explicit amount for {user_id} must be >= 0"
            )));
        }
        shares.push((*user_id, share));
    }

    let total = shares
        .iter()
        .try_fold(MoneyCents::ZERO, |acc, (_, share)| acc.checked_add(*share))
        .ok_or_else(|| EngineError::Validation("amount too large".to_string()))?;
    let residual = amount - total;
    let tolerance = MoneyCents::new(ordered.len() as i64);
    if residual.abs() > tolerance {
        return Err(EngineError::Validation(format!(
            "explicit amounts sum to {total}, expected {amount}"
        )));
    }

    if !residual.is_zero() {
        // `ordered` is non-empty, so the first share exists.
        let first = &mut shares[0];
        first.1 += residual;
        if first.1.is_negative() {
            return Err(EngineError::Validation(format!(
                "explicit amounts sum to {total}, expected {amount}"
            )));
        }
    }

    Ok(shares)
}
