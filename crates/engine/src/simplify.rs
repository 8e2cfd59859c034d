//! Debt simplification.
//!
//! Reduces the group's net balances to a short list of direct transfers.
//! The heuristic is greedy: repeatedly match the largest debtor with the
//! largest creditor and let the debtor pay `min(debt, credit)`. Each step
//! clears at least one side, so the loop runs at most `members - 1` times
//! and always clears every balance. It is not guaranteed to find the
//! globally minimal number of transfers.
//!
//! Ties in magnitude are broken by the lexicographically smaller user id,
//! which makes the output fully deterministic.

use serde::{Deserialize, Serialize};

use crate::{EngineError, GroupBalances, MoneyCents, ResultEngine};

/// `from` pays `to` the given `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    pub from: String,
    pub to: String,
    pub amount: MoneyCents,
}

/// Computes the payment plan that clears all balances.
pub fn simplify_debts(balances: &GroupBalances) -> ResultEngine<Vec<SettlementInstruction>> {
    let mut debtors: Vec<(&str, MoneyCents)> = Vec::new();
    let mut creditors: Vec<(&str, MoneyCents)> = Vec::new();
    for balance in balances.balances.values() {
        if balance.net.is_negative() {
            debtors.push((balance.user_id.as_str(), -balance.net));
        } else if balance.net.is_positive() {
            creditors.push((balance.user_id.as_str(), balance.net));
        }
    }

    let max_steps = balances.balances.len();
    let mut out = Vec::new();

    loop {
        let debtor = largest(&debtors);
        let creditor = largest(&creditors);
        let (d, c) = match (debtor, creditor) {
            (None, None) => break,
            (Some(d), Some(c)) => (d, c),
            _ => {
                tracing::error!("unbalanced ledger reached the debt simplifier");
                return Err(EngineError::Consistency(
                    "debts and credits do not cancel out".to_string(),
                ));
            }
        };
        if out.len() >= max_steps {
            tracing::error!(steps = out.len(), "debt simplification did not terminate");
            return Err(EngineError::Consistency(format!(
                "debt simplification exceeded {max_steps} steps"
            )));
        }

        let amount = debtors[d].1.min(creditors[c].1);
        debtors[d].1 -= amount;
        creditors[c].1 -= amount;
        out.push(SettlementInstruction {
            from: debtors[d].0.to_string(),
            to: creditors[c].0.to_string(),
            amount,
        });
    }

    tracing::debug!(instructions = out.len(), "simplified group debts");
    Ok(out)
}

/// Index of the largest outstanding amount (>= one cent); smaller id wins
/// ties.
fn largest(side: &[(&str, MoneyCents)]) -> Option<usize> {
    side.iter()
        .enumerate()
        .filter(|(_, (_, amount))| *amount >= MoneyCents::CENT)
        .max_by(|(_, (id_a, a)), (_, (id_b, b))| a.cmp(b).then_with(|| id_b.cmp(id_a)))
        .map(|(idx, _)| idx)
}
