use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    EngineError, Expense, ExpenseKind, MoneyCents, ResultEngine, SettleBalanceCmd, Split,
    expenses, splits,
    util::{normalize_user_id, parse_uuid},
};

use super::{Engine, with_tx};

/// What a [`Engine::settle_balance`] call touched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    /// Splits that became fully settled, oldest expense first.
    pub settled_splits: Vec<Uuid>,
    /// Split that received a partial payment, if the amount ran out midway.
    pub partially_paid: Option<Uuid>,
    /// Part of the amount consumed by existing splits.
    pub applied_to_splits: MoneyCents,
    /// Settlement record created for the part not covered by splits.
    pub settlement_record: Option<Uuid>,
}

impl Engine {
    /// Marks one split as settled.
    ///
    /// Allowed for the split's debtor and for the expense payer. Settling an
    /// already settled split is a no-op and returns `false`.
    pub async fn settle_split(
        &self,
        expense_id: &str,
        user_id: &str,
        caller: &str,
    ) -> ResultEngine<bool> {
        let expense_uuid = parse_uuid(expense_id, "expense")?;
        let user_id = normalize_user_id(user_id)?;
        let changed = with_tx!(self, |db_tx| {
            let (expense, mut split) = self
                .require_split_for_party(&db_tx, expense_uuid, &user_id, caller)
                .await?;
            if !split.settle(Utc::now()) {
                tracing::debug!(expense_id = %expense.id, %user_id, "split already settled");
                return Ok(false);
            }
            splits::ActiveModel::payment_update(&split)
                .update(&db_tx)
                .await?;
            tracing::info!(
                expense_id = %expense.id,
                %user_id,
                amount = %split.amount,
                "split settled"
            );
            Ok(expense.group_id)
        })?;

        self.after_ledger_change(changed).await;
        Ok(true)
    }

    /// Records a partial payment towards a split; the split settles once
    /// fully paid.
    pub async fn record_split_payment(
        &self,
        expense_id: &str,
        user_id: &str,
        amount: MoneyCents,
        caller: &str,
    ) -> ResultEngine<Split> {
        let expense_uuid = parse_uuid(expense_id, "expense")?;
        let user_id = normalize_user_id(user_id)?;
        let (group_id, split) = with_tx!(self, |db_tx| {
            let (expense, mut split) = self
                .require_split_for_party(&db_tx, expense_uuid, &user_id, caller)
                .await?;
            split.apply_payment(amount, Utc::now())?;
            splits::ActiveModel::payment_update(&split)
                .update(&db_tx)
                .await?;
            tracing::info!(
                expense_id = %expense.id,
                %user_id,
                %amount,
                settled = split.settled,
                "split payment recorded"
            );
            Ok((expense.group_id, split))
        })?;

        self.after_ledger_change(group_id).await;
        Ok(split)
    }

    /// `cmd.from` pays `cmd.to` `cmd.amount`.
    ///
    /// The amount first covers `from`'s unsettled shares of expenses paid by
    /// `to`, oldest first; the last covered split may be paid partially.
    /// Whatever is left (all of it when there are no such splits) is stored
    /// as a settlement record so the payment is never lost.
    pub async fn settle_balance(&self, cmd: SettleBalanceCmd) -> ResultEngine<SettlementOutcome> {
        let group_uuid = parse_uuid(&cmd.group_id, "group")?;
        let from = normalize_user_id(&cmd.from)?;
        let to = normalize_user_id(&cmd.to)?;
        let caller = normalize_user_id(&cmd.caller)?;
        if from == to {
            return Err(EngineError::Validation(
                "cannot settle a balance with oneself".to_string(),
            ));
        }
        if !cmd.amount.is_positive() {
            return Err(EngineError::Validation(
                "settlement amount must be > 0".to_string(),
            ));
        }
        if caller != from && caller != to {
            return Err(EngineError::Forbidden(format!(
                "{caller} is not a party to this settlement"
            )));
        }

        let outcome = with_tx!(self, |db_tx| {
            self.require_active_member(&db_tx, group_uuid, &caller)
                .await?;
            for party in [&from, &to] {
                match self.find_member(&db_tx, group_uuid, party).await? {
                    Some(member) if member.is_active() => {}
                    _ => {
                        return Err(EngineError::Validation(format!(
                            "{party} is not an active member"
                        )));
                    }
                }
            }

            let now = Utc::now();
            let rows = splits::Entity::find()
                .filter(splits::Column::UserId.eq(from.clone()))
                .filter(splits::Column::Settled.eq(false))
                .find_also_related(expenses::Entity)
                .filter(expenses::Column::GroupId.eq(group_uuid.to_string()))
                .filter(expenses::Column::PaidBy.eq(to.clone()))
                .filter(expenses::Column::Kind.eq(ExpenseKind::Regular.as_str()))
                .order_by_asc(expenses::Column::OccurredAt)
                .order_by_asc(expenses::Column::Id)
                .all(&db_tx)
                .await?;

            let mut remaining = cmd.amount;
            let mut outcome = SettlementOutcome {
                settled_splits: Vec::new(),
                partially_paid: None,
                applied_to_splits: MoneyCents::ZERO,
                settlement_record: None,
            };
            for (model, _) in rows {
                if remaining.is_zero() {
                    break;
                }
                let mut split = Split::try_from(model)?;
                let outstanding = split.outstanding();
                if outstanding.is_zero() {
                    split.settle(now);
                    splits::ActiveModel::payment_update(&split)
                        .update(&db_tx)
                        .await?;
                    continue;
                }
                let covered = remaining.min(outstanding);
                split.apply_payment(covered, now)?;
                splits::ActiveModel::payment_update(&split)
                    .update(&db_tx)
                    .await?;
                remaining -= covered;
                outcome.applied_to_splits += covered;
                if split.settled {
                    outcome.settled_splits.push(split.id);
                } else {
                    outcome.partially_paid = Some(split.id);
                }
            }

            if remaining.is_positive() {
                let record = self
                    .insert_settlement_record(
                        &db_tx,
                        group_uuid,
                        &from,
                        &to,
                        remaining,
                        &caller,
                        cmd.occurred_at,
                    )
                    .await?;
                outcome.settlement_record = Some(record.id);
            }

            Ok(outcome)
        })?;

        tracing::info!(
            group_id = %group_uuid,
            %from,
            %to,
            amount = %cmd.amount,
            applied = %outcome.applied_to_splits,
            settled_splits = outcome.settled_splits.len(),
            record = outcome.settlement_record.is_some(),
            "balance settled"
        );
        self.after_ledger_change(group_uuid).await;
        Ok(outcome)
    }

    /// Loads an expense split and checks `caller` may act on it: an active
    /// member of the group who is either the split's debtor or the payer.
    async fn require_split_for_party(
        &self,
        db: &DatabaseTransaction,
        expense_id: Uuid,
        user_id: &str,
        caller: &str,
    ) -> ResultEngine<(Expense, Split)> {
        let expense = self.require_expense(db, expense_id).await?;
        self.require_active_member(db, expense.group_id, caller)
            .await?;
        if caller != user_id && caller != expense.paid_by {
            return Err(EngineError::Forbidden(format!(
                "{caller} may not settle a split of {user_id}"
            )));
        }
        let split = expense
            .split_for(user_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("split of {user_id}")))?;
        Ok((expense, split))
    }

    /// A settled transfer from `from` to `to`, kept out of balances and of
    /// the group total.
    async fn insert_settlement_record(
        &self,
        db: &DatabaseTransaction,
        group_id: Uuid,
        from: &str,
        to: &str,
        amount: MoneyCents,
        caller: &str,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<Expense> {
        let mut record = Expense::new(
            group_id,
            format!("Settlement: {from} paid {to}"),
            amount,
            from.to_string(),
            occurred_at,
            None,
            ExpenseKind::Settlement,
            caller.to_string(),
        )?;
        record.splits = vec![
            Split::new_settled(record.id, from.to_string(), MoneyCents::ZERO, record.created_at),
            Split::new_settled(record.id, to.to_string(), amount, record.created_at),
        ];
        record.splits.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        record.ensure_balanced()?;
        self.insert_expense(db, &record).await?;

        tracing::debug!(record_id = %record.id, %amount, "settlement record stored");
        Ok(record)
    }
}
