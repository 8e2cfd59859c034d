use sea_orm::{ConnectionTrait, QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    CreateExpenseCmd, EngineError, Expense, ExpenseKind, MoneyCents, ResultEngine,
    compute_splits, expenses, groups, splits,
    util::{normalize_optional_text, normalize_required_text, parse_uuid},
};

use super::{Engine, with_tx};

impl Engine {
    /// Records an expense and its splits atomically.
    ///
    /// The caller, the payer and every participant must be active members.
    /// The group's running total grows by the expense amount.
    pub async fn create_expense(&self, cmd: CreateExpenseCmd) -> ResultEngine<Expense> {
        let group_uuid = parse_uuid(&cmd.group_id, "group")?;
        let description = normalize_required_text(&cmd.description, "description")?;
        let category = normalize_optional_text(cmd.category.as_deref());
        if !cmd.amount.is_positive() {
            return Err(EngineError::Validation(
                "expense amount must be > 0".to_string(),
            ));
        }

        let expense = with_tx!(self, |db_tx| {
            let (group, _) = self
                .require_active_member(&db_tx, group_uuid, &cmd.created_by)
                .await?;
            let members = self.load_members(&db_tx, group_uuid).await?;
            let is_active = |user_id: &str| {
                members
                    .iter()
                    .any(|m| m.user_id == user_id && m.is_active())
            };
            if !is_active(cmd.paid_by.as_str()) {
                return Err(EngineError::Validation(format!(
                    "payer {} is not an active member",
                    cmd.paid_by
                )));
            }
            if let Some(outsider) = cmd.participants.iter().find(|p| !is_active(p.as_str())) {
                return Err(EngineError::Validation(format!(
                    "participant {outsider} is not an active member"
                )));
            }

            let mut expense = Expense::new(
                group_uuid,
                description,
                cmd.amount,
                cmd.paid_by.clone(),
                cmd.occurred_at,
                category,
                ExpenseKind::Regular,
                cmd.created_by.clone(),
            )?;
            expense.splits = compute_splits(
                expense.id,
                expense.amount,
                &cmd.participants,
                &cmd.policy,
                &expense.paid_by,
                expense.created_at,
            )?;
            expense.ensure_balanced()?;

            self.insert_expense(&db_tx, &expense).await?;
            MoneyCents::new(group.total_expenses_minor)
                .checked_add(expense.amount)
                .ok_or_else(|| EngineError::Validation("amount too large".to_string()))?;
            groups::Entity::update_many()
                .col_expr(
                    groups::Column::TotalExpensesMinor,
                    Expr::col(groups::Column::TotalExpensesMinor).add(expense.amount.cents()),
                )
                .filter(groups::Column::Id.eq(group.id))
                .exec(&db_tx)
                .await?;

            Ok(expense)
        })?;

        tracing::info!(
            group_id = %group_uuid,
            expense_id = %expense.id,
            amount = %expense.amount,
            splits = expense.splits.len(),
            "expense created"
        );
        self.after_ledger_change(group_uuid).await;
        Ok(expense)
    }

    /// A single expense with its splits (active members only).
    pub async fn expense(&self, expense_id: &str, caller: &str) -> ResultEngine<Expense> {
        let expense_uuid = parse_uuid(expense_id, "expense")?;
        let expense = self.require_expense(&self.database, expense_uuid).await?;
        self.require_active_member(&self.database, expense.group_id, caller)
            .await?;
        Ok(expense)
    }

    /// Lists a group's expenses newest first.
    ///
    /// Settlement records are included only when `include_settlements` is
    /// set.
    pub async fn list_expenses(
        &self,
        group_id: &str,
        caller: &str,
        include_settlements: bool,
    ) -> ResultEngine<Vec<Expense>> {
        let group_uuid = parse_uuid(group_id, "group")?;
        self.require_active_member(&self.database, group_uuid, caller)
            .await?;
        let mut ledger = self.load_ledger(&self.database, group_uuid).await?;
        if !include_settlements {
            ledger.retain(|e| !e.is_settlement());
        }
        ledger.reverse();
        Ok(ledger)
    }

    pub(super) async fn insert_expense<C: ConnectionTrait>(
        &self,
        db: &C,
        expense: &Expense,
    ) -> ResultEngine<()> {
        expenses::ActiveModel::from(expense).insert(db).await?;
        for split in &expense.splits {
            splits::ActiveModel::from(split).insert(db).await?;
        }
        Ok(())
    }
}
