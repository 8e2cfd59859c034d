use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Expense, Member, ResultEngine, expenses, group_members, groups, splits, users,
};

use super::Engine;

impl Engine {
    pub(super) async fn require_user_exists<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
    ) -> ResultEngine<()> {
        let found = users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .is_some();
        if !found {
            return Err(EngineError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    pub(super) async fn require_group<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
    ) -> ResultEngine<groups::Model> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("group".to_string()))
    }

    /// Members of a group in the order they were added.
    pub(super) async fn load_members<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
    ) -> ResultEngine<Vec<Member>> {
        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(group_members::Column::Position)
            .all(db)
            .await?
            .into_iter()
            .map(Member::try_from)
            .collect()
    }

    pub(super) async fn find_member<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Option<Member>> {
        group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(db)
            .await?
            .map(Member::try_from)
            .transpose()
    }

    /// Loads the group and checks that `user_id` is an active member of it.
    pub(super) async fn require_active_member<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<(groups::Model, Member)> {
        let group = self.require_group(db, group_id).await?;
        match self.find_member(db, group_id, user_id).await? {
            Some(member) if member.is_active() => Ok((group, member)),
            _ => Err(EngineError::Forbidden(format!(
                "{user_id} is not an active member of the group"
            ))),
        }
    }

    pub(super) async fn require_admin<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<groups::Model> {
        let (group, member) = self.require_active_member(db, group_id, user_id).await?;
        if !member.is_admin() || group.admin_id != user_id {
            return Err(EngineError::Forbidden(format!(
                "{user_id} is not the group admin"
            )));
        }
        Ok(group)
    }

    /// Every expense of a group with its splits, oldest first.
    ///
    /// Splits are ordered by user id so downstream folds see a stable order.
    pub(super) async fn load_ledger<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
    ) -> ResultEngine<Vec<Expense>> {
        let rows = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(expenses::Column::OccurredAt)
            .order_by_asc(expenses::Column::Id)
            .find_with_related(splits::Entity)
            .all(db)
            .await?;

        rows.into_iter()
            .map(|(model, split_models)| attach_splits(model, split_models))
            .collect()
    }

    pub(super) async fn require_expense<C: ConnectionTrait>(
        &self,
        db: &C,
        expense_id: Uuid,
    ) -> ResultEngine<Expense> {
        let model = expenses::Entity::find_by_id(expense_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("expense".to_string()))?;
        let split_models = splits::Entity::find()
            .filter(splits::Column::ExpenseId.eq(expense_id.to_string()))
            .all(db)
            .await?;
        attach_splits(model, split_models)
    }
}

fn attach_splits(
    model: expenses::Model,
    split_models: Vec<splits::Model>,
) -> ResultEngine<Expense> {
    let mut expense = Expense::try_from(model)?;
    let mut splits = split_models
        .into_iter()
        .map(crate::Split::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;
    splits.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    expense.splits = splits;
    Ok(expense)
}
