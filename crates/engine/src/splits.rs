//! Expense splits.
//!
//! A [`Split`] is one participant's share of an
//! [`Expense`](crate::Expense). The share itself never changes after
//! creation; only `amount_paid` grows and `settled` flips from `false` to
//! `true` exactly once.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub user_id: String,
    pub amount: MoneyCents,
    pub amount_paid: MoneyCents,
    pub settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Split {
    pub fn new(expense_id: Uuid, user_id: String, amount: MoneyCents) -> Self {
        Self {
            id: Uuid::new_v4(),
            expense_id,
            user_id,
            amount,
            amount_paid: MoneyCents::ZERO,
            settled: false,
            settled_at: None,
        }
    }

    /// A split that is paid off from the start (the payer's own share, or
    /// both sides of a settlement record).
    pub fn new_settled(
        expense_id: Uuid,
        user_id: String,
        amount: MoneyCents,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            amount_paid: amount,
            settled: true,
            settled_at: Some(at),
            ..Self::new(expense_id, user_id, amount)
        }
    }

    /// Amount still owed on this split (zero once settled).
    pub fn outstanding(&self) -> MoneyCents {
        if self.settled {
            MoneyCents::ZERO
        } else {
            self.amount - self.amount_paid
        }
    }

    /// Marks the split settled. Returns `false` if it already was.
    pub fn settle(&mut self, at: DateTime<Utc>) -> bool {
        if self.settled {
            return false;
        }
        self.amount_paid = self.amount;
        self.settled = true;
        self.settled_at = Some(at);
        true
    }

    /// Records a (partial) payment towards the split; reaching the full share
    /// settles it.
    pub fn apply_payment(&mut self, amount: MoneyCents, at: DateTime<Utc>) -> ResultEngine<()> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "payment amount must be > 0".to_string(),
            ));
        }
        if self.settled {
            return Err(EngineError::Validation("split already settled".to_string()));
        }
        let outstanding = self.outstanding();
        if amount > outstanding {
            return Err(EngineError::Validation(format!(
                "payment {amount} exceeds outstanding {outstanding}"
            )));
        }
        self.amount_paid += amount;
        if self.amount_paid == self.amount {
            self.settled = true;
            self.settled_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "splits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub expense_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub amount_paid_minor: i64,
    pub settled: bool,
    pub settled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expenses,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Split> for ActiveModel {
    fn from(split: &Split) -> Self {
        Self {
            id: ActiveValue::Set(split.id.to_string()),
            expense_id: ActiveValue::Set(split.expense_id.to_string()),
            user_id: ActiveValue::Set(split.user_id.clone()),
            amount_minor: ActiveValue::Set(split.amount.cents()),
            amount_paid_minor: ActiveValue::Set(split.amount_paid.cents()),
            settled: ActiveValue::Set(split.settled),
            settled_at: ActiveValue::Set(split.settled_at),
        }
    }
}

impl ActiveModel {
    /// Update touching only the mutable payment columns.
    pub(crate) fn payment_update(split: &Split) -> Self {
        Self {
            id: ActiveValue::Set(split.id.to_string()),
            amount_paid_minor: ActiveValue::Set(split.amount_paid.cents()),
            settled: ActiveValue::Set(split.settled),
            settled_at: ActiveValue::Set(split.settled_at),
            ..Default::default()
        }
    }
}

impl TryFrom<Model> for Split {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "split")?,
            expense_id: parse_uuid(&model.expense_id, "expense")?,
            user_id: model.user_id,
            amount: MoneyCents::new(model.amount_minor),
            amount_paid: MoneyCents::new(model.amount_paid_minor),
            settled: model.settled,
            settled_at: model.settled_at,
        })
    }
}
