//! Expense primitives.
//!
//! An `Expense` is an immutable payment event inside a group: someone paid
//! `amount` and the cost is shared through its [`Split`]s. Settlement records
//! (`ExpenseKind::Settlement`) are expenses too, but they only document a
//! direct transfer between two members and never feed balances or totals.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, Split, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    Regular,
    Settlement,
}

impl ExpenseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Settlement => "settlement",
        }
    }
}

impl TryFrom<&str> for ExpenseKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "regular" => Ok(Self::Regular),
            "settlement" => Ok(Self::Settlement),
            other => Err(EngineError::Validation(format!(
                "invalid expense kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub description: String,
    pub amount: MoneyCents,
    pub paid_by: String,
    pub occurred_at: DateTime<Utc>,
    pub category: Option<String>,
    pub kind: ExpenseKind,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub splits: Vec<Split>,
}

impl Expense {
    pub fn new(
        group_id: Uuid,
        description: String,
        amount: MoneyCents,
        paid_by: String,
        occurred_at: DateTime<Utc>,
        category: Option<String>,
        kind: ExpenseKind,
        created_by: String,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(
                "expense amount must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            description,
            amount,
            paid_by,
            occurred_at,
            category,
            kind,
            created_by,
            created_at: Utc::now(),
            splits: Vec::new(),
        })
    }

    pub fn is_settlement(&self) -> bool {
        self.kind == ExpenseKind::Settlement
    }

    pub fn split_for(&self, user_id: &str) -> Option<&Split> {
        self.splits.iter().find(|s| s.user_id == user_id)
    }

    pub fn split_for_mut(&mut self, user_id: &str) -> Option<&mut Split> {
        self.splits.iter_mut().find(|s| s.user_id == user_id)
    }

    /// Checks that the shares add up to the expense amount.
    pub fn ensure_balanced(&self) -> ResultEngine<()> {
        let total: MoneyCents = self.splits.iter().map(|s| s.amount).sum();
        if total != self.amount {
            tracing::error!(
                expense_id = %self.id,
                "split sum {total} does not match expense amount {}",
                self.amount
            );
            return Err(EngineError::Consistency(format!(
                "expense {}: split sum {total} != amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub description: String,
    pub amount_minor: i64,
    pub paid_by: String,
    pub occurred_at: DateTimeUtc,
    pub category: Option<String>,
    pub kind: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
    #[sea_orm(has_many = "super::splits::Entity")]
    Splits,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl Related<super::splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Splits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.to_string()),
            description: ActiveValue::Set(expense.description.clone()),
            amount_minor: ActiveValue::Set(expense.amount.cents()),
            paid_by: ActiveValue::Set(expense.paid_by.clone()),
            occurred_at: ActiveValue::Set(expense.occurred_at),
            category: ActiveValue::Set(expense.category.clone()),
            kind: ActiveValue::Set(expense.kind.as_str().to_string()),
            created_by: ActiveValue::Set(expense.created_by.clone()),
            created_at: ActiveValue::Set(expense.created_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            description: model.description,
            amount: MoneyCents::new(model.amount_minor),
            paid_by: model.paid_by,
            occurred_at: model.occurred_at,
            category: model.category,
            kind: ExpenseKind::try_from(model.kind.as_str())?,
            created_by: model.created_by,
            created_at: model.created_at,
            splits: Vec::new(),
        })
    }
}
