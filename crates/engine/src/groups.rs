//! The `Group` is the membership container that owns expenses.
//!
//! A group has exactly one admin (always an active member). The running
//! `total_expenses` counts regular expenses only; settlement records are
//! excluded. `simplified_debts` is a derived cache of the last simplification
//! and is overwritten after every ledger mutation.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, Member, MoneyCents, ResultEngine, SettlementInstruction, util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub admin_id: String,
    pub total_expenses: MoneyCents,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, admin_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            admin_id,
            total_expenses: MoneyCents::ZERO,
            members: Vec::new(),
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub admin_id: String,
    pub total_expenses_minor: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub simplified_debts: Option<String>,
    pub debts_refreshed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group_members::Entity")]
    GroupMembers,
    #[sea_orm(has_many = "super::expenses::Entity")]
    Expenses,
}

impl Related<super::group_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GroupMembers.def()
    }
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Group> for ActiveModel {
    fn from(group: &Group) -> Self {
        Self {
            id: ActiveValue::Set(group.id.to_string()),
            name: ActiveValue::Set(group.name.clone()),
            admin_id: ActiveValue::Set(group.admin_id.clone()),
            total_expenses_minor: ActiveValue::Set(group.total_expenses.cents()),
            simplified_debts: ActiveValue::Set(None),
            debts_refreshed_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(group.created_at),
        }
    }
}

impl Model {
    /// Builds the domain group from the row plus its (ordered) member rows.
    pub(crate) fn into_group(self, members: Vec<Member>) -> ResultEngine<Group> {
        Ok(Group {
            id: parse_uuid(&self.id, "group")?,
            name: self.name,
            admin_id: self.admin_id,
            total_expenses: MoneyCents::new(self.total_expenses_minor),
            members,
            created_at: self.created_at,
        })
    }

    /// Decodes the cached simplification, if any.
    pub(crate) fn cached_debts(&self) -> ResultEngine<Option<Vec<SettlementInstruction>>> {
        self.simplified_debts
            .as_deref()
            .map(|raw| {
                serde_json::from_str(raw).map_err(|err| {
                    EngineError::Consistency(format!("unreadable simplified_debts cache: {err}"))
                })
            })
            .transpose()
    }
}
