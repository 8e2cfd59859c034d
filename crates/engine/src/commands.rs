//! Command structs for engine write operations.
//!
//! These types group parameters for expense creation and balance
//! settlement, keeping call sites readable and avoiding long argument lists.

use chrono::{DateTime, Utc};

use crate::{MoneyCents, SplitPolicy};

/// Create an expense inside a group.
///
/// `created_by` is the authenticated caller; `paid_by` defaults to the
/// caller and can be another active member.
#[derive(Clone, Debug)]
pub struct CreateExpenseCmd {
    pub group_id: String,
    pub created_by: String,
    pub paid_by: String,
    pub amount: MoneyCents,
    pub description: String,
    pub participants: Vec<String>,
    pub policy: SplitPolicy,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl CreateExpenseCmd {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        created_by: impl Into<String>,
        amount: MoneyCents,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let created_by = created_by.into();
        Self {
            group_id: group_id.into(),
            paid_by: created_by.clone(),
            created_by,
            amount,
            description: description.into(),
            participants: Vec::new(),
            policy: SplitPolicy::Equal,
            category: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn paid_by(mut self, user_id: impl Into<String>) -> Self {
        self.paid_by = user_id.into();
        self
    }

    #[must_use]
    pub fn participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: SplitPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// `from` pays `to` `amount` inside a group.
#[derive(Clone, Debug)]
pub struct SettleBalanceCmd {
    pub group_id: String,
    pub from: String,
    pub to: String,
    pub amount: MoneyCents,
    pub caller: String,
    pub occurred_at: DateTime<Utc>,
}

impl SettleBalanceCmd {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: MoneyCents,
        caller: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            from: from.into(),
            to: to.into(),
            amount,
            caller: caller.into(),
            occurred_at,
        }
    }
}
