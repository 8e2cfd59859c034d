use chrono::Utc;
use sea_orm::{ActiveValue, ConnectionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Balance, EngineError, GroupBalances, PairwiseDebt, ResultEngine, SettlementInstruction,
    compute_group_balances, groups, simplify_debts, util::parse_uuid,
};

use super::{CacheRefresh, Engine};

impl Engine {
    /// Per-member balances, ordered by user id.
    ///
    /// Derived from the ledger on every call; nothing here is stored.
    pub async fn get_balances(&self, group_id: &str, caller: &str) -> ResultEngine<Vec<Balance>> {
        let balances = self.group_balances(group_id, caller).await?;
        Ok(balances.balances.into_values().collect())
    }

    /// Net debts between each pair of users, after netting both directions.
    pub async fn get_pairwise_debts(
        &self,
        group_id: &str,
        caller: &str,
    ) -> ResultEngine<Vec<PairwiseDebt>> {
        Ok(self.group_balances(group_id, caller).await?.pairwise)
    }

    /// Freshly computed settlement plan for the group.
    pub async fn get_simplified_debts(
        &self,
        group_id: &str,
        caller: &str,
    ) -> ResultEngine<Vec<SettlementInstruction>> {
        let balances = self.group_balances(group_id, caller).await?;
        simplify_debts(&balances)
    }

    /// Last cached settlement plan, `None` until the first ledger mutation.
    ///
    /// May lag behind [`Engine::get_simplified_debts`] while a background
    /// refresh is in flight.
    pub async fn cached_simplified_debts(
        &self,
        group_id: &str,
        caller: &str,
    ) -> ResultEngine<Option<Vec<SettlementInstruction>>> {
        let group_uuid = parse_uuid(group_id, "group")?;
        let (group, _) = self
            .require_active_member(&self.database, group_uuid, caller)
            .await?;
        group.cached_debts()
    }

    pub async fn group_balances(&self, group_id: &str, caller: &str) -> ResultEngine<GroupBalances> {
        let group_uuid = parse_uuid(group_id, "group")?;
        self.require_active_member(&self.database, group_uuid, caller)
            .await?;
        self.compute_balances(&self.database, group_uuid).await
    }

    async fn compute_balances<C: ConnectionTrait>(
        &self,
        db: &C,
        group_id: Uuid,
    ) -> ResultEngine<GroupBalances> {
        let members: Vec<String> = self
            .load_members(db, group_id)
            .await?
            .into_iter()
            .filter(|m| m.is_active())
            .map(|m| m.user_id)
            .collect();
        let ledger = self.load_ledger(db, group_id).await?;
        compute_group_balances(&ledger, &members)
    }

    /// Rebuilds the group's `simplified_debts` cache from the ledger.
    ///
    /// Concurrent refreshes are last-write-wins; every writer recomputes from
    /// the committed ledger, so the surviving value is never older than the
    /// mutation that triggered it.
    pub(super) async fn refresh_debt_cache(&self, group_id: Uuid) -> ResultEngine<()> {
        let balances = self.compute_balances(&self.database, group_id).await?;
        let plan = simplify_debts(&balances)?;
        let encoded = serde_json::to_string(&plan)
            .map_err(|err| EngineError::Consistency(format!("cannot encode debts: {err}")))?;

        groups::ActiveModel {
            id: ActiveValue::Set(group_id.to_string()),
            simplified_debts: ActiveValue::Set(Some(encoded)),
            debts_refreshed_at: ActiveValue::Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&self.database)
        .await?;

        tracing::debug!(%group_id, instructions = plan.len(), "debt cache refreshed");
        Ok(())
    }

    /// Schedules the cache refresh that follows every committed mutation.
    ///
    /// Failures are logged and never reach the caller: the mutation itself
    /// already committed.
    pub(super) async fn after_ledger_change(&self, group_id: Uuid) {
        let background = self.cache_refresh == CacheRefresh::Background
            && tokio::runtime::Handle::try_current().is_ok();
        if background {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.refresh_debt_cache(group_id).await {
                    tracing::warn!(%group_id, "background debt cache refresh failed: {err}");
                }
            });
            return;
        }

        if let Err(err) = self.refresh_debt_cache(group_id).await {
            tracing::warn!(%group_id, "debt cache refresh failed: {err}");
        }
    }
}
