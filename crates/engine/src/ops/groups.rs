use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    EngineError, Group, Member, MemberRole, MemberStatus, ResultEngine, group_members, groups,
    users,
    util::{normalize_optional_text, normalize_required_text, normalize_user_id, parse_uuid},
};

use super::{Engine, with_tx};

impl Engine {
    /// Registers a user. Usernames are unique.
    pub async fn create_user(&self, username: &str, display_name: Option<&str>) -> ResultEngine<()> {
        let username = normalize_user_id(username)?;
        with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(username.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(username));
            }
            users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                display_name: ActiveValue::Set(normalize_optional_text(display_name)),
                created_at: ActiveValue::Set(Utc::now()),
            }
            .insert(&db_tx)
            .await?;
            tracing::info!(%username, "user created");
            Ok(())
        })
    }

    /// Creates a group administered by `admin`, who becomes its first
    /// active member.
    pub async fn create_group(&self, name: &str, admin: &str) -> ResultEngine<Group> {
        let name = normalize_required_text(name, "group name")?;
        let admin = normalize_user_id(admin)?;
        with_tx!(self, |db_tx| {
            self.require_user_exists(&db_tx, &admin).await?;

            let now = Utc::now();
            let mut group = Group::new(name, admin.clone(), now);
            groups::ActiveModel::from(&group).insert(&db_tx).await?;

            let member = Member {
                user_id: admin,
                role: MemberRole::Admin,
                status: MemberStatus::Active,
                position: 0,
                joined_at: Some(now),
            };
            group_members::ActiveModel::from_member(&group.id.to_string(), &member)
                .insert(&db_tx)
                .await?;
            group.members.push(member);

            tracing::info!(group_id = %group.id, admin = %group.admin_id, "group created");
            Ok(group)
        })
    }

    /// Invites `username` into the group (admin only). The invitee stays
    /// `pending` until they accept.
    pub async fn invite_member(
        &self,
        group_id: &str,
        username: &str,
        caller: &str,
    ) -> ResultEngine<Member> {
        let group_uuid = parse_uuid(group_id, "group")?;
        let username = normalize_user_id(username)?;
        with_tx!(self, |db_tx| {
            self.require_admin(&db_tx, group_uuid, caller).await?;
            self.require_user_exists(&db_tx, &username).await?;
            if self.find_member(&db_tx, group_uuid, &username).await?.is_some() {
                return Err(EngineError::ExistingKey(format!(
                    "{username} in group {group_uuid}"
                )));
            }

            let last_position = group_members::Entity::find()
                .filter(group_members::Column::GroupId.eq(group_uuid.to_string()))
                .order_by_desc(group_members::Column::Position)
                .one(&db_tx)
                .await?
                .map_or(-1, |m| m.position);

            let member = Member {
                user_id: username,
                role: MemberRole::Member,
                status: MemberStatus::Pending,
                position: last_position + 1,
                joined_at: None,
            };
            group_members::ActiveModel::from_member(&group_uuid.to_string(), &member)
                .insert(&db_tx)
                .await?;

            tracing::info!(group_id = %group_uuid, user_id = %member.user_id, "member invited");
            Ok(member)
        })
    }

    /// Accepts a pending invitation. Accepting twice is a no-op.
    pub async fn accept_invitation(&self, group_id: &str, caller: &str) -> ResultEngine<Member> {
        let group_uuid = parse_uuid(group_id, "group")?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_uuid).await?;
            let mut member = self
                .find_member(&db_tx, group_uuid, caller)
                .await?
                .ok_or_else(|| EngineError::NotFound("invitation".to_string()))?;
            if member.is_active() {
                return Ok(member);
            }

            member.status = MemberStatus::Active;
            member.joined_at = Some(Utc::now());
            group_members::ActiveModel {
                group_id: ActiveValue::Set(group_uuid.to_string()),
                user_id: ActiveValue::Set(member.user_id.clone()),
                status: ActiveValue::Set(member.status.as_str().to_string()),
                joined_at: ActiveValue::Set(member.joined_at),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;

            tracing::info!(group_id = %group_uuid, user_id = %member.user_id, "invitation accepted");
            Ok(member)
        })
    }

    /// Returns the group with its members (active members only).
    pub async fn group(&self, group_id: &str, caller: &str) -> ResultEngine<Group> {
        let group_uuid = parse_uuid(group_id, "group")?;
        let (model, _) = self
            .require_active_member(&self.database, group_uuid, caller)
            .await?;
        let members = self.load_members(&self.database, group_uuid).await?;
        model.into_group(members)
    }

    /// Lists members in the order they were added (active members only).
    pub async fn list_members(&self, group_id: &str, caller: &str) -> ResultEngine<Vec<Member>> {
        let group_uuid = parse_uuid(group_id, "group")?;
        self.require_active_member(&self.database, group_uuid, caller)
            .await?;
        self.load_members(&self.database, group_uuid).await
    }

    /// Groups in which `caller` is a member, pending invitations included.
    pub async fn list_groups(&self, caller: &str) -> ResultEngine<Vec<(Group, MemberStatus)>> {
        let memberships = group_members::Entity::find()
            .filter(group_members::Column::UserId.eq(caller.to_string()))
            .find_also_related(groups::Entity)
            .order_by_asc(groups::Column::CreatedAt)
            .all(&self.database)
            .await?;

        let mut out = Vec::with_capacity(memberships.len());
        for (membership, group) in memberships {
            let Some(group) = group else {
                continue;
            };
            let status = MemberStatus::try_from(membership.status.as_str())?;
            let group_uuid = parse_uuid(&group.id, "group")?;
            let members = self.load_members(&self.database, group_uuid).await?;
            out.push((group.into_group(members)?, status));
        }
        Ok(out)
    }
}
