use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use ajopool_core::errors::{EngineError, EngineResult};
use ajopool_core::models::{
    ContributionGroup, ContributionMember, CustomOrderPreset, Frequency, GroupStatus,
    PayoutPolicy,
};
use ajopool_core::storage::{Notifier, Store, templates};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub amount_per_member: Decimal,
    pub frequency: Frequency,
    pub max_members: i32,
    pub payout_policy: PayoutPolicy,
    pub penalty_amount: Decimal,
    pub total_cycles: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub amount_per_member: Option<Decimal>,
    pub frequency: Option<Frequency>,
    pub max_members: Option<i32>,
    pub penalty_amount: Option<Decimal>,
    pub total_cycles: Option<i32>,
}

/// Membership and group lifecycle. Capacity and uniqueness are enforced by
/// the store inside a single atomic insert.
pub struct GroupRegistry {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl GroupRegistry {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Creates a group and enrolls the creator as its first admin member.
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        params: NewGroup,
    ) -> EngineResult<ContributionGroup> {
        let name = params.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::Validation("name is required".to_string()));
        }
        if params.amount_per_member <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "amount_per_member must be positive".to_string(),
            ));
        }
        if params.max_members < 1 {
            return Err(EngineError::Validation(
                "max_members must be at least 1".to_string(),
            ));
        }
        if params.penalty_amount < Decimal::ZERO {
            return Err(EngineError::Validation(
                "penalty_amount must not be negative".to_string(),
            ));
        }
        if let Some(total) = params.total_cycles {
            if total < 1 {
                return Err(EngineError::Validation(
                    "total_cycles must be at least 1".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let group = ContributionGroup {
            id: Uuid::new_v4(),
            name,
            amount_per_member: params.amount_per_member,
            frequency: params.frequency,
            max_members: params.max_members,
            payout_policy: params.payout_policy,
            penalty_amount: params.penalty_amount,
            total_cycles: params.total_cycles,
            status: GroupStatus::Active,
            created_by: creator_id,
            created_at: now,
        };
        self.store.insert_group(&group).await?;

        let creator = ContributionMember {
            id: Uuid::new_v4(),
            group_id: group.id,
            user_id: creator_id,
            is_admin: true,
            joined_at: now,
        };
        self.store
            .insert_member(&creator, group.max_members)
            .await?;

        Ok(group)
    }

    pub async fn join_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<ContributionMember> {
        let group = self
            .store
            .group(group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        if group.status != GroupStatus::Active {
            return Err(EngineError::Validation(
                "group is no longer accepting members".to_string(),
            ));
        }

        let member = ContributionMember {
            id: Uuid::new_v4(),
            group_id,
            user_id,
            is_admin: false,
            joined_at: Utc::now(),
        };
        self.store.insert_member(&member, group.max_members).await?;

        for admin in self.store.members_of(group_id).await? {
            if admin.is_admin && admin.user_id != user_id {
                self.notifier
                    .notify(
                        admin.user_id,
                        templates::GROUP_JOINED,
                        json!({ "group_id": group_id, "user_id": user_id }),
                    )
                    .await;
            }
        }

        Ok(member)
    }

    pub async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> EngineResult<()> {
        let member = self
            .store
            .member(group_id, user_id)
            .await?
            .ok_or(EngineError::NotAMember { group_id, user_id })?;

        if member.is_admin {
            let admins = self
                .store
                .members_of(group_id)
                .await?
                .into_iter()
                .filter(|m| m.is_admin)
                .count();
            if admins <= 1 {
                return Err(EngineError::AdminCannotLeave(group_id));
            }
        }

        self.store.delete_member(member.id).await
    }

    /// Only the group's creator may mutate it.
    pub async fn update_group(
        &self,
        group_id: Uuid,
        actor_id: Uuid,
        patch: GroupPatch,
    ) -> EngineResult<ContributionGroup> {
        let mut group = self
            .store
            .group(group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        if group.created_by != actor_id {
            return Err(EngineError::Forbidden(group_id));
        }

        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(EngineError::Validation("name is required".to_string()));
            }
            group.name = name;
        }
        if let Some(amount) = patch.amount_per_member {
            if amount <= Decimal::ZERO {
                return Err(EngineError::Validation(
                    "amount_per_member must be positive".to_string(),
                ));
            }
            group.amount_per_member = amount;
        }
        if let Some(frequency) = patch.frequency {
            group.frequency = frequency;
        }
        if let Some(max_members) = patch.max_members {
            let current = self.store.members_of(group_id).await?.len() as i32;
            if max_members < current {
                return Err(EngineError::Validation(format!(
                    "max_members must be at least the current member count ({current})"
                )));
            }
            group.max_members = max_members;
        }
        if let Some(penalty) = patch.penalty_amount {
            if penalty < Decimal::ZERO {
                return Err(EngineError::Validation(
                    "penalty_amount must not be negative".to_string(),
                ));
            }
            group.penalty_amount = penalty;
        }
        if let Some(total) = patch.total_cycles {
            if total < 1 {
                return Err(EngineError::Validation(
                    "total_cycles must be at least 1".to_string(),
                ));
            }
            group.total_cycles = Some(total);
        }

        self.store.update_group(&group).await?;
        Ok(group)
    }

    /// Seeds the payout sequence a custom-policy group will use for a future
    /// cycle number.
    pub async fn seed_custom_order(
        &self,
        group_id: Uuid,
        actor_id: Uuid,
        cycle_number: i32,
        user_ids: Vec<Uuid>,
    ) -> EngineResult<()> {
        let group = self
            .store
            .group(group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        if group.created_by != actor_id {
            return Err(EngineError::Forbidden(group_id));
        }
        if group.payout_policy != PayoutPolicy::Custom {
            return Err(EngineError::Validation(
                "payout order can only be seeded for custom-policy groups".to_string(),
            ));
        }
        if cycle_number < 1 {
            return Err(EngineError::Validation(
                "cycle_number must be at least 1".to_string(),
            ));
        }

        let members = self.store.members_of(group_id).await?;
        for user_id in &user_ids {
            if !members.iter().any(|m| m.user_id == *user_id) {
                return Err(EngineError::NotAMember {
                    group_id,
                    user_id: *user_id,
                });
            }
        }
        let mut deduped = user_ids.clone();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != user_ids.len() {
            return Err(EngineError::Validation(
                "custom order must not repeat members".to_string(),
            ));
        }

        self.store
            .upsert_custom_preset(&CustomOrderPreset {
                group_id,
                cycle_number,
                user_ids,
            })
            .await
    }

    pub async fn group(&self, group_id: Uuid) -> EngineResult<Option<ContributionGroup>> {
        self.store.group(group_id).await
    }

    pub async fn members_of(&self, group_id: Uuid) -> EngineResult<Vec<ContributionMember>> {
        self.store.members_of(group_id).await
    }
}
