use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ajopool_core::models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment, CycleStatus,
    GroupStatus, PaymentStatus, PayoutOrder, PayoutOrderStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub creator_id: Uuid,
    pub name: String,
    pub amount_per_member: Decimal,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    pub max_members: i32,
    #[serde(default = "default_payout_policy")]
    pub payout_policy: String,
    #[serde(default)]
    pub penalty_amount: Decimal,
    pub total_cycles: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupView {
    pub group_id: Uuid,
    pub name: String,
    pub amount_per_member: Decimal,
    pub frequency: String,
    pub max_members: i32,
    pub payout_policy: String,
    pub penalty_amount: Decimal,
    pub total_cycles: Option<i32>,
    pub status: GroupStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<ContributionGroup> for GroupView {
    fn from(group: ContributionGroup) -> Self {
        Self {
            group_id: group.id,
            name: group.name,
            amount_per_member: group.amount_per_member,
            frequency: group.frequency.as_str().to_string(),
            max_members: group.max_members,
            payout_policy: group.payout_policy.as_str().to_string(),
            penalty_amount: group.penalty_amount,
            total_cycles: group.total_cycles,
            status: group.status,
            created_by: group.created_by,
            created_at: group.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub member_id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<ContributionMember> for MemberView {
    fn from(member: ContributionMember) -> Self {
        Self {
            member_id: member.id,
            group_id: member.group_id,
            user_id: member.user_id,
            is_admin: member.is_admin,
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveGroupRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateGroupRequest {
    pub actor_id: Uuid,
    pub name: Option<String>,
    pub amount_per_member: Option<Decimal>,
    pub frequency: Option<String>,
    pub max_members: Option<i32>,
    pub penalty_amount: Option<Decimal>,
    pub total_cycles: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCustomOrderRequest {
    pub actor_id: Uuid,
    pub cycle_number: i32,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCycleRequest {
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleView {
    pub cycle_id: Uuid,
    pub group_id: Uuid,
    pub cycle_number: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount: Decimal,
    pub status: CycleStatus,
}

impl From<ContributionCycle> for CycleView {
    fn from(cycle: ContributionCycle) -> Self {
        Self {
            cycle_id: cycle.id,
            group_id: cycle.group_id,
            cycle_number: cycle.cycle_number,
            start_date: cycle.start_date,
            end_date: cycle.end_date,
            amount: cycle.amount,
            status: cycle.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: Uuid,
    pub cycle_id: Uuid,
    pub member_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub penalty: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<ContributionPayment> for PaymentView {
    fn from(payment: ContributionPayment) -> Self {
        Self {
            payment_id: payment.id,
            cycle_id: payment.cycle_id,
            member_id: payment.member_id,
            user_id: payment.user_id,
            amount: payment.amount,
            penalty: payment.penalty,
            status: payment.status,
            paid_at: payment.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOrderView {
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub position: i32,
    pub status: PayoutOrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<PayoutOrder> for PayoutOrderView {
    fn from(order: PayoutOrder) -> Self {
        Self {
            cycle_id: order.cycle_id,
            user_id: order.user_id,
            position: order.position,
            status: order.status,
            paid_at: order.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseCycleResponse {
    pub cycle_id: Uuid,
    pub recipient: Option<Uuid>,
    pub net_amount: Decimal,
    pub opened_next_cycle: bool,
}

/// Payload published on the notifications channel for downstream delivery
/// workers (email/SMS/push fan-out lives outside this system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub template: String,
    pub data: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

fn default_frequency() -> String {
    "thirty-day".to_string()
}

fn default_payout_policy() -> String {
    "rotational".to_string()
}
