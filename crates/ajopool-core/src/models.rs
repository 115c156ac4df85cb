use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    ThirtyDay,
}

impl Frequency {
    /// Unknown values fall back to the thirty-day window.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Frequency::Weekly,
            "biweekly" => Frequency::Biweekly,
            "monthly" => Frequency::Monthly,
            _ => Frequency::ThirtyDay,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::ThirtyDay => "thirty-day",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayoutPolicy {
    Random,
    Rotational,
    Spin,
    Custom,
}

impl PayoutPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "random" => Some(PayoutPolicy::Random),
            "rotational" => Some(PayoutPolicy::Rotational),
            "spin" => Some(PayoutPolicy::Spin),
            "custom" => Some(PayoutPolicy::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutPolicy::Random => "random",
            PayoutPolicy::Rotational => "rotational",
            PayoutPolicy::Spin => "spin",
            PayoutPolicy::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Open,
    Closed,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Missed,
}

impl PaymentStatus {
    /// A payment no longer awaiting settlement for its cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Missed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayoutOrderStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FeeKind {
    PlatformCycle,
    PlatformPenalty,
    GroupIncome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionGroup {
    pub id: Uuid,
    pub name: String,
    pub amount_per_member: Decimal,
    pub frequency: Frequency,
    pub max_members: i32,
    pub payout_policy: PayoutPolicy,
    pub penalty_amount: Decimal,
    /// Number of cycles in the rotation; defaults to the member count at
    /// first-cycle creation.
    pub total_cycles: Option<i32>,
    pub status: GroupStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionCycle {
    pub id: Uuid,
    pub group_id: Uuid,
    pub cycle_number: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Snapshot of the group's amount-per-member at creation time.
    pub amount: Decimal,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionPayment {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub member_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub penalty: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_auto_paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOrder {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    /// 1-based slot in the cycle's payout sequence.
    pub position: i32,
    pub status: PayoutOrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedContribution {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub member_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub missed_at: DateTime<Utc>,
}

/// Append-only ledger-of-record for platform fees and group income.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub user_id: Option<Uuid>,
    pub kind: FeeKind,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Pre-seeded payout sequence for a future cycle of a custom-policy group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomOrderPreset {
    pub group_id: Uuid,
    pub cycle_number: i32,
    pub user_ids: Vec<Uuid>,
}
