use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::EngineResult;
use crate::models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment,
    CustomOrderPreset, CycleStatus, FeeRecord, MissedContribution, PayoutOrder,
};

/// Notification template names the engine emits.
pub mod templates {
    pub const GROUP_JOINED: &str = "group-joined";
    pub const CYCLE_OPENED: &str = "cycle-opened";
    pub const CONTRIBUTION_MISSED: &str = "contribution-missed";
    pub const PAYOUT_DISBURSED: &str = "payout-disbursed";
}

/// Persistence seam for the cycle engine. Every method is an atomic unit:
/// implementations serialize the check-then-write pairs internally (single
/// write lock in memory, transactions and row locks on Postgres).
#[async_trait]
pub trait Store: Send + Sync {
    // Groups
    async fn insert_group(&self, group: &ContributionGroup) -> EngineResult<()>;
    async fn group(&self, group_id: Uuid) -> EngineResult<Option<ContributionGroup>>;
    async fn update_group(&self, group: &ContributionGroup) -> EngineResult<()>;
    async fn group_ids_with_open_cycles(&self) -> EngineResult<Vec<Uuid>>;

    // Members
    /// Fails `AlreadyMember` on a duplicate (group, user) pair and `Capacity`
    /// when the group already holds `max_members` members.
    async fn insert_member(
        &self,
        member: &ContributionMember,
        max_members: i32,
    ) -> EngineResult<()>;
    async fn member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ContributionMember>>;
    /// Members in join order.
    async fn members_of(&self, group_id: Uuid) -> EngineResult<Vec<ContributionMember>>;
    async fn delete_member(&self, member_id: Uuid) -> EngineResult<()>;

    // Cycles
    /// Fails `OpenCycleExists` when the group already has an open cycle.
    async fn insert_cycle(&self, cycle: &ContributionCycle) -> EngineResult<()>;
    async fn cycle(&self, cycle_id: Uuid) -> EngineResult<Option<ContributionCycle>>;
    async fn open_cycle_of(&self, group_id: Uuid) -> EngineResult<Option<ContributionCycle>>;
    async fn last_cycle_number(&self, group_id: Uuid) -> EngineResult<i32>;
    async fn set_cycle_status(&self, cycle_id: Uuid, status: CycleStatus) -> EngineResult<()>;

    // Payments
    async fn insert_payments(&self, payments: &[ContributionPayment]) -> EngineResult<()>;
    /// Returns false when a payment for (cycle, member) already exists.
    async fn insert_payment(&self, payment: &ContributionPayment) -> EngineResult<bool>;
    async fn payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
    ) -> EngineResult<Option<ContributionPayment>>;
    async fn payments_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<ContributionPayment>>;
    /// Debits `total` from the contributor's wallet and records the
    /// settlement as one atomic unit: the member's pending row flips to
    /// success (or a fresh success row is inserted when none was seeded),
    /// and the wallet loses `total`, together or not at all. Returns false
    /// with the wallet untouched when the payment is no longer claimable;
    /// fails `InsufficientBalance` with nothing mutated.
    async fn debit_and_settle(
        &self,
        payment: &ContributionPayment,
        total: Decimal,
    ) -> EngineResult<bool>;
    /// Conditional pending -> missed flip; false when not pending.
    async fn miss_payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
        penalty: Decimal,
    ) -> EngineResult<bool>;

    // Payout orders
    async fn insert_payout_orders(&self, orders: &[PayoutOrder]) -> EngineResult<()>;
    /// Orders of a cycle sorted by position.
    async fn payout_orders_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<PayoutOrder>>;
    /// Atomic insert-if-free for one spin claim; false when the position or
    /// the user is already taken for the cycle.
    async fn try_claim_payout_slot(&self, order: &PayoutOrder) -> EngineResult<bool>;
    /// Atomically marks the lowest-position payout order of the cycle as
    /// paid and returns it. None when the cycle already has a paid slot (a
    /// cycle disburses exactly once) or has no slots. This is the guard that
    /// keeps tick and close_cycle from double-paying.
    async fn claim_cycle_payout(
        &self,
        cycle_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> EngineResult<Option<PayoutOrder>>;

    // Missed contributions and fees
    async fn insert_missed(&self, missed: &MissedContribution) -> EngineResult<()>;
    async fn insert_fee(&self, fee: &FeeRecord) -> EngineResult<()>;
    async fn fees_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<FeeRecord>>;

    // Custom payout presets
    async fn upsert_custom_preset(&self, preset: &CustomOrderPreset) -> EngineResult<()>;
    async fn custom_preset(
        &self,
        group_id: Uuid,
        cycle_number: i32,
    ) -> EngineResult<Option<CustomOrderPreset>>;
}

/// Wallet ledger the engine debits and credits. External collaborator; every
/// call is atomic on its own.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> EngineResult<Decimal>;
    /// Fails `InsufficientBalance` without mutating anything.
    async fn debit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()>;
    async fn credit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()>;
}

/// Best-effort fan-out. Implementations log and swallow delivery failures;
/// the engine never blocks on them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, template: &str, data: serde_json::Value);
}
