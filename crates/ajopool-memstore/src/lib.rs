use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use ajopool_core::errors::{EngineError, EngineResult};
use ajopool_core::models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment,
    CustomOrderPreset, CycleStatus, FeeRecord, MissedContribution, PaymentStatus, PayoutOrder,
    PayoutOrderStatus,
};
use ajopool_core::storage::{Ledger, Notifier, Store};

#[derive(Default)]
struct Tables {
    groups: HashMap<Uuid, ContributionGroup>,
    members: HashMap<Uuid, ContributionMember>,
    cycles: HashMap<Uuid, ContributionCycle>,
    payments: HashMap<Uuid, ContributionPayment>,
    payout_orders: HashMap<Uuid, PayoutOrder>,
    missed: Vec<MissedContribution>,
    fees: Vec<FeeRecord>,
    presets: HashMap<(Uuid, i32), CustomOrderPreset>,
    balances: HashMap<Uuid, Decimal>,
}

/// In-memory [`Store`] and [`Ledger`] over one set of tables. One lock over
/// everything, wallets included, so every trait method is a single critical
/// section, matching the atomicity the engine expects.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_group(&self, group: &ContributionGroup) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn group(&self, group_id: Uuid) -> EngineResult<Option<ContributionGroup>> {
        let tables = self.tables.read().await;
        Ok(tables.groups.get(&group_id).cloned())
    }

    async fn update_group(&self, group: &ContributionGroup) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&group.id) {
            return Err(EngineError::GroupNotFound(group.id));
        }
        tables.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn group_ids_with_open_cycles(&self) -> EngineResult<Vec<Uuid>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<Uuid> = tables
            .cycles
            .values()
            .filter(|cycle| cycle.status == CycleStatus::Open)
            .map(|cycle| cycle.group_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn insert_member(
        &self,
        member: &ContributionMember,
        max_members: i32,
    ) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .members
            .values()
            .filter(|m| m.group_id == member.group_id)
            .count() as i32;
        if tables
            .members
            .values()
            .any(|m| m.group_id == member.group_id && m.user_id == member.user_id)
        {
            return Err(EngineError::AlreadyMember {
                group_id: member.group_id,
                user_id: member.user_id,
            });
        }
        if existing >= max_members {
            return Err(EngineError::Capacity(member.group_id));
        }
        tables.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ContributionMember>> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .values()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }

    async fn members_of(&self, group_id: Uuid) -> EngineResult<Vec<ContributionMember>> {
        let tables = self.tables.read().await;
        let mut members: Vec<ContributionMember> = tables
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.joined_at, m.id));
        Ok(members)
    }

    async fn delete_member(&self, member_id: Uuid) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.members.remove(&member_id);
        Ok(())
    }

    async fn insert_cycle(&self, cycle: &ContributionCycle) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .cycles
            .values()
            .any(|c| c.group_id == cycle.group_id && c.status == CycleStatus::Open)
        {
            return Err(EngineError::OpenCycleExists(cycle.group_id));
        }
        tables.cycles.insert(cycle.id, cycle.clone());
        Ok(())
    }

    async fn cycle(&self, cycle_id: Uuid) -> EngineResult<Option<ContributionCycle>> {
        let tables = self.tables.read().await;
        Ok(tables.cycles.get(&cycle_id).cloned())
    }

    async fn open_cycle_of(&self, group_id: Uuid) -> EngineResult<Option<ContributionCycle>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cycles
            .values()
            .find(|c| c.group_id == group_id && c.status == CycleStatus::Open)
            .cloned())
    }

    async fn last_cycle_number(&self, group_id: Uuid) -> EngineResult<i32> {
        let tables = self.tables.read().await;
        Ok(tables
            .cycles
            .values()
            .filter(|c| c.group_id == group_id)
            .map(|c| c.cycle_number)
            .max()
            .unwrap_or(0))
    }

    async fn set_cycle_status(&self, cycle_id: Uuid, status: CycleStatus) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        match tables.cycles.get_mut(&cycle_id) {
            Some(cycle) => {
                cycle.status = status;
                Ok(())
            }
            None => Err(EngineError::CycleNotFound(cycle_id)),
        }
    }

    async fn insert_payments(&self, payments: &[ContributionPayment]) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        for payment in payments {
            tables.payments.insert(payment.id, payment.clone());
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &ContributionPayment) -> EngineResult<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .payments
            .values()
            .any(|p| p.cycle_id == payment.cycle_id && p.member_id == payment.member_id)
        {
            return Ok(false);
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(true)
    }

    async fn payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
    ) -> EngineResult<Option<ContributionPayment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.cycle_id == cycle_id && p.member_id == member_id)
            .cloned())
    }

    async fn payments_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<ContributionPayment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<ContributionPayment> = tables
            .payments
            .values()
            .filter(|p| p.cycle_id == cycle_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn debit_and_settle(
        &self,
        payment: &ContributionPayment,
        total: Decimal,
    ) -> EngineResult<bool> {
        let mut tables = self.tables.write().await;

        let claimable = tables
            .payments
            .values()
            .find(|p| p.cycle_id == payment.cycle_id && p.member_id == payment.member_id);
        if matches!(claimable, Some(row) if row.status != PaymentStatus::Pending) {
            return Ok(false);
        }

        let available = tables
            .balances
            .get(&payment.user_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if available < total {
            return Err(EngineError::InsufficientBalance {
                required: total,
                available,
            });
        }

        let existing = tables
            .payments
            .values_mut()
            .find(|p| p.cycle_id == payment.cycle_id && p.member_id == payment.member_id);
        match existing {
            Some(row) => {
                row.status = PaymentStatus::Success;
                row.penalty = payment.penalty;
                row.paid_at = payment.paid_at;
            }
            None => {
                tables.payments.insert(payment.id, payment.clone());
            }
        }
        *tables
            .balances
            .entry(payment.user_id)
            .or_insert(Decimal::ZERO) -= total;
        Ok(true)
    }

    async fn miss_payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
        penalty: Decimal,
    ) -> EngineResult<bool> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .values_mut()
            .find(|p| p.cycle_id == cycle_id && p.member_id == member_id);
        match payment {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Missed;
                payment.penalty = penalty;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_payout_orders(&self, orders: &[PayoutOrder]) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        for order in orders {
            tables.payout_orders.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn payout_orders_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<PayoutOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<PayoutOrder> = tables
            .payout_orders
            .values()
            .filter(|o| o.cycle_id == cycle_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.position);
        Ok(orders)
    }

    async fn try_claim_payout_slot(&self, order: &PayoutOrder) -> EngineResult<bool> {
        let mut tables = self.tables.write().await;
        let collision = tables.payout_orders.values().any(|o| {
            o.cycle_id == order.cycle_id
                && (o.position == order.position || o.user_id == order.user_id)
        });
        if collision {
            return Ok(false);
        }
        tables.payout_orders.insert(order.id, order.clone());
        Ok(true)
    }

    async fn claim_cycle_payout(
        &self,
        cycle_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> EngineResult<Option<PayoutOrder>> {
        let mut tables = self.tables.write().await;
        let already_paid = tables
            .payout_orders
            .values()
            .any(|o| o.cycle_id == cycle_id && o.status == PayoutOrderStatus::Paid);
        if already_paid {
            return Ok(None);
        }
        let next = tables
            .payout_orders
            .values_mut()
            .filter(|o| o.cycle_id == cycle_id && o.status != PayoutOrderStatus::Paid)
            .min_by_key(|o| o.position);
        match next {
            Some(order) => {
                order.status = PayoutOrderStatus::Paid;
                order.paid_at = Some(paid_at);
                Ok(Some(order.clone()))
            }
            None => Ok(None),
        }
    }

    async fn insert_missed(&self, missed: &MissedContribution) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.missed.push(missed.clone());
        Ok(())
    }

    async fn insert_fee(&self, fee: &FeeRecord) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables.fees.push(fee.clone());
        Ok(())
    }

    async fn fees_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<FeeRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .fees
            .iter()
            .filter(|f| f.cycle_id == cycle_id)
            .cloned()
            .collect())
    }

    async fn upsert_custom_preset(&self, preset: &CustomOrderPreset) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .presets
            .insert((preset.group_id, preset.cycle_number), preset.clone());
        Ok(())
    }

    async fn custom_preset(
        &self,
        group_id: Uuid,
        cycle_number: i32,
    ) -> EngineResult<Option<CustomOrderPreset>> {
        let tables = self.tables.read().await;
        Ok(tables.presets.get(&(group_id, cycle_number)).cloned())
    }
}

impl InMemoryStore {
    /// Every missed-contribution row recorded so far. Test hook.
    pub async fn missed_rows(&self) -> Vec<MissedContribution> {
        self.tables.read().await.missed.clone()
    }

    pub async fn fund(&self, user_id: Uuid, amount: Decimal) {
        let mut tables = self.tables.write().await;
        *tables.balances.entry(user_id).or_insert(Decimal::ZERO) += amount;
    }
}

#[async_trait]
impl Ledger for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> EngineResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(tables.balances.get(&user_id).copied().unwrap_or(Decimal::ZERO))
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        let balance = tables.balances.entry(user_id).or_insert(Decimal::ZERO);
        if *balance < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()> {
        let mut tables = self.tables.write().await;
        *tables.balances.entry(user_id).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub user_id: Uuid,
    pub template: String,
    pub data: serde_json::Value,
}

/// Captures notifications instead of delivering them. Test double.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Uuid, template: &str, data: serde_json::Value) {
        let mut sent = self.sent.write().await;
        sent.push(SentNotification {
            user_id,
            template: template.to_string(),
            data,
        });
    }
}
