use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use ajopool_core::errors::{EngineError, EngineResult};
use ajopool_core::fees;
use ajopool_core::models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment, CycleStatus,
    FeeKind, FeeRecord, GroupStatus, MissedContribution, PaymentStatus, PayoutOrder,
    PayoutOrderStatus, PayoutPolicy,
};
use ajopool_core::policy::{self, InitialOrder};
use ajopool_core::schedule;
use ajopool_core::storage::{Ledger, Notifier, Store, templates};

pub const MISSED_DEADLINE_REASON: &str = "Missed payment deadline";

/// Per-sweep admin summary returned by [`CycleEngine::tick`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub groups_processed: u32,
    pub cycles_settled: u32,
    pub cycles_opened: u32,
    pub payments_marked_missed: u32,
    pub errors: Vec<String>,
}

/// What a settlement pass did for one cycle.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// None when another path had already disbursed this cycle's payout.
    pub recipient: Option<Uuid>,
    pub net_amount: Decimal,
    pub opened_next_cycle: bool,
}

/// The cycle state machine: creation, contributions, spin slots, the
/// scheduler sweep and manual settlement. Cycles move `open -> closed` when
/// settled with a successor, and the rotation's final cycle moves
/// `open -> completed` while the group closes.
pub struct CycleEngine {
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
}

impl CycleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    /// Opens the next cycle for a group. The first cycle pins the group's
    /// rotation length to its member count when no explicit total is set.
    pub async fn create_cycle(
        &self,
        group_id: Uuid,
        start_date: Option<DateTime<Utc>>,
    ) -> EngineResult<ContributionCycle> {
        let now = Utc::now();
        let mut group = self
            .store
            .group(group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        if group.status != GroupStatus::Active {
            return Err(EngineError::Validation("group is closed".to_string()));
        }

        let members = self.store.members_of(group_id).await?;
        if members.is_empty() {
            return Err(EngineError::Validation(
                "group has no members to cycle".to_string(),
            ));
        }

        let cycle_number = self.store.last_cycle_number(group_id).await? + 1;
        if cycle_number == 1 && group.total_cycles.is_none() {
            group.total_cycles = Some(members.len() as i32);
            self.store.update_group(&group).await?;
        }

        self.open_cycle(&group, &members, cycle_number, start_date.unwrap_or(now))
            .await
    }

    /// Records a member's contribution for an open cycle. Contributions more
    /// than 24h after cycle start carry a 5% penalty split evenly between the
    /// platform and the group. The wallet debit and the payment row commit
    /// as one store operation: a lost duplicate race leaves the wallet
    /// untouched.
    pub async fn make_contribution(
        &self,
        cycle_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    ) -> EngineResult<ContributionPayment> {
        self.make_contribution_at(cycle_id, user_id, amount, Utc::now())
            .await
    }

    pub async fn make_contribution_at(
        &self,
        cycle_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<ContributionPayment> {
        let cycle = self
            .store
            .cycle(cycle_id)
            .await?
            .ok_or(EngineError::CycleNotFound(cycle_id))?;
        if cycle.status != CycleStatus::Open {
            return Err(EngineError::CycleNotOpen(cycle_id));
        }
        if now < cycle.start_date || now > cycle.end_date {
            return Err(EngineError::OutsideWindow(cycle_id));
        }

        let member = self
            .store
            .member(cycle.group_id, user_id)
            .await?
            .ok_or(EngineError::NotAMember {
                group_id: cycle.group_id,
                user_id,
            })?;

        if amount != cycle.amount {
            return Err(EngineError::Validation(format!(
                "contribution must equal the cycle amount of {}",
                cycle.amount
            )));
        }

        let existing = self.store.payment(cycle_id, member.id).await?;
        if matches!(&existing, Some(payment) if payment.status != PaymentStatus::Pending) {
            return Err(EngineError::AlreadyPaid(cycle_id));
        }

        let penalty = if schedule::is_late(cycle.start_date, now) {
            fees::late_penalty(cycle.amount)
        } else {
            Decimal::ZERO
        };
        let total = amount + penalty;

        let settled = ContributionPayment {
            id: Uuid::new_v4(),
            cycle_id,
            member_id: member.id,
            user_id,
            amount,
            penalty,
            status: PaymentStatus::Success,
            paid_at: Some(now),
            is_auto_paid: false,
        };
        if !self.store.debit_and_settle(&settled, total).await? {
            return Err(EngineError::AlreadyPaid(cycle_id));
        }

        if penalty > Decimal::ZERO {
            let (to_platform, to_group) = fees::split_penalty(penalty);
            self.record_fee(cycle_id, Some(user_id), FeeKind::PlatformPenalty, to_platform)
                .await?;
            self.record_fee(cycle_id, Some(user_id), FeeKind::GroupIncome, to_group)
                .await?;
        }

        info!(
            cycle_id = %cycle_id,
            user_id = %user_id,
            %total,
            %penalty,
            "contribution recorded"
        );

        self.store
            .payment(cycle_id, member.id)
            .await?
            .ok_or_else(|| EngineError::Storage(anyhow::anyhow!("settled payment row missing")))
    }

    /// Self-service slot claim for spin-policy cycles. Safe under concurrent
    /// spins: the slot insert is atomic and collisions retry against a fresh
    /// view of the taken positions.
    pub async fn spin_for_order(&self, cycle_id: Uuid, user_id: Uuid) -> EngineResult<PayoutOrder> {
        let cycle = self
            .store
            .cycle(cycle_id)
            .await?
            .ok_or(EngineError::CycleNotFound(cycle_id))?;
        if cycle.status != CycleStatus::Open {
            return Err(EngineError::CycleNotOpen(cycle_id));
        }
        self.store
            .member(cycle.group_id, user_id)
            .await?
            .ok_or(EngineError::NotAMember {
                group_id: cycle.group_id,
                user_id,
            })?;

        let member_count = self.store.members_of(cycle.group_id).await?.len() as i32;
        let mut rng = StdRng::from_entropy();

        loop {
            let orders = self.store.payout_orders_of_cycle(cycle_id).await?;
            if orders.iter().any(|o| o.user_id == user_id) {
                return Err(EngineError::AlreadySpun { cycle_id, user_id });
            }
            let taken: Vec<i32> = orders.iter().map(|o| o.position).collect();
            let position = policy::pick_free_position(&taken, member_count, &mut rng)
                .ok_or(EngineError::AllPositionsAssigned(cycle_id))?;

            let order = PayoutOrder {
                id: Uuid::new_v4(),
                cycle_id,
                group_id: cycle.group_id,
                user_id,
                position,
                status: PayoutOrderStatus::Pending,
                paid_at: None,
            };
            if self.store.try_claim_payout_slot(&order).await? {
                return Ok(order);
            }
            // Someone grabbed that position (or spun for us) first; re-read.
        }
    }

    /// Scheduler sweep over every group with an open cycle. Idempotent; a
    /// failure in one group never aborts the others.
    pub async fn tick(&self) -> EngineResult<TickSummary> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> EngineResult<TickSummary> {
        let mut summary = TickSummary::default();
        for group_id in self.store.group_ids_with_open_cycles().await? {
            summary.groups_processed += 1;
            if let Err(err) = self.process_group(group_id, now, &mut summary).await {
                error!(group_id = %group_id, "tick failed for group: {err}");
                summary.errors.push(format!("group {group_id}: {err}"));
            }
        }
        info!(
            groups = summary.groups_processed,
            settled = summary.cycles_settled,
            opened = summary.cycles_opened,
            missed = summary.payments_marked_missed,
            failures = summary.errors.len(),
            "tick complete"
        );
        Ok(summary)
    }

    /// Manual/admin settlement of a cycle whose members have all paid in.
    /// Shares the payout claim with the tick path, so the two can never both
    /// disburse.
    pub async fn close_cycle(&self, cycle_id: Uuid) -> EngineResult<SettlementOutcome> {
        let now = Utc::now();
        let cycle = self
            .store
            .cycle(cycle_id)
            .await?
            .ok_or(EngineError::CycleNotFound(cycle_id))?;
        if cycle.status != CycleStatus::Open {
            return Err(EngineError::CycleNotOpen(cycle_id));
        }
        let group = self
            .store
            .group(cycle.group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(cycle.group_id))?;
        let members = self.store.members_of(cycle.group_id).await?;

        let payments = self.store.payments_of_cycle(cycle_id).await?;
        let all_paid = members.iter().all(|member| {
            payments
                .iter()
                .any(|p| p.member_id == member.id && p.status == PaymentStatus::Success)
        });
        if !all_paid {
            return Err(EngineError::CycleNotSettled(cycle_id));
        }

        self.settle_cycle(&group, &cycle, &members, now).await
    }

    pub async fn cycle_by_id(&self, cycle_id: Uuid) -> EngineResult<Option<ContributionCycle>> {
        self.store.cycle(cycle_id).await
    }

    pub async fn payout_order_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<PayoutOrder>> {
        self.store.payout_orders_of_cycle(cycle_id).await
    }

    pub async fn payments_of_cycle(
        &self,
        cycle_id: Uuid,
    ) -> EngineResult<Vec<ContributionPayment>> {
        self.store.payments_of_cycle(cycle_id).await
    }

    async fn process_group(
        &self,
        group_id: Uuid,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> EngineResult<()> {
        let group = self
            .store
            .group(group_id)
            .await?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        let Some(cycle) = self.store.open_cycle_of(group_id).await? else {
            return Ok(());
        };
        let members = self.store.members_of(group_id).await?;
        if members.is_empty() {
            return Ok(());
        }

        if now > cycle.end_date {
            summary.payments_marked_missed += self
                .sweep_deadline(&group, &cycle, &members, now)
                .await?;
        }

        let payments = self.store.payments_of_cycle(cycle.id).await?;
        let terminal = members
            .iter()
            .filter(|member| {
                payments
                    .iter()
                    .any(|p| p.member_id == member.id && p.status.is_terminal())
            })
            .count();
        if terminal == members.len() {
            let outcome = self.settle_cycle(&group, &cycle, &members, now).await?;
            if outcome.recipient.is_some() {
                summary.cycles_settled += 1;
            }
            if outcome.opened_next_cycle {
                summary.cycles_opened += 1;
            }
        }

        Ok(())
    }

    /// Marks every member without a terminal payment as missed once the
    /// cycle's deadline has passed. Returns how many rows flipped.
    async fn sweep_deadline(
        &self,
        group: &ContributionGroup,
        cycle: &ContributionCycle,
        members: &[ContributionMember],
        now: DateTime<Utc>,
    ) -> EngineResult<u32> {
        let mut flipped = 0;
        for member in members {
            let newly_missed = match self.store.payment(cycle.id, member.id).await? {
                Some(payment) if payment.status == PaymentStatus::Pending => {
                    self.store
                        .miss_payment(cycle.id, member.id, group.penalty_amount)
                        .await?
                }
                Some(_) => false,
                None => {
                    // Joined after the cycle opened; no pending row was seeded.
                    self.store
                        .insert_payment(&ContributionPayment {
                            id: Uuid::new_v4(),
                            cycle_id: cycle.id,
                            member_id: member.id,
                            user_id: member.user_id,
                            amount: cycle.amount,
                            penalty: group.penalty_amount,
                            status: PaymentStatus::Missed,
                            paid_at: None,
                            is_auto_paid: false,
                        })
                        .await?
                }
            };
            if newly_missed {
                flipped += 1;
                self.store
                    .insert_missed(&MissedContribution {
                        id: Uuid::new_v4(),
                        cycle_id: cycle.id,
                        member_id: member.id,
                        user_id: member.user_id,
                        reason: MISSED_DEADLINE_REASON.to_string(),
                        missed_at: now,
                    })
                    .await?;
                self.notifier
                    .notify(
                        member.user_id,
                        templates::CONTRIBUTION_MISSED,
                        json!({
                            "group_id": group.id,
                            "cycle_id": cycle.id,
                            "penalty": group.penalty_amount,
                        }),
                    )
                    .await;
            }
        }
        Ok(flipped)
    }

    /// Disburses the cycle's payout and advances the rotation. The payout
    /// claim is the serialization point: whichever caller claims the slot
    /// performs the credit, the status transitions and the rollover.
    async fn settle_cycle(
        &self,
        group: &ContributionGroup,
        cycle: &ContributionCycle,
        members: &[ContributionMember],
        now: DateTime<Utc>,
    ) -> EngineResult<SettlementOutcome> {
        self.fill_unclaimed_slots(cycle, members).await?;

        let total_cycles = group.total_cycles.unwrap_or(members.len() as i32);
        let next_number = cycle.cycle_number + 1;
        // A custom group whose next preset is missing or gone stale must
        // fail before any money moves, not after the payout is claimed.
        if next_number <= total_cycles && group.payout_policy == PayoutPolicy::Custom {
            let preset = self
                .store
                .custom_preset(group.id, next_number)
                .await?
                .ok_or(EngineError::CustomOrderNotSeeded {
                    group_id: group.id,
                    cycle_number: next_number,
                })?;
            let member_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
            if !policy::preset_covers(&preset.user_ids, &member_ids) {
                return Err(EngineError::Validation(
                    "custom order must cover every current member exactly once".to_string(),
                ));
            }
        }

        let Some(claimed) = self.store.claim_cycle_payout(cycle.id, now).await? else {
            return Ok(SettlementOutcome {
                recipient: None,
                net_amount: Decimal::ZERO,
                opened_next_cycle: false,
            });
        };

        let split = fees::cycle_payout(cycle.amount, members.len() as i32);
        self.ledger.credit(claimed.user_id, split.net).await?;
        self.record_fee(cycle.id, None, FeeKind::PlatformCycle, split.fee)
            .await?;

        let opened_next_cycle = if next_number <= total_cycles {
            self.store
                .set_cycle_status(cycle.id, CycleStatus::Closed)
                .await?;
            self.open_cycle(group, members, next_number, now).await?;
            true
        } else {
            self.store
                .set_cycle_status(cycle.id, CycleStatus::Completed)
                .await?;
            let mut closed = group.clone();
            closed.status = GroupStatus::Closed;
            self.store.update_group(&closed).await?;
            false
        };

        self.notifier
            .notify(
                claimed.user_id,
                templates::PAYOUT_DISBURSED,
                json!({
                    "group_id": group.id,
                    "cycle_id": cycle.id,
                    "amount": split.net,
                    "position": claimed.position,
                }),
            )
            .await;

        info!(
            group_id = %group.id,
            cycle_id = %cycle.id,
            recipient = %claimed.user_id,
            net = %split.net,
            fee = %split.fee,
            "cycle payout disbursed"
        );

        Ok(SettlementOutcome {
            recipient: Some(claimed.user_id),
            net_amount: split.net,
            opened_next_cycle,
        })
    }

    /// Spin cycles may reach settlement with unclaimed positions; hand the
    /// leftovers out at random so the payout sequence is a full permutation.
    async fn fill_unclaimed_slots(
        &self,
        cycle: &ContributionCycle,
        members: &[ContributionMember],
    ) -> EngineResult<()> {
        let member_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();

        // Concurrent spins can invalidate the snapshot mid-fill, so loop
        // until the sequence is complete. Every lost claim means a row landed
        // since the last read, so the order count strictly grows and the
        // loop terminates.
        loop {
            let orders = self.store.payout_orders_of_cycle(cycle.id).await?;
            if orders.len() >= members.len() {
                return Ok(());
            }

            let assigned: Vec<(Uuid, i32)> =
                orders.iter().map(|o| (o.user_id, o.position)).collect();
            let fill = {
                let mut rng = StdRng::from_entropy();
                policy::fill_remaining(&member_ids, &assigned, &mut rng)
            };

            for (user_id, position) in fill {
                let order = PayoutOrder {
                    id: Uuid::new_v4(),
                    cycle_id: cycle.id,
                    group_id: cycle.group_id,
                    user_id,
                    position,
                    status: PayoutOrderStatus::Pending,
                    paid_at: None,
                };
                let _ = self.store.try_claim_payout_slot(&order).await?;
            }
        }
    }

    async fn open_cycle(
        &self,
        group: &ContributionGroup,
        members: &[ContributionMember],
        cycle_number: i32,
        start_date: DateTime<Utc>,
    ) -> EngineResult<ContributionCycle> {
        let cycle = ContributionCycle {
            id: Uuid::new_v4(),
            group_id: group.id,
            cycle_number,
            start_date,
            end_date: schedule::cycle_end_date(start_date, group.frequency),
            amount: group.amount_per_member,
            status: CycleStatus::Open,
            created_at: Utc::now(),
        };

        let member_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
        let initial = {
            let mut rng = StdRng::from_entropy();
            policy::initial_order(group.payout_policy, &member_ids, cycle_number, &mut rng)
        };
        let sequence = match initial {
            InitialOrder::Assigned(sequence) => Some(sequence),
            InitialOrder::SelfService => None,
            InitialOrder::FromPreset => {
                let preset = self
                    .store
                    .custom_preset(group.id, cycle_number)
                    .await?
                    .ok_or(EngineError::CustomOrderNotSeeded {
                        group_id: group.id,
                        cycle_number,
                    })?;
                if !policy::preset_covers(&preset.user_ids, &member_ids) {
                    return Err(EngineError::Validation(
                        "custom order must cover every current member exactly once".to_string(),
                    ));
                }
                Some(preset.user_ids)
            }
        };

        self.store.insert_cycle(&cycle).await?;

        let orders: Option<Vec<PayoutOrder>> = sequence.map(|sequence| {
            sequence
                .iter()
                .enumerate()
                .map(|(index, user_id)| PayoutOrder {
                    id: Uuid::new_v4(),
                    cycle_id: cycle.id,
                    group_id: group.id,
                    user_id: *user_id,
                    position: index as i32 + 1,
                    status: PayoutOrderStatus::Pending,
                    paid_at: None,
                })
                .collect()
        });
        if let Some(orders) = &orders {
            self.store.insert_payout_orders(orders).await?;
        }

        let payments: Vec<ContributionPayment> = members
            .iter()
            .map(|member| ContributionPayment {
                id: Uuid::new_v4(),
                cycle_id: cycle.id,
                member_id: member.id,
                user_id: member.user_id,
                amount: cycle.amount,
                penalty: Decimal::ZERO,
                status: PaymentStatus::Pending,
                paid_at: None,
                is_auto_paid: false,
            })
            .collect();
        self.store.insert_payments(&payments).await?;

        for member in members {
            // Spin cycles have no slot yet; members learn their date when
            // they spin.
            let payout_date = orders
                .as_ref()
                .and_then(|orders| orders.iter().find(|o| o.user_id == member.user_id))
                .map(|o| schedule::payout_date(cycle.start_date, o.position, group.frequency));
            self.notifier
                .notify(
                    member.user_id,
                    templates::CYCLE_OPENED,
                    json!({
                        "group_id": group.id,
                        "cycle_id": cycle.id,
                        "cycle_number": cycle_number,
                        "amount": cycle.amount,
                        "end_date": cycle.end_date,
                        "payout_date": payout_date,
                    }),
                )
                .await;
        }

        info!(
            group_id = %group.id,
            cycle_id = %cycle.id,
            cycle_number,
            "cycle opened"
        );

        Ok(cycle)
    }

    async fn record_fee(
        &self,
        cycle_id: Uuid,
        user_id: Option<Uuid>,
        kind: FeeKind,
        amount: Decimal,
    ) -> EngineResult<()> {
        self.store
            .insert_fee(&FeeRecord {
                id: Uuid::new_v4(),
                cycle_id,
                user_id,
                kind,
                amount,
                recorded_at: Utc::now(),
            })
            .await
    }
}
