use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ajopool_core::errors::{EngineError, EngineResult};
use ajopool_core::models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment,
    CustomOrderPreset, CycleStatus, FeeKind, FeeRecord, Frequency, GroupStatus,
    MissedContribution, PaymentStatus, PayoutOrder, PayoutOrderStatus, PayoutPolicy,
};
use ajopool_core::storage::Store;

fn db_err(err: sqlx::Error) -> EngineError {
    EngineError::Storage(err.into())
}

fn group_status_str(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Active => "active",
        GroupStatus::Closed => "closed",
    }
}

fn parse_group_status(value: &str) -> anyhow::Result<GroupStatus> {
    match value {
        "active" => Ok(GroupStatus::Active),
        "closed" => Ok(GroupStatus::Closed),
        other => Err(anyhow!("unsupported group status: {other}")),
    }
}

fn cycle_status_str(status: CycleStatus) -> &'static str {
    match status {
        CycleStatus::Open => "open",
        CycleStatus::Closed => "closed",
        CycleStatus::Completed => "completed",
    }
}

fn parse_cycle_status(value: &str) -> anyhow::Result<CycleStatus> {
    match value {
        "open" => Ok(CycleStatus::Open),
        "closed" => Ok(CycleStatus::Closed),
        "completed" => Ok(CycleStatus::Completed),
        other => Err(anyhow!("unsupported cycle status: {other}")),
    }
}

fn payment_status_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Success => "success",
        PaymentStatus::Missed => "missed",
    }
}

fn parse_payment_status(value: &str) -> anyhow::Result<PaymentStatus> {
    match value {
        "pending" => Ok(PaymentStatus::Pending),
        "success" => Ok(PaymentStatus::Success),
        "missed" => Ok(PaymentStatus::Missed),
        other => Err(anyhow!("unsupported payment status: {other}")),
    }
}

fn order_status_str(status: PayoutOrderStatus) -> &'static str {
    match status {
        PayoutOrderStatus::Pending => "pending",
        PayoutOrderStatus::Paid => "paid",
    }
}

fn parse_order_status(value: &str) -> anyhow::Result<PayoutOrderStatus> {
    match value {
        "pending" => Ok(PayoutOrderStatus::Pending),
        "paid" => Ok(PayoutOrderStatus::Paid),
        other => Err(anyhow!("unsupported payout order status: {other}")),
    }
}

fn fee_kind_str(kind: FeeKind) -> &'static str {
    match kind {
        FeeKind::PlatformCycle => "platform-cycle",
        FeeKind::PlatformPenalty => "platform-penalty",
        FeeKind::GroupIncome => "group-income",
    }
}

fn parse_fee_kind(value: &str) -> anyhow::Result<FeeKind> {
    match value {
        "platform-cycle" => Ok(FeeKind::PlatformCycle),
        "platform-penalty" => Ok(FeeKind::PlatformPenalty),
        "group-income" => Ok(FeeKind::GroupIncome),
        other => Err(anyhow!("unsupported fee kind: {other}")),
    }
}

fn group_from_row(row: &PgRow) -> EngineResult<ContributionGroup> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let frequency: String = row.try_get("frequency").map_err(db_err)?;
    let policy: String = row.try_get("payout_policy").map_err(db_err)?;
    Ok(ContributionGroup {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        amount_per_member: row.try_get("amount_per_member").map_err(db_err)?,
        frequency: Frequency::parse(&frequency),
        max_members: row.try_get("max_members").map_err(db_err)?,
        payout_policy: PayoutPolicy::parse(&policy)
            .ok_or_else(|| anyhow!("unsupported payout policy: {policy}"))?,
        penalty_amount: row.try_get("penalty_amount").map_err(db_err)?,
        total_cycles: row.try_get("total_cycles").map_err(db_err)?,
        status: parse_group_status(&status)?,
        created_by: row.try_get("created_by").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn member_from_row(row: &PgRow) -> EngineResult<ContributionMember> {
    Ok(ContributionMember {
        id: row.try_get("id").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        is_admin: row.try_get("is_admin").map_err(db_err)?,
        joined_at: row.try_get("joined_at").map_err(db_err)?,
    })
}

fn cycle_from_row(row: &PgRow) -> EngineResult<ContributionCycle> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(ContributionCycle {
        id: row.try_get("id").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        cycle_number: row.try_get("cycle_number").map_err(db_err)?,
        start_date: row.try_get("start_date").map_err(db_err)?,
        end_date: row.try_get("end_date").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        status: parse_cycle_status(&status)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn payment_from_row(row: &PgRow) -> EngineResult<ContributionPayment> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(ContributionPayment {
        id: row.try_get("id").map_err(db_err)?,
        cycle_id: row.try_get("cycle_id").map_err(db_err)?,
        member_id: row.try_get("member_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        penalty: row.try_get("penalty").map_err(db_err)?,
        status: parse_payment_status(&status)?,
        paid_at: row.try_get("paid_at").map_err(db_err)?,
        is_auto_paid: row.try_get("is_auto_paid").map_err(db_err)?,
    })
}

fn order_from_row(row: &PgRow) -> EngineResult<PayoutOrder> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(PayoutOrder {
        id: row.try_get("id").map_err(db_err)?,
        cycle_id: row.try_get("cycle_id").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        position: row.try_get("position").map_err(db_err)?,
        status: parse_order_status(&status)?,
        paid_at: row.try_get("paid_at").map_err(db_err)?,
    })
}

fn fee_from_row(row: &PgRow) -> EngineResult<FeeRecord> {
    let kind: String = row.try_get("kind").map_err(db_err)?;
    Ok(FeeRecord {
        id: row.try_get("id").map_err(db_err)?,
        cycle_id: row.try_get("cycle_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        kind: parse_fee_kind(&kind)?,
        amount: row.try_get("amount").map_err(db_err)?,
        recorded_at: row.try_get("recorded_at").map_err(db_err)?,
    })
}

/// Postgres [`Store`]. The check-then-write pairs the engine relies on run
/// inside transactions with row locks; uniqueness races fall through to the
/// table's unique indexes.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_group(&self, group: &ContributionGroup) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contribution_groups (
                id, name, amount_per_member, frequency, max_members, payout_policy,
                penalty_amount, total_cycles, status, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.amount_per_member)
        .bind(group.frequency.as_str())
        .bind(group.max_members)
        .bind(group.payout_policy.as_str())
        .bind(group.penalty_amount)
        .bind(group.total_cycles)
        .bind(group_status_str(group.status))
        .bind(group.created_by)
        .bind(group.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn group(&self, group_id: Uuid) -> EngineResult<Option<ContributionGroup>> {
        let row = sqlx::query("SELECT * FROM contribution_groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn update_group(&self, group: &ContributionGroup) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE contribution_groups
            SET name = $2,
                amount_per_member = $3,
                frequency = $4,
                max_members = $5,
                payout_policy = $6,
                penalty_amount = $7,
                total_cycles = $8,
                status = $9
            WHERE id = $1
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.amount_per_member)
        .bind(group.frequency.as_str())
        .bind(group.max_members)
        .bind(group.payout_policy.as_str())
        .bind(group.penalty_amount)
        .bind(group.total_cycles)
        .bind(group_status_str(group.status))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(EngineError::GroupNotFound(group.id));
        }
        Ok(())
    }

    async fn group_ids_with_open_cycles(&self) -> EngineResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT DISTINCT group_id FROM contribution_cycles WHERE status = 'open' ORDER BY group_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("group_id").map_err(db_err)?);
        }
        Ok(ids)
    }

    async fn insert_member(
        &self,
        member: &ContributionMember,
        max_members: i32,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock the group row so capacity checks serialize per group.
        let group_row = sqlx::query("SELECT id FROM contribution_groups WHERE id = $1 FOR UPDATE")
            .bind(member.group_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if group_row.is_none() {
            return Err(EngineError::GroupNotFound(member.group_id));
        }

        let duplicate = sqlx::query(
            "SELECT 1 FROM contribution_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(member.group_id)
        .bind(member.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if duplicate.is_some() {
            return Err(EngineError::AlreadyMember {
                group_id: member.group_id,
                user_id: member.user_id,
            });
        }

        let count_row =
            sqlx::query("SELECT COUNT(*) AS member_count FROM contribution_members WHERE group_id = $1")
                .bind(member.group_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
        let member_count: i64 = count_row.try_get("member_count").map_err(db_err)?;
        if member_count >= i64::from(max_members) {
            return Err(EngineError::Capacity(member.group_id));
        }

        sqlx::query(
            r#"
            INSERT INTO contribution_members (id, group_id, user_id, is_admin, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(member.id)
        .bind(member.group_id)
        .bind(member.user_id)
        .bind(member.is_admin)
        .bind(member.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ContributionMember>> {
        let row = sqlx::query(
            "SELECT * FROM contribution_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn members_of(&self, group_id: Uuid) -> EngineResult<Vec<ContributionMember>> {
        let rows = sqlx::query(
            "SELECT * FROM contribution_members WHERE group_id = $1 ORDER BY joined_at, id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut members = Vec::with_capacity(rows.len());
        for row in &rows {
            members.push(member_from_row(row)?);
        }
        Ok(members)
    }

    async fn delete_member(&self, member_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM contribution_members WHERE id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_cycle(&self, cycle: &ContributionCycle) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock the group row: only one open cycle per group.
        sqlx::query("SELECT id FROM contribution_groups WHERE id = $1 FOR UPDATE")
            .bind(cycle.group_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(EngineError::GroupNotFound(cycle.group_id))?;

        let open = sqlx::query(
            "SELECT 1 FROM contribution_cycles WHERE group_id = $1 AND status = 'open'",
        )
        .bind(cycle.group_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if open.is_some() {
            return Err(EngineError::OpenCycleExists(cycle.group_id));
        }

        sqlx::query(
            r#"
            INSERT INTO contribution_cycles (
                id, group_id, cycle_number, start_date, end_date, amount, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.group_id)
        .bind(cycle.cycle_number)
        .bind(cycle.start_date)
        .bind(cycle.end_date)
        .bind(cycle.amount)
        .bind(cycle_status_str(cycle.status))
        .bind(cycle.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn cycle(&self, cycle_id: Uuid) -> EngineResult<Option<ContributionCycle>> {
        let row = sqlx::query("SELECT * FROM contribution_cycles WHERE id = $1")
            .bind(cycle_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(cycle_from_row).transpose()
    }

    async fn open_cycle_of(&self, group_id: Uuid) -> EngineResult<Option<ContributionCycle>> {
        let row = sqlx::query(
            "SELECT * FROM contribution_cycles WHERE group_id = $1 AND status = 'open'",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(cycle_from_row).transpose()
    }

    async fn last_cycle_number(&self, group_id: Uuid) -> EngineResult<i32> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(cycle_number), 0) AS last_number FROM contribution_cycles WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_get("last_number").map_err(db_err)
    }

    async fn set_cycle_status(&self, cycle_id: Uuid, status: CycleStatus) -> EngineResult<()> {
        let result = sqlx::query("UPDATE contribution_cycles SET status = $2 WHERE id = $1")
            .bind(cycle_id)
            .bind(cycle_status_str(status))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::CycleNotFound(cycle_id));
        }
        Ok(())
    }

    async fn insert_payments(&self, payments: &[ContributionPayment]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for payment in payments {
            sqlx::query(
                r#"
                INSERT INTO contribution_payments (
                    id, cycle_id, member_id, user_id, amount, penalty, status, paid_at, is_auto_paid
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(payment.id)
            .bind(payment.cycle_id)
            .bind(payment.member_id)
            .bind(payment.user_id)
            .bind(payment.amount)
            .bind(payment.penalty)
            .bind(payment_status_str(payment.status))
            .bind(payment.paid_at)
            .bind(payment.is_auto_paid)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn insert_payment(&self, payment: &ContributionPayment) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO contribution_payments (
                id, cycle_id, member_id, user_id, amount, penalty, status, paid_at, is_auto_paid
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (cycle_id, member_id) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(payment.cycle_id)
        .bind(payment.member_id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.penalty)
        .bind(payment_status_str(payment.status))
        .bind(payment.paid_at)
        .bind(payment.is_auto_paid)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
    ) -> EngineResult<Option<ContributionPayment>> {
        let row = sqlx::query(
            "SELECT * FROM contribution_payments WHERE cycle_id = $1 AND member_id = $2",
        )
        .bind(cycle_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn payments_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<ContributionPayment>> {
        let rows = sqlx::query("SELECT * FROM contribution_payments WHERE cycle_id = $1")
            .bind(cycle_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut payments = Vec::with_capacity(rows.len());
        for row in &rows {
            payments.push(payment_from_row(row)?);
        }
        Ok(payments)
    }

    async fn debit_and_settle(
        &self,
        payment: &ContributionPayment,
        total: Decimal,
    ) -> EngineResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Claim the settlement first: pending -> success flip, or a fresh
        // row when none was seeded for this member.
        let flipped = sqlx::query(
            r#"
            UPDATE contribution_payments
            SET status = 'success', penalty = $3, paid_at = $4
            WHERE cycle_id = $1 AND member_id = $2 AND status = 'pending'
            "#,
        )
        .bind(payment.cycle_id)
        .bind(payment.member_id)
        .bind(payment.penalty)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if flipped.rows_affected() == 0 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO contribution_payments (
                    id, cycle_id, member_id, user_id, amount, penalty, status, paid_at, is_auto_paid
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (cycle_id, member_id) DO NOTHING
                "#,
            )
            .bind(payment.id)
            .bind(payment.cycle_id)
            .bind(payment.member_id)
            .bind(payment.user_id)
            .bind(payment.amount)
            .bind(payment.penalty)
            .bind(payment_status_str(payment.status))
            .bind(payment.paid_at)
            .bind(payment.is_auto_paid)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if inserted.rows_affected() == 0 {
                // Already settled or missed; dropping the transaction undoes
                // nothing because nothing was written.
                return Ok(false);
            }
        }

        // Wallets are shared with PgLedger; debiting inside this transaction
        // is what makes the payment row and the balance move together.
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(payment.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let available: Decimal = match row {
            Some(row) => row.try_get("balance").map_err(db_err)?,
            None => Decimal::ZERO,
        };
        if available < total {
            // Rolls back the settlement claim above.
            return Err(EngineError::InsufficientBalance {
                required: total,
                available,
            });
        }
        sqlx::query("UPDATE wallets SET balance = balance - $2, updated_at = $3 WHERE user_id = $1")
            .bind(payment.user_id)
            .bind(total)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn miss_payment(
        &self,
        cycle_id: Uuid,
        member_id: Uuid,
        penalty: Decimal,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contribution_payments
            SET status = 'missed', penalty = $3
            WHERE cycle_id = $1 AND member_id = $2 AND status = 'pending'
            "#,
        )
        .bind(cycle_id)
        .bind(member_id)
        .bind(penalty)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_payout_orders(&self, orders: &[PayoutOrder]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO payout_orders (
                    id, cycle_id, group_id, user_id, "position", status, paid_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(order.cycle_id)
            .bind(order.group_id)
            .bind(order.user_id)
            .bind(order.position)
            .bind(order_status_str(order.status))
            .bind(order.paid_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn payout_orders_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<PayoutOrder>> {
        let rows = sqlx::query(
            r#"SELECT * FROM payout_orders WHERE cycle_id = $1 ORDER BY "position""#,
        )
        .bind(cycle_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(order_from_row(row)?);
        }
        Ok(orders)
    }

    async fn try_claim_payout_slot(&self, order: &PayoutOrder) -> EngineResult<bool> {
        // Unique indexes on (cycle_id, "position") and (cycle_id, user_id)
        // turn a lost race into an affected-row count of zero.
        let result = sqlx::query(
            r#"
            INSERT INTO payout_orders (
                id, cycle_id, group_id, user_id, "position", status, paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(order.cycle_id)
        .bind(order.group_id)
        .bind(order.user_id)
        .bind(order.position)
        .bind(order_status_str(order.status))
        .bind(order.paid_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_cycle_payout(
        &self,
        cycle_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> EngineResult<Option<PayoutOrder>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock every slot of the cycle; competing settlers queue up here and
        // see the winner's paid row when they get through.
        let rows = sqlx::query(
            r#"SELECT * FROM payout_orders WHERE cycle_id = $1 ORDER BY "position" FOR UPDATE"#,
        )
        .bind(cycle_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(order_from_row(row)?);
        }
        if orders.is_empty()
            || orders
                .iter()
                .any(|order| order.status == PayoutOrderStatus::Paid)
        {
            return Ok(None);
        }

        let mut claimed = orders.remove(0);
        sqlx::query(
            "UPDATE payout_orders SET status = 'paid', paid_at = $2 WHERE id = $1 AND status <> 'paid'",
        )
        .bind(claimed.id)
        .bind(paid_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        claimed.status = PayoutOrderStatus::Paid;
        claimed.paid_at = Some(paid_at);
        Ok(Some(claimed))
    }

    async fn insert_missed(&self, missed: &MissedContribution) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO missed_contributions (id, cycle_id, member_id, user_id, reason, missed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(missed.id)
        .bind(missed.cycle_id)
        .bind(missed.member_id)
        .bind(missed.user_id)
        .bind(&missed.reason)
        .bind(missed.missed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_fee(&self, fee: &FeeRecord) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fee_records (id, cycle_id, user_id, kind, amount, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(fee.id)
        .bind(fee.cycle_id)
        .bind(fee.user_id)
        .bind(fee_kind_str(fee.kind))
        .bind(fee.amount)
        .bind(fee.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn fees_of_cycle(&self, cycle_id: Uuid) -> EngineResult<Vec<FeeRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM fee_records WHERE cycle_id = $1 ORDER BY recorded_at",
        )
        .bind(cycle_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut fees = Vec::with_capacity(rows.len());
        for row in &rows {
            fees.push(fee_from_row(row)?);
        }
        Ok(fees)
    }

    async fn upsert_custom_preset(&self, preset: &CustomOrderPreset) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO custom_order_presets (group_id, cycle_number, user_ids)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id, cycle_number)
            DO UPDATE SET user_ids = EXCLUDED.user_ids
            "#,
        )
        .bind(preset.group_id)
        .bind(preset.cycle_number)
        .bind(&preset.user_ids)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn custom_preset(
        &self,
        group_id: Uuid,
        cycle_number: i32,
    ) -> EngineResult<Option<CustomOrderPreset>> {
        let row = sqlx::query(
            "SELECT user_ids FROM custom_order_presets WHERE group_id = $1 AND cycle_number = $2",
        )
        .bind(group_id)
        .bind(cycle_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let user_ids: Vec<Uuid> = row.try_get("user_ids").map_err(db_err)?;
                Ok(Some(CustomOrderPreset {
                    group_id,
                    cycle_number,
                    user_ids,
                }))
            }
            None => Ok(None),
        }
    }
}
