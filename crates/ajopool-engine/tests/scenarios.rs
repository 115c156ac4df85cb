use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use ajopool_core::errors::EngineError;
use ajopool_core::models::{
    CycleStatus, FeeKind, Frequency, GroupStatus, PaymentStatus, PayoutOrderStatus, PayoutPolicy,
};
use ajopool_core::storage::{Ledger, Store};
use ajopool_engine::{CycleEngine, GroupRegistry, MISSED_DEADLINE_REASON, NewGroup};
use ajopool_memstore::{InMemoryStore, RecordingNotifier};

struct Harness {
    store: Arc<InMemoryStore>,
    notifier: Arc<RecordingNotifier>,
    registry: GroupRegistry,
    engine: Arc<CycleEngine>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let registry = GroupRegistry::new(store.clone(), notifier.clone());
    let engine = Arc::new(CycleEngine::new(
        store.clone(),
        store.clone(),
        notifier.clone(),
    ));
    Harness {
        store,
        notifier,
        registry,
        engine,
    }
}

fn group_params(policy: PayoutPolicy, max_members: i32) -> NewGroup {
    NewGroup {
        name: "savings circle".to_string(),
        amount_per_member: Decimal::from(1000),
        frequency: Frequency::ThirtyDay,
        max_members,
        payout_policy: policy,
        penalty_amount: Decimal::from(100),
        total_cycles: None,
    }
}

async fn group_of_n(
    h: &Harness,
    policy: PayoutPolicy,
    member_count: usize,
) -> (Uuid, Vec<Uuid>) {
    let users: Vec<Uuid> = (0..member_count).map(|_| Uuid::new_v4()).collect();
    let group = h
        .registry
        .create_group(users[0], group_params(policy, member_count as i32))
        .await
        .unwrap();
    for user in users.iter().skip(1) {
        h.registry.join_group(group.id, *user).await.unwrap();
    }
    for user in &users {
        h.store.fund(*user, Decimal::from(10_000)).await;
    }
    (group.id, users)
}

#[tokio::test]
async fn rotational_cycle_settles_and_rolls_over() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;

    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();
    assert_eq!(cycle.cycle_number, 1);
    assert_eq!(cycle.amount, Decimal::from(1000));

    let first_order = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let positions: Vec<i32> = first_order.iter().map(|o| o.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
    let recipient = first_order[0].user_id;

    for user in &users {
        h.engine
            .make_contribution(cycle.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }

    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 1);
    assert_eq!(summary.cycles_opened, 1);
    assert!(summary.errors.is_empty());

    // pool 3000, fee 60, net 2940 to the slot-1 holder
    let expected = Decimal::from(10_000) - Decimal::from(1000) + Decimal::from(2940);
    assert_eq!(h.store.balance(recipient).await.unwrap(), expected);

    let fees = h.store.fees_of_cycle(cycle.id).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].kind, FeeKind::PlatformCycle);
    assert_eq!(fees[0].amount, Decimal::from(60));

    let settled = h.engine.cycle_by_id(cycle.id).await.unwrap().unwrap();
    assert_eq!(settled.status, CycleStatus::Closed);

    let next = h.store.open_cycle_of(group_id).await.unwrap().unwrap();
    assert_eq!(next.cycle_number, 2);
    assert_eq!(next.amount, Decimal::from(1000));

    // rotation: cycle 2's sequence is cycle 1's shifted left by one
    let second_order = h.engine.payout_order_of_cycle(next.id).await.unwrap();
    let first_seq: Vec<Uuid> = first_order.iter().map(|o| o.user_id).collect();
    let second_seq: Vec<Uuid> = second_order.iter().map(|o| o.user_id).collect();
    assert_eq!(
        second_seq,
        vec![first_seq[1], first_seq[2], first_seq[0]]
    );
}

#[tokio::test]
async fn late_contribution_carries_split_penalty() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;

    let start = Utc::now() - Duration::hours(43);
    let cycle = h.engine.create_cycle(group_id, Some(start)).await.unwrap();

    let payment = h
        .engine
        .make_contribution(cycle.id, users[1], Decimal::from(1000))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.penalty, Decimal::new(500_000, 4)); // 50.0000

    // 1000 + 50 debited
    assert_eq!(
        h.store.balance(users[1]).await.unwrap(),
        Decimal::from(10_000) - Decimal::from(1000) - Decimal::new(500_000, 4)
    );

    let fees = h.store.fees_of_cycle(cycle.id).await.unwrap();
    let platform: Decimal = fees
        .iter()
        .filter(|f| f.kind == FeeKind::PlatformPenalty)
        .map(|f| f.amount)
        .sum();
    let group_income: Decimal = fees
        .iter()
        .filter(|f| f.kind == FeeKind::GroupIncome)
        .map(|f| f.amount)
        .sum();
    assert_eq!(platform, Decimal::new(250_000, 4)); // 25.0000
    assert_eq!(group_income, Decimal::new(250_000, 4));
}

#[tokio::test]
async fn insufficient_balance_leaves_no_trace() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();

    let broke = users[1];
    // Drain the wallet below the cycle amount.
    h.store.debit(broke, Decimal::from(9_600)).await.unwrap();

    let err = h
        .engine
        .make_contribution(cycle.id, broke, Decimal::from(1000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));

    assert_eq!(h.store.balance(broke).await.unwrap(), Decimal::from(400));
    let payments = h.engine.payments_of_cycle(cycle.id).await.unwrap();
    let row = payments.iter().find(|p| p.user_id == broke).unwrap();
    assert_eq!(row.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn duplicate_contribution_rejected() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();

    h.engine
        .make_contribution(cycle.id, users[0], Decimal::from(1000))
        .await
        .unwrap();
    let err = h
        .engine
        .make_contribution(cycle.id, users[0], Decimal::from(1000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyPaid(_)));

    // Debited exactly once.
    assert_eq!(
        h.store.balance(users[0]).await.unwrap(),
        Decimal::from(9_000)
    );
}

#[tokio::test]
async fn contribution_before_window_rejected() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;
    let start = Utc::now() + Duration::days(3);
    let cycle = h.engine.create_cycle(group_id, Some(start)).await.unwrap();

    let err = h
        .engine
        .make_contribution(cycle.id, users[0], Decimal::from(1000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OutsideWindow(_)));
}

#[tokio::test]
async fn deadline_sweep_marks_missed_and_settlement_waits_for_full_terminal_count() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;

    let start = Utc::now() - Duration::days(31);
    let cycle = h.engine.create_cycle(group_id, Some(start)).await.unwrap();

    // Two of three pay inside the window.
    let pay_time = start + Duration::hours(2);
    for user in &users[..2] {
        h.engine
            .make_contribution_at(cycle.id, *user, Decimal::from(1000), pay_time)
            .await
            .unwrap();
    }

    // Before the deadline: two terminal payments are not enough to settle.
    let early = h.engine.tick_at(start + Duration::days(2)).await.unwrap();
    assert_eq!(early.cycles_settled, 0);
    assert_eq!(early.payments_marked_missed, 0);

    // After the deadline the third member is swept to missed, which
    // completes the terminal count and releases the payout.
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.payments_marked_missed, 1);
    assert_eq!(summary.cycles_settled, 1);

    let payments = h.engine.payments_of_cycle(cycle.id).await.unwrap();
    let missed = payments.iter().find(|p| p.user_id == users[2]).unwrap();
    assert_eq!(missed.status, PaymentStatus::Missed);
    assert_eq!(missed.penalty, Decimal::from(100));

    let missed_rows = h.store.missed_rows().await;
    assert_eq!(missed_rows.len(), 1);
    assert_eq!(missed_rows[0].reason, MISSED_DEADLINE_REASON);
    assert_eq!(missed_rows[0].user_id, users[2]);
}

#[tokio::test]
async fn join_at_capacity_rejected() {
    let h = harness();
    let creator = Uuid::new_v4();
    let group = h
        .registry
        .create_group(creator, group_params(PayoutPolicy::Random, 2))
        .await
        .unwrap();
    h.registry.join_group(group.id, Uuid::new_v4()).await.unwrap();

    let err = h
        .registry
        .join_group(group.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Capacity(_)));
    assert_eq!(h.registry.members_of(group.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sole_admin_cannot_leave_and_only_creator_updates() {
    let h = harness();
    let creator = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let group = h
        .registry
        .create_group(creator, group_params(PayoutPolicy::Random, 5))
        .await
        .unwrap();
    h.registry.join_group(group.id, outsider).await.unwrap();

    let err = h.registry.leave_group(group.id, creator).await.unwrap_err();
    assert!(matches!(err, EngineError::AdminCannotLeave(_)));

    let err = h
        .registry
        .update_group(group.id, outsider, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // Ordinary members leave freely.
    h.registry.leave_group(group.id, outsider).await.unwrap();
    assert_eq!(h.registry.members_of(group.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tick_without_new_data_changes_nothing() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();
    for user in &users {
        h.engine
            .make_contribution(cycle.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }
    h.engine.tick().await.unwrap();

    let balances_before: Vec<Decimal> = {
        let mut all = Vec::new();
        for user in &users {
            all.push(h.store.balance(*user).await.unwrap());
        }
        all
    };

    for _ in 0..3 {
        let summary = h.engine.tick().await.unwrap();
        assert_eq!(summary.cycles_settled, 0);
        assert_eq!(summary.cycles_opened, 0);
        assert_eq!(summary.payments_marked_missed, 0);
    }

    for (index, user) in users.iter().enumerate() {
        assert_eq!(
            h.store.balance(*user).await.unwrap(),
            balances_before[index]
        );
    }
}

#[tokio::test]
async fn concurrent_spins_form_a_permutation() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Spin, 4).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();

    // Spin policy seeds no slots at creation.
    assert!(h
        .engine
        .payout_order_of_cycle(cycle.id)
        .await
        .unwrap()
        .is_empty());

    let mut handles = Vec::new();
    for user in &users {
        let engine = h.engine.clone();
        let cycle_id = cycle.id;
        let user = *user;
        handles.push(tokio::spawn(async move {
            engine.spin_for_order(cycle_id, user).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let orders = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let mut positions: Vec<i32> = orders.iter().map(|o| o.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    let err = h
        .engine
        .spin_for_order(cycle.id, users[0])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadySpun { .. }));

    let err = h
        .engine
        .spin_for_order(cycle.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAMember { .. }));
}

#[tokio::test]
async fn close_cycle_and_tick_never_double_pay() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();
    for user in &users {
        h.engine
            .make_contribution(cycle.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }

    let outcome = h.engine.close_cycle(cycle.id).await.unwrap();
    let recipient = outcome.recipient.unwrap();
    // pool 2000, fee 40, net 1960
    assert_eq!(outcome.net_amount, Decimal::new(19_600_000, 4));
    let after_close = h.store.balance(recipient).await.unwrap();

    // The manual path already disbursed; the sweep must not pay again.
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 0);
    assert_eq!(h.store.balance(recipient).await.unwrap(), after_close);

    let err = h.engine.close_cycle(cycle.id).await.unwrap_err();
    assert!(matches!(err, EngineError::CycleNotOpen(_)));
}

#[tokio::test]
async fn close_cycle_requires_every_member_paid() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();
    h.engine
        .make_contribution(cycle.id, users[0], Decimal::from(1000))
        .await
        .unwrap();

    let err = h.engine.close_cycle(cycle.id).await.unwrap_err();
    assert!(matches!(err, EngineError::CycleNotSettled(_)));
}

#[tokio::test]
async fn rotation_completes_after_one_payout_per_member() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 2).await;

    let first = h.engine.create_cycle(group_id, None).await.unwrap();
    for user in &users {
        h.engine
            .make_contribution(first.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }
    h.engine.tick().await.unwrap();

    let second = h.store.open_cycle_of(group_id).await.unwrap().unwrap();
    assert_eq!(second.cycle_number, 2);
    for user in &users {
        h.engine
            .make_contribution(second.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 1);
    assert_eq!(summary.cycles_opened, 0);

    let done = h.engine.cycle_by_id(second.id).await.unwrap().unwrap();
    assert_eq!(done.status, CycleStatus::Completed);
    let group = h.registry.group(group_id).await.unwrap().unwrap();
    assert_eq!(group.status, GroupStatus::Closed);
    assert!(h.store.open_cycle_of(group_id).await.unwrap().is_none());

    // Both rotations paid out: each member was credited exactly once.
    let sequence = h.engine.payout_order_of_cycle(first.id).await.unwrap();
    let first_recipient = sequence[0].user_id;
    let other = users
        .iter()
        .copied()
        .find(|u| *u != first_recipient)
        .unwrap();
    let net = Decimal::new(19_600_000, 4); // 1960.0000 per cycle
    assert_eq!(
        h.store.balance(first_recipient).await.unwrap(),
        Decimal::from(10_000) - Decimal::from(2000) + net
    );
    assert_eq!(
        h.store.balance(other).await.unwrap(),
        Decimal::from(10_000) - Decimal::from(2000) + net
    );
}

#[tokio::test]
async fn custom_policy_follows_preset_and_fails_unseeded_rollover() {
    let h = harness();
    let creator = Uuid::new_v4();
    let other = Uuid::new_v4();
    let group = h
        .registry
        .create_group(creator, group_params(PayoutPolicy::Custom, 2))
        .await
        .unwrap();
    h.registry.join_group(group.id, other).await.unwrap();
    for user in [creator, other] {
        h.store.fund(user, Decimal::from(10_000)).await;
    }

    h.registry
        .seed_custom_order(group.id, creator, 1, vec![other, creator])
        .await
        .unwrap();

    let cycle = h.engine.create_cycle(group.id, None).await.unwrap();
    let orders = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let sequence: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
    assert_eq!(sequence, vec![other, creator]);

    for user in [creator, other] {
        h.engine
            .make_contribution(cycle.id, user, Decimal::from(1000))
            .await
            .unwrap();
    }

    // Cycle 2 has no seeded order: the group's settlement fails in isolation
    // and no money moves.
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(
        h.store.balance(other).await.unwrap(),
        Decimal::from(9_000)
    );

    h.registry
        .seed_custom_order(group.id, creator, 2, vec![creator, other])
        .await
        .unwrap();
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 1);
    assert_eq!(summary.cycles_opened, 1);
    // slot 1 of cycle 1 was `other`: 10000 - 1000 + 1960
    assert_eq!(
        h.store.balance(other).await.unwrap(),
        Decimal::new(109_600_000, 4)
    );
}

#[tokio::test]
async fn racing_duplicate_contributions_debit_exactly_once() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = h.engine.clone();
        let cycle_id = cycle.id;
        let payer = users[0];
        handles.push(tokio::spawn(async move {
            engine
                .make_contribution(cycle_id, payer, Decimal::from(1000))
                .await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, EngineError::AlreadyPaid(_))),
        }
    }
    assert_eq!(successes, 1);

    // The losers must leave the wallet alone: one contribution debited,
    // one settled row for the payer.
    assert_eq!(
        h.store.balance(users[0]).await.unwrap(),
        Decimal::from(9_000)
    );
    let payments = h.engine.payments_of_cycle(cycle.id).await.unwrap();
    let rows: Vec<_> = payments.iter().filter(|p| p.user_id == users[0]).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PaymentStatus::Success);
}

#[tokio::test]
async fn stale_custom_preset_blocks_settlement_before_money_moves() {
    let h = harness();
    let creator = Uuid::new_v4();
    let departing = Uuid::new_v4();
    let group = h
        .registry
        .create_group(creator, group_params(PayoutPolicy::Custom, 3))
        .await
        .unwrap();
    h.registry.join_group(group.id, departing).await.unwrap();
    for user in [creator, departing] {
        h.store.fund(user, Decimal::from(10_000)).await;
    }
    h.registry
        .seed_custom_order(group.id, creator, 1, vec![creator, departing])
        .await
        .unwrap();
    h.registry
        .seed_custom_order(group.id, creator, 2, vec![departing, creator])
        .await
        .unwrap();

    let cycle = h.engine.create_cycle(group.id, None).await.unwrap();
    for user in [creator, departing] {
        h.engine
            .make_contribution(cycle.id, user, Decimal::from(1000))
            .await
            .unwrap();
    }
    h.registry.leave_group(group.id, departing).await.unwrap();

    // Cycle 2's preset still names the departed member: the group's
    // settlement fails in isolation, with the payout unclaimed and the
    // cycle still open.
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 0);
    assert_eq!(summary.errors.len(), 1);
    let still_open = h.engine.cycle_by_id(cycle.id).await.unwrap().unwrap();
    assert_eq!(still_open.status, CycleStatus::Open);
    assert_eq!(
        h.store.balance(creator).await.unwrap(),
        Decimal::from(9_000)
    );
    assert!(h
        .engine
        .payout_order_of_cycle(cycle.id)
        .await
        .unwrap()
        .iter()
        .all(|o| o.status == PayoutOrderStatus::Pending));

    // Re-seeding for the members that remain releases the rollover.
    h.registry
        .seed_custom_order(group.id, creator, 2, vec![creator])
        .await
        .unwrap();
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 1);
    assert_eq!(summary.cycles_opened, 1);
    // cycle 1 slot 1 was the creator; with one remaining member the pool
    // is 1000, fee 20, net 980
    assert_eq!(
        h.store.balance(creator).await.unwrap(),
        Decimal::from(9_000) + Decimal::new(9_800_000, 4)
    );
}

#[tokio::test]
async fn cycle_opened_notification_carries_the_slot_payout_date() {
    let h = harness();
    let (group_id, _users) = group_of_n(&h, PayoutPolicy::Rotational, 3).await;
    let start = Utc::now() - Duration::hours(1);
    let cycle = h.engine.create_cycle(group_id, Some(start)).await.unwrap();

    let orders = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let second_slot = orders.iter().find(|o| o.position == 2).unwrap();

    let sent = h.notifier.sent().await;
    let opened = sent
        .iter()
        .find(|n| n.template == "cycle-opened" && n.user_id == second_slot.user_id)
        .unwrap();
    // Slot 2 is due one thirty-day period after cycle start.
    assert_eq!(
        opened.data["payout_date"],
        serde_json::json!(start + Duration::days(30))
    );
    assert_eq!(opened.data["cycle_number"], serde_json::json!(1));
}

#[tokio::test]
async fn slot_fill_races_concurrent_spins_to_a_full_permutation() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Spin, 4).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();
    for user in &users {
        h.engine
            .make_contribution(cycle.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }

    // Three members spin while the close path fills whatever is left.
    let mut handles = Vec::new();
    for user in &users[1..] {
        let engine = h.engine.clone();
        let cycle_id = cycle.id;
        let user = *user;
        handles.push(tokio::spawn(async move {
            engine.spin_for_order(cycle_id, user).await
        }));
    }
    let close = {
        let engine = h.engine.clone();
        let cycle_id = cycle.id;
        tokio::spawn(async move { engine.close_cycle(cycle_id).await })
    };

    for handle in handles {
        // A spin may lose outright to the fill; it must never leave a gap
        // in the sequence.
        match handle.await.unwrap() {
            Ok(_) => {}
            Err(
                EngineError::AlreadySpun { .. }
                | EngineError::AllPositionsAssigned(_)
                | EngineError::CycleNotOpen(_),
            ) => {}
            Err(other) => panic!("unexpected spin failure: {other}"),
        }
    }
    close.await.unwrap().unwrap();

    let orders = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let mut positions: Vec<i32> = orders.iter().map(|o| o.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3, 4]);
    let paid = orders
        .iter()
        .filter(|o| o.status == PayoutOrderStatus::Paid)
        .count();
    assert_eq!(paid, 1);
}

#[tokio::test]
async fn spin_cycle_settles_with_unclaimed_slots_filled() {
    let h = harness();
    let (group_id, users) = group_of_n(&h, PayoutPolicy::Spin, 3).await;
    let cycle = h.engine.create_cycle(group_id, None).await.unwrap();

    // Only one member bothers to spin.
    h.engine.spin_for_order(cycle.id, users[1]).await.unwrap();

    for user in &users {
        h.engine
            .make_contribution(cycle.id, *user, Decimal::from(1000))
            .await
            .unwrap();
    }
    let summary = h.engine.tick().await.unwrap();
    assert_eq!(summary.cycles_settled, 1);

    let orders = h.engine.payout_order_of_cycle(cycle.id).await.unwrap();
    let mut positions: Vec<i32> = orders.iter().map(|o| o.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2, 3]);

    let admins_notified = h
        .notifier
        .sent()
        .await
        .iter()
        .filter(|n| n.template == "payout-disbursed")
        .count();
    assert_eq!(admins_notified, 1);
}
