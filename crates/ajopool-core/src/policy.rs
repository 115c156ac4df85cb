use rand::Rng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::models::PayoutPolicy;

/// How payout slots for a freshly created cycle get their holders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialOrder {
    /// Slot `i + 1` goes to `user_ids[i]`.
    Assigned(Vec<Uuid>),
    /// No slots at creation; members claim their own via spin.
    SelfService,
    /// The caller resolves a pre-seeded sequence for this cycle number.
    FromPreset,
}

/// Initial payout sequence for a cycle. `member_ids` must be in join order;
/// the rotational policy depends on it.
pub fn initial_order<R: Rng>(
    policy: PayoutPolicy,
    member_ids: &[Uuid],
    cycle_number: i32,
    rng: &mut R,
) -> InitialOrder {
    match policy {
        PayoutPolicy::Random => {
            let mut shuffled = member_ids.to_vec();
            shuffled.shuffle(rng);
            InitialOrder::Assigned(shuffled)
        }
        PayoutPolicy::Rotational => {
            let mut rotated = member_ids.to_vec();
            if !rotated.is_empty() {
                let by = (cycle_number - 1).rem_euclid(rotated.len() as i32) as usize;
                rotated.rotate_left(by);
            }
            InitialOrder::Assigned(rotated)
        }
        PayoutPolicy::Spin => InitialOrder::SelfService,
        PayoutPolicy::Custom => InitialOrder::FromPreset,
    }
}

/// Uniform pick among the positions 1..=member_count not yet taken.
pub fn pick_free_position<R: Rng>(
    taken: &[i32],
    member_count: i32,
    rng: &mut R,
) -> Option<i32> {
    let free: Vec<i32> = (1..=member_count)
        .filter(|position| !taken.contains(position))
        .collect();
    free.choose(rng).copied()
}

/// True when `user_ids` holds exactly the current member set, each member
/// once. Pre-seeded custom sequences go stale when membership changes.
pub fn preset_covers(user_ids: &[Uuid], member_ids: &[Uuid]) -> bool {
    let mut seeded = user_ids.to_vec();
    seeded.sort();
    let mut current = member_ids.to_vec();
    current.sort();
    seeded == current
}

/// Assign every member without a slot to a free position, uniformly at
/// random. Used to complete spin cycles whose members never spun.
pub fn fill_remaining<R: Rng>(
    member_ids: &[Uuid],
    assigned: &[(Uuid, i32)],
    rng: &mut R,
) -> Vec<(Uuid, i32)> {
    let member_count = member_ids.len() as i32;
    let mut unassigned: Vec<Uuid> = member_ids
        .iter()
        .copied()
        .filter(|id| !assigned.iter().any(|(user, _)| user == id))
        .collect();
    unassigned.shuffle(rng);

    let free: Vec<i32> = (1..=member_count)
        .filter(|position| !assigned.iter().any(|(_, taken)| taken == position))
        .collect();

    unassigned.into_iter().zip(free).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn members(count: usize) -> Vec<Uuid> {
        (0..count).map(|_| Uuid::new_v4()).collect()
    }

    fn assert_permutation(ids: &[Uuid], original: &[Uuid]) {
        assert_eq!(ids.len(), original.len());
        for id in original {
            assert_eq!(ids.iter().filter(|m| *m == id).count(), 1);
        }
    }

    #[test]
    fn random_order_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in [1, 2, 3, 5, 12] {
            let ids = members(count);
            match initial_order(PayoutPolicy::Random, &ids, 1, &mut rng) {
                InitialOrder::Assigned(order) => assert_permutation(&order, &ids),
                other => panic!("unexpected order: {other:?}"),
            }
        }
    }

    #[test]
    fn rotational_rotates_by_cycle_number() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids = members(4);

        let InitialOrder::Assigned(first) =
            initial_order(PayoutPolicy::Rotational, &ids, 1, &mut rng)
        else {
            panic!("rotational must assign")
        };
        assert_eq!(first, ids);

        let InitialOrder::Assigned(third) =
            initial_order(PayoutPolicy::Rotational, &ids, 3, &mut rng)
        else {
            panic!("rotational must assign")
        };
        assert_eq!(third, vec![ids[2], ids[3], ids[0], ids[1]]);

        // A full revolution lands back on the join order.
        let InitialOrder::Assigned(fifth) =
            initial_order(PayoutPolicy::Rotational, &ids, 5, &mut rng)
        else {
            panic!("rotational must assign")
        };
        assert_eq!(fifth, ids);
    }

    #[test]
    fn spin_and_custom_assign_nothing_up_front() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids = members(3);
        assert_eq!(
            initial_order(PayoutPolicy::Spin, &ids, 1, &mut rng),
            InitialOrder::SelfService
        );
        assert_eq!(
            initial_order(PayoutPolicy::Custom, &ids, 1, &mut rng),
            InitialOrder::FromPreset
        );
    }

    #[test]
    fn pick_free_position_avoids_taken() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let position = pick_free_position(&[1, 3], 4, &mut rng).unwrap();
            assert!(position == 2 || position == 4);
        }
        assert_eq!(pick_free_position(&[1, 2, 3], 3, &mut rng), None);
    }

    #[test]
    fn preset_covers_rejects_stale_and_partial_sequences() {
        let ids = members(3);
        let mut reordered = vec![ids[2], ids[0], ids[1]];
        assert!(preset_covers(&reordered, &ids));

        reordered.pop();
        assert!(!preset_covers(&reordered, &ids));
        assert!(!preset_covers(&[ids[0], ids[0], ids[1]], &ids));

        let departed = &ids[..2];
        assert!(!preset_covers(&ids, departed));
    }

    #[test]
    fn fill_remaining_completes_the_permutation() {
        let mut rng = StdRng::seed_from_u64(13);
        let ids = members(5);
        let assigned = vec![(ids[1], 2), (ids[4], 5)];

        let filled = fill_remaining(&ids, &assigned, &mut rng);
        assert_eq!(filled.len(), 3);

        let mut positions: Vec<i32> = assigned
            .iter()
            .chain(filled.iter())
            .map(|(_, position)| *position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);

        let holders: Vec<Uuid> = assigned
            .iter()
            .chain(filled.iter())
            .map(|(user, _)| *user)
            .collect();
        assert_permutation(&holders, &ids);
    }
}
