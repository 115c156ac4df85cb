use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Platform cut of every cycle payout.
pub fn platform_fee_rate() -> Decimal {
    Decimal::new(200, 4) // 2.00%
}

/// Surcharge applied to contributions made more than 24h into a cycle.
pub fn late_penalty_rate() -> Decimal {
    Decimal::new(500, 4) // 5.00%
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutSplit {
    pub pool: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
}

/// Pool, platform fee and net recipient credit for a settled cycle.
/// `fee + net` recomposes `pool` exactly.
pub fn cycle_payout(amount_per_member: Decimal, member_count: i32) -> PayoutSplit {
    let pool = amount_per_member * Decimal::from(member_count);
    let fee = pool * platform_fee_rate();
    PayoutSplit {
        pool,
        fee,
        net: pool - fee,
    }
}

pub fn late_penalty(amount: Decimal) -> Decimal {
    amount * late_penalty_rate()
}

/// Even split of a late penalty between the platform and the group.
/// The second half is the remainder, so the two always recompose the penalty.
pub fn split_penalty(penalty: Decimal) -> (Decimal, Decimal) {
    let to_platform = penalty / Decimal::from(2);
    (to_platform, penalty - to_platform)
}
