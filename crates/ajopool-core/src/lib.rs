pub mod errors;
pub mod fees;
pub mod models;
pub mod policy;
pub mod schedule;
pub mod storage;

pub use errors::{EngineError, EngineResult};
pub use fees::PayoutSplit;
pub use models::{
    ContributionCycle, ContributionGroup, ContributionMember, ContributionPayment,
    CustomOrderPreset, CycleStatus, FeeKind, FeeRecord, Frequency, GroupStatus,
    MissedContribution, PaymentStatus, PayoutOrder, PayoutOrderStatus, PayoutPolicy,
};
pub use storage::{Ledger, Notifier, Store};
