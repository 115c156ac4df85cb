pub mod engine;
pub mod registry;

pub use engine::{CycleEngine, MISSED_DEADLINE_REASON, SettlementOutcome, TickSummary};
pub use registry::{GroupPatch, GroupRegistry, NewGroup};
