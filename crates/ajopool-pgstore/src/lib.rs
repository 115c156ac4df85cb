mod ledger;
mod store;

pub use ledger::PgLedger;
pub use store::PgStore;
