use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("group {0} not found")]
    GroupNotFound(Uuid),
    #[error("cycle {0} not found")]
    CycleNotFound(Uuid),
    #[error("user {user_id} is already a member of group {group_id}")]
    AlreadyMember { group_id: Uuid, user_id: Uuid },
    #[error("user {user_id} is not a member of group {group_id}")]
    NotAMember { group_id: Uuid, user_id: Uuid },
    #[error("group {0} is at member capacity")]
    Capacity(Uuid),
    #[error("sole admin cannot leave group {0}")]
    AdminCannotLeave(Uuid),
    #[error("only the group creator may perform this action on group {0}")]
    Forbidden(Uuid),
    #[error("cycle {0} is not accepting contributions right now")]
    OutsideWindow(Uuid),
    #[error("member has already settled cycle {0}")]
    AlreadyPaid(Uuid),
    #[error("user {user_id} already holds a payout slot in cycle {cycle_id}")]
    AlreadySpun { cycle_id: Uuid, user_id: Uuid },
    #[error("all payout positions in cycle {0} are assigned")]
    AllPositionsAssigned(Uuid),
    #[error("group {0} already has an open cycle")]
    OpenCycleExists(Uuid),
    #[error("no custom payout order seeded for group {group_id} cycle {cycle_number}")]
    CustomOrderNotSeeded { group_id: Uuid, cycle_number: i32 },
    #[error("cycle {0} is not open")]
    CycleNotOpen(Uuid),
    #[error("cycle {0} is not fully settled")]
    CycleNotSettled(Uuid),
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
