pub mod config;
pub mod contracts;
pub mod db;
pub mod notify;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    CloseCycleResponse, ContributionRequest, CreateCycleRequest, CreateGroupRequest, CycleView,
    GroupView, JoinGroupRequest, LeaveGroupRequest, MemberView, NotificationEvent,
    PaymentView, PayoutOrderView, SeedCustomOrderRequest, SpinRequest, UpdateGroupRequest,
};
pub use db::connect_database;
pub use notify::{NOTIFICATIONS_CHANNEL, RedisNotifier};
pub use redis_bus::RedisBus;
