use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use ajopool_core::errors::EngineError;
use ajopool_core::models::{Frequency, PayoutPolicy};
use ajopool_engine::{CycleEngine, GroupPatch, GroupRegistry, NewGroup, TickSummary};
use ajopool_pgstore::{PgLedger, PgStore};
use ajopool_platform::{
    CloseCycleResponse, ContributionRequest, CreateCycleRequest, CreateGroupRequest, CycleView,
    GroupView, JoinGroupRequest, LeaveGroupRequest, MemberView, PaymentView, PayoutOrderView,
    RedisBus, RedisNotifier, SeedCustomOrderRequest, ServiceConfig, SpinRequest,
    UpdateGroupRequest, connect_database,
};

#[derive(Clone)]
struct AppState {
    registry: Arc<GroupRegistry>,
    engine: Arc<CycleEngine>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ajopool_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let ledger = Arc::new(PgLedger::new(pool));
    let notifier = Arc::new(RedisNotifier::new(redis));

    let state = AppState {
        registry: Arc::new(GroupRegistry::new(store.clone(), notifier.clone())),
        engine: Arc::new(CycleEngine::new(store, ledger, notifier)),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/groups", post(create_group))
        .route("/groups/{group_id}", get(get_group))
        .route("/groups/{group_id}/join", post(join_group))
        .route("/groups/{group_id}/leave", post(leave_group))
        .route("/groups/{group_id}/update", post(update_group))
        .route("/groups/{group_id}/members", get(list_members))
        .route("/groups/{group_id}/custom-order", post(seed_custom_order))
        .route("/groups/{group_id}/cycles", post(create_cycle))
        .route("/cycles/{cycle_id}", get(get_cycle))
        .route("/cycles/{cycle_id}/contributions", post(make_contribution))
        .route("/cycles/{cycle_id}/spin", post(spin_for_order))
        .route("/cycles/{cycle_id}/close", post(close_cycle))
        .route("/cycles/{cycle_id}/payout-order", get(list_payout_order))
        .route("/cycles/{cycle_id}/payments", get(list_payments))
        .route("/admin/tick", post(run_tick))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_group(
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<Json<GroupView>, (StatusCode, String)> {
    let payout_policy = PayoutPolicy::parse(&payload.payout_policy).ok_or((
        StatusCode::BAD_REQUEST,
        format!("unsupported payout_policy: {}", payload.payout_policy),
    ))?;

    let group = state
        .registry
        .create_group(
            payload.creator_id,
            NewGroup {
                name: payload.name,
                amount_per_member: payload.amount_per_member,
                frequency: Frequency::parse(&payload.frequency),
                max_members: payload.max_members,
                payout_policy,
                penalty_amount: payload.penalty_amount,
                total_cycles: payload.total_cycles,
            },
        )
        .await
        .map_err(engine_error)?;

    Ok(Json(group.into()))
}

async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupView>, (StatusCode, String)> {
    let group = state
        .registry
        .group(group_id)
        .await
        .map_err(engine_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("group {group_id} not found")))?;
    Ok(Json(group.into()))
}

async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<JoinGroupRequest>,
) -> Result<Json<MemberView>, (StatusCode, String)> {
    let member = state
        .registry
        .join_group(group_id, payload.user_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(member.into()))
}

async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<LeaveGroupRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .registry
        .leave_group(group_id, payload.user_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({ "left": true })))
}

async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<UpdateGroupRequest>,
) -> Result<Json<GroupView>, (StatusCode, String)> {
    let frequency = match payload.frequency {
        Some(raw) => Some(Frequency::parse(&raw)),
        None => None,
    };
    let group = state
        .registry
        .update_group(
            group_id,
            payload.actor_id,
            GroupPatch {
                name: payload.name,
                amount_per_member: payload.amount_per_member,
                frequency,
                max_members: payload.max_members,
                penalty_amount: payload.penalty_amount,
                total_cycles: payload.total_cycles,
            },
        )
        .await
        .map_err(engine_error)?;
    Ok(Json(group.into()))
}

async fn list_members(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<MemberView>>, (StatusCode, String)> {
    let members = state
        .registry
        .members_of(group_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(members.into_iter().map(MemberView::from).collect()))
}

async fn seed_custom_order(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<SeedCustomOrderRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .registry
        .seed_custom_order(
            group_id,
            payload.actor_id,
            payload.cycle_number,
            payload.user_ids,
        )
        .await
        .map_err(engine_error)?;
    Ok(Json(json!({ "seeded": true, "cycle_number": payload.cycle_number })))
}

async fn create_cycle(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<CreateCycleRequest>,
) -> Result<Json<CycleView>, (StatusCode, String)> {
    let cycle = state
        .engine
        .create_cycle(group_id, payload.start_date)
        .await
        .map_err(engine_error)?;
    Ok(Json(cycle.into()))
}

async fn get_cycle(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<CycleView>, (StatusCode, String)> {
    let cycle = state
        .engine
        .cycle_by_id(cycle_id)
        .await
        .map_err(engine_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("cycle {cycle_id} not found")))?;
    Ok(Json(cycle.into()))
}

async fn make_contribution(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
    Json(payload): Json<ContributionRequest>,
) -> Result<Json<PaymentView>, (StatusCode, String)> {
    let payment = state
        .engine
        .make_contribution(cycle_id, payload.user_id, payload.amount)
        .await
        .map_err(engine_error)?;
    Ok(Json(payment.into()))
}

async fn spin_for_order(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
    Json(payload): Json<SpinRequest>,
) -> Result<Json<PayoutOrderView>, (StatusCode, String)> {
    let order = state
        .engine
        .spin_for_order(cycle_id, payload.user_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(order.into()))
}

async fn close_cycle(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<CloseCycleResponse>, (StatusCode, String)> {
    let outcome = state
        .engine
        .close_cycle(cycle_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(CloseCycleResponse {
        cycle_id,
        recipient: outcome.recipient,
        net_amount: outcome.net_amount,
        opened_next_cycle: outcome.opened_next_cycle,
    }))
}

async fn list_payout_order(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<Vec<PayoutOrderView>>, (StatusCode, String)> {
    let orders = state
        .engine
        .payout_order_of_cycle(cycle_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(orders.into_iter().map(PayoutOrderView::from).collect()))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentView>>, (StatusCode, String)> {
    let payments = state
        .engine
        .payments_of_cycle(cycle_id)
        .await
        .map_err(engine_error)?;
    Ok(Json(payments.into_iter().map(PaymentView::from).collect()))
}

async fn run_tick(
    State(state): State<AppState>,
) -> Result<Json<TickSummary>, (StatusCode, String)> {
    let summary = state.engine.tick().await.map_err(engine_error)?;
    Ok(Json(summary))
}

fn engine_error(err: EngineError) -> (StatusCode, String) {
    let status = match &err {
        EngineError::Validation(_) | EngineError::CustomOrderNotSeeded { .. } => {
            StatusCode::BAD_REQUEST
        }
        EngineError::GroupNotFound(_)
        | EngineError::CycleNotFound(_)
        | EngineError::NotAMember { .. } => StatusCode::NOT_FOUND,
        EngineError::AlreadyMember { .. }
        | EngineError::Capacity(_)
        | EngineError::AdminCannotLeave(_)
        | EngineError::OutsideWindow(_)
        | EngineError::AlreadyPaid(_)
        | EngineError::AlreadySpun { .. }
        | EngineError::AllPositionsAssigned(_)
        | EngineError::OpenCycleExists(_)
        | EngineError::CycleNotOpen(_)
        | EngineError::CycleNotSettled(_) => StatusCode::CONFLICT,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("request failed: {err:#}");
    }
    (status, err.to_string())
}
