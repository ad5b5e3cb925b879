//! Simple REST API server example for the escrow engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /participants` - Register a participant (idempotent per chat id)
//! - `POST /participants/{id}/wallet` - Store a payout address
//! - `GET /participants/{id}` - Get a participant's profile
//! - `POST /deals` - Open a deal
//! - `POST /deals/{id}/actions` - Apply a lifecycle action to a deal
//! - `GET /deals/{id}` - Get a deal by ID
//! - `GET /deals` - List all deals
//! - `GET /stats/{actor}` - System statistics (admin only)
//!
//! Chat id 1 is on the admin roster, so the first participant registered
//! with `"chat_id": 1` can verify payments and force-cancel deals.
//!
//! ## Example Usage
//!
//! ```bash
//! # Register two participants
//! curl -X POST http://localhost:3000/participants \
//!   -H "Content-Type: application/json" \
//!   -d '{"chat_id": 100, "name": "alice"}'
//! curl -X POST http://localhost:3000/participants \
//!   -H "Content-Type: application/json" \
//!   -d '{"chat_id": 200, "name": "bob"}'
//!
//! # Alice opens a deal as the buyer, with bob (participant 2) selling
//! curl -X POST http://localhost:3000/deals \
//!   -H "Content-Type: application/json" \
//!   -d '{"initiator": 1, "role": "buyer", "partner": 2, "amount": "100.00", "currency": "TON"}'
//!
//! # Bob accepts
//! curl -X POST http://localhost:3000/deals/1/actions \
//!   -H "Content-Type: application/json" \
//!   -d '{"type": "confirm_creation", "actor": 2}'
//!
//! # Check the deal
//! curl http://localhost:3000/deals/1
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use garant_rs::{
    ChatId, Currency, DealId, DealRecord, EngineConfig, EscrowEngine, EscrowError, Participant,
    PartyRole, ProfileView, Sweeper, SystemStats, TracingNotifier, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request DTOs ===

/// Request body for registering a participant.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub chat_id: i64,
    pub name: String,
}

/// Request body for storing a payout address.
#[derive(Debug, Deserialize)]
pub struct WalletRequest {
    pub currency: Currency,
    pub address: String,
}

/// Request body for opening a deal.
#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub initiator: u64,
    pub role: PartyRole,
    pub partner: u64,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Request body for deal lifecycle actions.
///
/// Uses a tagged enum for clean JSON representation:
/// ```json
/// {"type": "confirm_creation", "actor": 2}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealAction {
    ConfirmCreation { actor: u64 },
    RejectCreation { actor: u64 },
    PaymentSent { actor: u64 },
    AdminConfirm { actor: u64 },
    AdminReject { actor: u64 },
    ConfirmDelivery { actor: u64 },
    Cancel { actor: u64 },
    ForceCancel { actor: u64 },
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the escrow engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EscrowEngine>,
}

// === Error Handling ===

/// Wrapper for converting `EscrowError` into HTTP responses.
pub struct AppError(EscrowError);

impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EscrowError::DealNotFound => (StatusCode::NOT_FOUND, "DEAL_NOT_FOUND"),
            EscrowError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            EscrowError::IllegalTransition => (StatusCode::CONFLICT, "ILLEGAL_TRANSITION"),
            EscrowError::Unauthorized => (StatusCode::FORBIDDEN, "UNAUTHORIZED"),
            EscrowError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            EscrowError::SelfDeal => (StatusCode::BAD_REQUEST, "SELF_DEAL"),
            EscrowError::InvalidAddress => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ADDRESS"),
            EscrowError::SellerWalletNotSet => {
                (StatusCode::UNPROCESSABLE_ENTITY, "SELLER_WALLET_NOT_SET")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /participants - Register a participant by chat identity.
async fn register_participant(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> (StatusCode, Json<Participant>) {
    let row = state.engine.register(ChatId(request.chat_id), &request.name);
    (StatusCode::CREATED, Json(row))
}

/// POST /participants/{id}/wallet - Store a payout address.
async fn set_wallet(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<WalletRequest>,
) -> Result<Json<Participant>, AppError> {
    let row = state
        .engine
        .set_payout_address(UserId(id), request.currency, &request.address)?;
    Ok(Json(row))
}

/// GET /participants/{id} - Get a participant's profile.
async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.engine.profile(UserId(id))?))
}

/// POST /deals - Open a deal between two registered participants.
async fn create_deal(
    State(state): State<AppState>,
    Json(request): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<DealRecord>), AppError> {
    let record = state.engine.create_deal(
        UserId(request.initiator),
        request.role,
        UserId(request.partner),
        request.amount,
        request.currency,
    )?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /deals/{id}/actions - Apply a lifecycle action to a deal.
async fn apply_deal_action(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(action): Json<DealAction>,
) -> Result<Json<DealRecord>, AppError> {
    let deal = DealId(id);
    let engine = &state.engine;
    let record = match action {
        DealAction::ConfirmCreation { actor } => engine.confirm_creation(UserId(actor), deal)?,
        DealAction::RejectCreation { actor } => engine.reject_creation(UserId(actor), deal)?,
        DealAction::PaymentSent { actor } => engine.report_payment_sent(UserId(actor), deal)?,
        DealAction::AdminConfirm { actor } => engine.admin_confirm_payment(UserId(actor), deal)?,
        DealAction::AdminReject { actor } => engine.admin_reject_payment(UserId(actor), deal)?,
        DealAction::ConfirmDelivery { actor } => engine
            .confirm_delivery(UserId(actor), deal)?
            .record()
            .clone(),
        DealAction::Cancel { actor } => engine.cancel_deal(UserId(actor), deal)?,
        DealAction::ForceCancel { actor } => engine.force_cancel(UserId(actor), deal)?,
    };
    Ok(Json(record))
}

/// GET /deals/{id} - Get a deal by ID.
async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DealRecord>, AppError> {
    Ok(Json(state.engine.get_deal(DealId(id))?))
}

/// GET /deals - List all deals.
async fn list_deals(State(state): State<AppState>) -> Json<Vec<DealRecord>> {
    let mut records: Vec<DealRecord> = state
        .engine
        .deals()
        .map(|ref_multi| ref_multi.value().snapshot())
        .collect();
    records.sort_by_key(|record| record.deal_id);
    Json(records)
}

/// GET /stats/{actor} - System statistics, admin only.
async fn get_stats(
    State(state): State<AppState>,
    Path(actor): Path<u64>,
) -> Result<Json<SystemStats>, AppError> {
    Ok(Json(state.engine.system_stats(UserId(actor))?))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/participants", post(register_participant))
        .route("/participants/{id}/wallet", post(set_wallet))
        .route("/participants/{id}", get(get_profile))
        .route("/deals", post(create_deal).get(list_deals))
        .route("/deals/{id}/actions", post(apply_deal_action))
        .route("/deals/{id}", get(get_deal))
        .route("/stats/{actor}", get(get_stats))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = EngineConfig::default().with_admin(ChatId(1));
    let engine = Arc::new(EscrowEngine::new(config).with_notifier(Arc::new(TracingNotifier)));
    let _sweeper = Sweeper::spawn(engine.clone());

    let app = create_router(AppState {
        engine: engine.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Escrow API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /participants            - Register a participant");
    println!("  POST /participants/:id/wallet - Store a payout address");
    println!("  GET  /participants/:id        - Get a participant's profile");
    println!("  POST /deals                   - Open a deal");
    println!("  POST /deals/:id/actions       - Apply a lifecycle action");
    println!("  GET  /deals/:id               - Get a deal by ID");
    println!("  GET  /deals                   - List all deals");
    println!("  GET  /stats/:actor            - System statistics (admin)");

    axum::serve(listener, app).await.unwrap();
}
