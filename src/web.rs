//! REST API over the sync engine.
//!
//! Thin layer: handlers parse the wire shapes, call [`SyncService`], and wrap
//! the outcome in the `ApiResponse` envelope. All domain rules live below.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{
    Channel, ImportBatch, InventoryItem, ItemFilter, ItemStatus, RawRecord, SourceType,
};
use crate::reconcile::ReconciliationReport;
use crate::service::{NewItem, SyncService};
use crate::state_machine::Transition;

#[derive(Clone)]
struct AppState {
    service: Arc<SyncService>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn error_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::ItemNotFound(_) | SyncError::BatchNotFound(_) => StatusCode::NOT_FOUND,
        SyncError::InvalidTransition { .. } | SyncError::ListingConflict { .. } => {
            StatusCode::CONFLICT
        }
        SyncError::Normalization(_) | SyncError::ChannelNotConfigured(_) => {
            StatusCode::BAD_REQUEST
        }
        SyncError::ChannelUnavailable { .. }
        | SyncError::Network(_)
        | SyncError::HttpStatus { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn respond<T>(result: crate::error::Result<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = error_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                log::error!("Request failed: {e}");
            } else {
                log::warn!("Request rejected ({status}): {e}");
            }
            (status, Json(ApiResponse::err(e.to_string())))
        }
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ImportRequest {
    source_type: SourceType,
    records: Vec<RawRecord>,
}

#[derive(Serialize)]
struct BatchCreated {
    batch_id: String,
}

/// Transition trigger as posted by clients.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TransitionRequest {
    List {
        channel: Channel,
        ask_price: f64,
    },
    MarkPresale {
        channel: Channel,
    },
    UnmarkPresale {
        channel: Channel,
    },
    ChannelReportsSold {
        channel: Channel,
        #[serde(default)]
        order_number: Option<String>,
        #[serde(default)]
        amount: Option<f64>,
    },
    Reserve,
    Release,
    ManualSet {
        status: ItemStatus,
        #[serde(default)]
        listing_id: Option<String>,
    },
    Retry,
}

impl From<TransitionRequest> for Transition {
    fn from(request: TransitionRequest) -> Self {
        match request {
            TransitionRequest::List { channel, ask_price } => {
                Transition::List { channel, ask_price }
            }
            TransitionRequest::MarkPresale { channel } => Transition::MarkPresale(channel),
            TransitionRequest::UnmarkPresale { channel } => Transition::UnmarkPresale(channel),
            TransitionRequest::ChannelReportsSold {
                channel,
                order_number,
                amount,
            } => Transition::ChannelReportsSold {
                channel,
                order_number,
                amount,
            },
            TransitionRequest::Reserve => Transition::Reserve,
            TransitionRequest::Release => Transition::Release,
            TransitionRequest::ManualSet { status, listing_id } => {
                Transition::ManualSet { status, listing_id }
            }
            TransitionRequest::Retry => Transition::Retry,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

/// POST /api/imports
async fn create_import_handler(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<BatchCreated> {
    respond(
        state
            .service
            .create_import_batch(request.source_type, request.records)
            .map(|batch_id| BatchCreated { batch_id }),
    )
}

/// GET /api/imports/{id}
async fn batch_status_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<ImportBatch> {
    respond(state.service.get_batch_status(&batch_id))
}

/// POST /api/imports/{id}/cancel
async fn cancel_batch_handler(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<()> {
    respond(state.service.cancel_batch(&batch_id))
}

/// GET /api/items?status=&sourcing_type=&channel=&product_ref=
async fn list_items_handler(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Vec<InventoryItem>> {
    respond(state.service.list_items(&filter))
}

/// POST /api/items
async fn create_item_handler(
    State(state): State<AppState>,
    Json(new): Json<NewItem>,
) -> ApiResult<InventoryItem> {
    respond(state.service.create_item(new))
}

/// GET /api/items/{id}
async fn get_item_handler(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<InventoryItem> {
    respond(state.service.get_item(&item_id))
}

/// POST /api/items/{id}/transition
async fn transition_handler(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<InventoryItem> {
    respond(
        state
            .service
            .transition_item(&item_id, request.into())
            .await,
    )
}

/// POST /api/reconcile/{channel}
async fn reconcile_handler(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> ApiResult<ReconciliationReport> {
    let channel: Channel = match channel.parse() {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e))),
    };
    respond(state.service.reconcile_channel(channel).await)
}

/// Build the API router.
pub fn create_router(service: Arc<SyncService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/api/imports", post(create_import_handler))
        .route("/api/imports/{id}", get(batch_status_handler))
        .route("/api/imports/{id}/cancel", post(cancel_batch_handler))
        .route("/api/items", get(list_items_handler).post(create_item_handler))
        .route("/api/items/{id}", get(get_item_handler))
        .route("/api/items/{id}/transition", post(transition_handler))
        .route("/api/reconcile/{channel}", post(reconcile_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server (async). Binds all interfaces; restrict exposure via
/// firewall or container port mapping.
pub async fn serve(service: Arc<SyncService>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(service);
    let addr = format!("0.0.0.0:{port}");

    log::info!("API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
