use crate::constants::{MSG_MINED, MSG_MINED_AND_SENT};
use crate::notify::Notifier;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chargechain_core::{
    recorder::{ChargeRequest, Recorder},
    Block, MineError, RecordError, ValidationError,
};
use chargechain_store::MemoryStore;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    recorder: Arc<Recorder<MemoryStore>>,
    notifier: Arc<Notifier>,
}

impl AppState {
    pub(crate) fn new(recorder: Arc<Recorder<MemoryStore>>, notifier: Notifier) -> Self {
        Self {
            recorder,
            notifier: Arc::new(notifier),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Serialize)]
struct ChargeResponse {
    message: &'static str,
    block: Block,
}

/// Errors as seen by HTTP clients. Only a generic message leaves the process.
#[derive(Debug)]
pub(crate) enum ApiError {
    MissingParameters,
    InvalidParameters,
    MiningTimeout,
    MiningCancelled,
    Internal(anyhow::Error),
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(ValidationError::MissingField(_)) => ApiError::MissingParameters,
            RecordError::Validation(ValidationError::InvalidAmount(_)) => {
                ApiError::InvalidParameters
            }
            RecordError::Mining(MineError::Timeout { .. }) => ApiError::MiningTimeout,
            RecordError::Mining(MineError::Cancelled { .. }) => ApiError::MiningCancelled,
            RecordError::Store(err) => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingParameters => (StatusCode::BAD_REQUEST, "Missing parameters"),
            ApiError::InvalidParameters => (StatusCode::BAD_REQUEST, "Invalid parameters"),
            ApiError::MiningTimeout => (StatusCode::SERVICE_UNAVAILABLE, "Mining timed out"),
            ApiError::MiningCancelled => (StatusCode::SERVICE_UNAVAILABLE, "Mining cancelled"),
            ApiError::Internal(err) => {
                error!("internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chain", get(chain))
        .route("/api/chain/head", get(head))
        .route("/api/charge-and-notify", post(charge_and_notify))
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn chain(State(state): State<AppState>) -> Result<Json<Vec<Block>>, ApiError> {
    let blocks = state
        .recorder
        .chain()
        .snapshot()
        .map_err(ApiError::Internal)?;
    Ok(Json(blocks))
}

async fn head(State(state): State<AppState>) -> Result<Json<Head>, ApiError> {
    let tip = state.recorder.chain().tip().map_err(ApiError::Internal)?;
    Ok(Json(Head {
        height: tip.index,
        hash: tip.hash,
    }))
}

async fn charge_and_notify(
    State(state): State<AppState>,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("rejected charge body: {rejection}");
        ApiError::InvalidParameters
    })?;

    let recorder = Arc::clone(&state.recorder);
    let block = tokio::task::spawn_blocking(move || recorder.record(request))
        .await
        .map_err(|err| ApiError::Internal(err.into()))??;

    // The block is already on the chain; delivery problems only get logged.
    if let Some(tx) = block.transactions.first().cloned() {
        let notifier = Arc::clone(&state.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.notify_charge(&tx).await {
                error!(to = %tx.to_number, "SMS notification failed: {err}");
            }
        });
    }

    let message = if state.notifier.is_enabled() {
        MSG_MINED_AND_SENT
    } else {
        MSG_MINED
    };
    Ok(Json(ChargeResponse { message, block }))
}
