use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ftransport_domain::{validate_drive_url, TransferMode, TransferStatus};
use ftransport_storage::FtransportStorage;
use ftransport_worker::{snapshot_of, ProgressBroker, TransferWorker};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub source_url: String,
    #[serde(default)]
    pub transfer_mode: TransferMode,
}

#[derive(Debug, Deserialize)]
pub struct ValidateUrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    skip: Option<i64>,
    limit: Option<i64>,
}

#[derive(Clone)]
pub struct AppState {
    pub storage: FtransportStorage,
    pub worker: Arc<TransferWorker>,
    pub broker: Arc<ProgressBroker>,
}

impl AppState {
    pub fn new(storage: FtransportStorage, worker: Arc<TransferWorker>) -> Self {
        let broker = Arc::clone(worker.sink().broker());
        Self {
            storage,
            worker,
            broker,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/transfers",
            post(create_transfer)
                .get(list_transfers)
                .delete(clear_transfers),
        )
        .route("/api/transfers/validate-url", post(validate_url))
        .route(
            "/api/transfers/{transfer_id}",
            get(get_transfer).delete(cancel_transfer),
        )
        .route("/api/transfers/{transfer_id}/files", get(get_transfer_files))
        .route(
            "/api/transfers/{transfer_id}/status",
            get(get_transfer_status),
        )
        .route("/ws/transfers/{transfer_id}", get(ws_transfer_updates))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Validates the share URL, persists a PENDING transfer, and launches the
/// orchestration task. The response is the freshly created record; progress
/// is observed through the status and WebSocket endpoints.
async fn create_transfer(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransferRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let validation = validate_drive_url(&payload.source_url);
    let Some(drive_type) = validation.drive_type else {
        let message = validation
            .error_message
            .unwrap_or_else(|| "invalid source URL".to_string());
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": message }))));
    };

    let mode = payload.transfer_mode;
    let transfer = state
        .storage
        .create_transfer(&payload.source_url, drive_type.as_str(), mode.as_str())
        .await
        .map_err(internal_error)?;

    info!(transfer_id = %transfer.transfer_id, drive_type = drive_type.as_str(),
        mode = mode.as_str(), "transfer accepted");
    state
        .worker
        .spawn(&transfer.transfer_id, &transfer.source_url, mode);

    Ok((StatusCode::ACCEPTED, Json(transfer)))
}

async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let transfers = state
        .storage
        .list_transfers(query.skip.unwrap_or(0), query.limit.unwrap_or(100))
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::OK, Json(transfers)))
}

async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let transfer = state
        .storage
        .get_transfer(&transfer_id)
        .await
        .map_err(internal_error)?;
    match transfer {
        Some(record) => Ok((StatusCode::OK, Json(record))),
        None => Err(transfer_not_found()),
    }
}

async fn get_transfer_files(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    if state
        .storage
        .get_transfer(&transfer_id)
        .await
        .map_err(internal_error)?
        .is_none()
    {
        return Err(transfer_not_found());
    }

    let files = state
        .storage
        .transfer_files(&transfer_id)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::OK, Json(files)))
}

async fn get_transfer_status(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let Some(transfer) = state
        .storage
        .get_transfer(&transfer_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(transfer_not_found());
    };
    let files = state
        .storage
        .transfer_files(&transfer_id)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::OK, Json(snapshot_of(&transfer, &files, None))))
}

/// Cooperative cancellation. Terminal transfers are rejected with 400; a
/// transfer whose task is gone (for example after a restart) is finalized
/// directly so the record cannot stay stuck in a running state.
async fn cancel_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let Some(transfer) = state
        .storage
        .get_transfer(&transfer_id)
        .await
        .map_err(internal_error)?
    else {
        return Err(transfer_not_found());
    };

    let status = TransferStatus::parse(&transfer.status).unwrap_or(TransferStatus::Pending);
    if status.is_terminal() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("cannot cancel transfer with status: {}", transfer.status)
            })),
        ));
    }

    if state.worker.cancel(&transfer_id) {
        info!(transfer_id = %transfer_id, "cancellation requested");
    } else {
        warn!(transfer_id = %transfer_id, "no live task for transfer, finalizing as cancelled");
        state
            .storage
            .finalize_transfer(&transfer_id, TransferStatus::Cancelled.as_str(), None, None)
            .await
            .map_err(internal_error)?;
        state
            .worker
            .sink()
            .broadcast(&transfer_id, None)
            .await
            .map_err(internal_error)?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "transfer_id": transfer_id,
            "status": "cancellation_requested"
        })),
    ))
}

async fn clear_transfers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let removed = state
        .storage
        .clear_terminal_transfers()
        .await
        .map_err(internal_error)?;
    info!(removed, "cleared terminal transfers");
    Ok((StatusCode::OK, Json(json!({ "removed": removed }))))
}

async fn validate_url(Json(payload): Json<ValidateUrlRequest>) -> impl IntoResponse {
    Json(validate_drive_url(&payload.url))
}

async fn ws_transfer_updates(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve_transfer_socket(state, transfer_id, socket))
}

/// Forwards broadcast snapshots for one transfer as JSON text frames. The
/// current persisted state is sent immediately on connect; the socket
/// closes after a terminal snapshot or when the client goes away.
async fn serve_transfer_socket(state: AppState, transfer_id: String, mut socket: WebSocket) {
    let mut updates = state.broker.subscribe(&transfer_id).await;

    let initial = match state.storage.get_transfer(&transfer_id).await {
        Ok(Some(row)) => match state.storage.transfer_files(&transfer_id).await {
            Ok(files) => Some(snapshot_of(&row, &files, None)),
            Err(err) => {
                error!(transfer_id = %transfer_id, error = %err, "failed to load file records");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            error!(transfer_id = %transfer_id, error = %err, "failed to load transfer");
            None
        }
    };
    if let Some(snapshot) = initial {
        let terminal = snapshot.status.is_terminal();
        if !send_snapshot(&mut socket, &transfer_id, &snapshot).await || terminal {
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(snapshot) = update else {
                    debug!(transfer_id = %transfer_id, "progress channel superseded or closed");
                    break;
                };
                let terminal = snapshot.status.is_terminal();
                if !send_snapshot(&mut socket, &transfer_id, &snapshot).await || terminal {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(transfer_id = %transfer_id, error = %err, "websocket receive error");
                        break;
                    }
                    // Pings are answered by axum; other frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_snapshot(
    socket: &mut WebSocket,
    transfer_id: &str,
    snapshot: &ftransport_domain::ProgressSnapshot,
) -> bool {
    let text = match serde_json::to_string(snapshot) {
        Ok(text) => text,
        Err(err) => {
            error!(transfer_id = %transfer_id, error = %err, "failed to serialize snapshot");
            return false;
        }
    };
    if let Err(err) = socket.send(Message::Text(text.into())).await {
        debug!(transfer_id = %transfer_id, error = %err, "websocket send failed, client gone");
        return false;
    }
    true
}

fn transfer_not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error":"transfer_not_found"})),
    )
}

fn internal_error(error: anyhow::Error) -> (StatusCode, Json<Value>) {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}
