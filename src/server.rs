use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use teloxide::types::Update;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// HTTP surface for push mode: one webhook route plus a liveness root.
/// Requests never touch the bot runtime directly; they only hand updates
/// to the owning worker.
pub fn router(queue: mpsc::Sender<Update>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/webhook", post(receive_update))
        .with_state(queue)
}

async fn liveness() -> &'static str {
    "chatrelay is alive"
}

/// Accept one Telegram update. Responds as soon as the hand-off to the
/// worker completes; delivery itself continues in the background, so the
/// HTTP connection is never held open for the duration of a model call.
/// Malformed bodies are rejected by the JSON extractor before we run.
async fn receive_update(
    State(queue): State<mpsc::Sender<Update>>,
    Json(update): Json<Update>,
) -> StatusCode {
    debug!("webhook update {} received", update.id);
    match queue.send(update).await {
        Ok(()) => StatusCode::OK,
        Err(_) => {
            error!("update worker is gone, rejecting webhook update");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
