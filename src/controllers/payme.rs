use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tracing::warn;

use crate::models::payme::RpcRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payme", post(handle_payme))
}

// POST /api/payme
// Тело разбираем сами: битый JSON должен получить ответ JSON-RPC, а не 400 от axum.
async fn handle_payme(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let request: RpcRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        warn!("Unparseable Payme request body: {}", e);
        RpcRequest::default()
    });

    let (status, response) = state.payme.handle(request).await;
    (status, Json(response))
}
