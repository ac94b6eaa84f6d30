use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{NewLineItem, NewOrder};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/by-user/{user_id}", get(orders_by_user))
        .route("/orders/{id}", get(get_order).put(add_seat))
        .route("/orders/{id}/remove-seat/{line_item_id}", put(remove_seat))
}

// POST /api/orders
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewOrder>,
) -> Result<impl IntoResponse, OrderError> {
    let order = state.orders.create(req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

// GET /api/orders/{id}
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, OrderError> {
    Ok(Json(state.orders.get(id).await?))
}

// GET /api/orders/by-user/{user_id}
async fn orders_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, OrderError> {
    Ok(Json(state.orders.list_by_user(user_id).await?))
}

// PUT /api/orders/{id}
async fn add_seat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(item): Json<NewLineItem>,
) -> Result<impl IntoResponse, OrderError> {
    Ok(Json(state.orders.add_seat(id, item).await?))
}

// PUT /api/orders/{id}/remove-seat/{line_item_id}
async fn remove_seat(
    State(state): State<Arc<AppState>>,
    Path((id, line_item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, OrderError> {
    Ok(Json(state.orders.remove_seat(id, line_item_id).await?))
}
