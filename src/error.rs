use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;

/// Сбой хранилища (Postgres, Redis или битая запись).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("seat {0} not found")]
    SeatNotFound(i64),

    #[error("seat {0} is not available")]
    SeatUnavailable(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ошибка пересчёта суммы заказа.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("seat {0} not found")]
    SeatNotFound(i64),

    #[error("order amount is out of range")]
    Overflow,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("seat {0} not found")]
    SeatNotFound(i64),

    #[error("seat {0} is not available")]
    SeatUnavailable(i64),

    #[error("seat {0} is already in the order")]
    DuplicateSeat(i64),

    #[error("line item {0} not found")]
    LineItemNotFound(Uuid),

    #[error("order {0} is {1} and can no longer be edited")]
    NotEditable(Uuid, OrderStatus),

    #[error("order amount is out of range")]
    AmountOverflow,

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AmountError> for OrderError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::SeatNotFound(id) => OrderError::SeatNotFound(id),
            AmountError::Overflow => OrderError::AmountOverflow,
        }
    }
}

impl From<LedgerError> for OrderError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SeatNotFound(id) => OrderError::SeatNotFound(id),
            LedgerError::SeatUnavailable(id) => OrderError::SeatUnavailable(id),
            LedgerError::Store(e) => OrderError::Store(e),
        }
    }
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    message: String,
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrderError::OrderNotFound(_)
            | OrderError::UserNotFound(_)
            | OrderError::SeatNotFound(_)
            | OrderError::LineItemNotFound(_) => StatusCode::NOT_FOUND,
            OrderError::SeatUnavailable(_)
            | OrderError::DuplicateSeat(_)
            | OrderError::NotEditable(..) => StatusCode::CONFLICT,
            OrderError::Validation(_) | OrderError::AmountOverflow => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            OrderError::Store(e) => {
                tracing::error!("Order storage failure: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ApiError { success: false, message })).into_response()
    }
}
