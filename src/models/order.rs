use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AmountError, StoreError};
use crate::models::Seat;

/// Статус заказа для людей (админка, бот).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    NotPaid,
    Invoiced,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NotPaid => "NOT_PAID",
            OrderStatus::Invoiced => "INVOICED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Подпись статуса в сообщениях бота.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::NotPaid => "НЕ ОПЛАЧЕНО",
            OrderStatus::Invoiced => "ВЫСТАВЛЕНО",
            OrderStatus::Paid => "ОПЛАЧЕНО",
            OrderStatus::Cancelled => "ОТМЕНЕНО",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_PAID" => Ok(OrderStatus::NotPaid),
            "INVOICED" => Ok(OrderStatus::Invoiced),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(StoreError::Corrupt(format!("unknown order status '{}'", other))),
        }
    }
}

/// Состояние транзакции в терминах Payme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TransactionState {
    Created,
    Performed,
    CancelledWhileHeld,
    CancelledAfterPerform,
}

impl TransactionState {
    pub fn code(self) -> i32 {
        match self {
            TransactionState::Created => 1,
            TransactionState::Performed => 2,
            TransactionState::CancelledWhileHeld => -1,
            TransactionState::CancelledAfterPerform => -2,
        }
    }

    pub fn is_cancelled(self) -> bool {
        self.code() < 0
    }
}

impl From<TransactionState> for i32 {
    fn from(state: TransactionState) -> Self {
        state.code()
    }
}

impl TryFrom<i32> for TransactionState {
    type Error = StoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TransactionState::Created),
            2 => Ok(TransactionState::Performed),
            -1 => Ok(TransactionState::CancelledWhileHeld),
            -2 => Ok(TransactionState::CancelledAfterPerform),
            other => Err(StoreError::Corrupt(format!("unknown transaction state {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Payme,
    Click,
    Uzum,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Payme => "Payme",
            PaymentType::Click => "Click",
            PaymentType::Uzum => "Uzum",
        }
    }
}

impl FromStr for PaymentType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Payme" => Ok(PaymentType::Payme),
            "Click" => Ok(PaymentType::Click),
            "Uzum" => Ok(PaymentType::Uzum),
            other => Err(StoreError::Corrupt(format!("unknown payment type '{}'", other))),
        }
    }
}

/// Окно удержания мест: endTime = startTime + длительность брони.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldWindow {
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
}

impl HoldWindow {
    pub fn starting_at(start_time: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            start_time,
            end_time: start_time + duration,
        }
    }

    pub fn is_over(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

/// Одна позиция заказа: снимок данных мероприятия + ссылка на место.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "eventTitle")]
    pub event_title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "cardImage")]
    pub card_image: Option<String>,
    pub seat: i64,
}

impl From<NewLineItem> for LineItem {
    fn from(item: NewLineItem) -> Self {
        LineItem {
            id: Uuid::new_v4(),
            event_title: item.event_title,
            date: item.date,
            start_time: item.start_time,
            card_image: item.card_image,
            seat: item.seat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user: i64,
    pub time: HoldWindow,
    pub seats: Vec<LineItem>,
    /// Сумма в сумах; всегда пересчитывается из цен мест перед сохранением.
    pub amount: i64,
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
    pub create_time: Option<i64>,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub state: Option<TransactionState>,
    pub reason: Option<i32>,
    pub status: OrderStatus,
    #[serde(rename = "paymentType")]
    pub payment_type: Option<PaymentType>,
}

impl Order {
    pub fn new(user: i64, seats: Vec<LineItem>, hold: HoldWindow) -> Self {
        Order {
            id: Uuid::new_v4(),
            user,
            time: hold,
            seats,
            amount: 0,
            transaction_id: None,
            create_time: None,
            perform_time: None,
            cancel_time: None,
            state: None,
            reason: None,
            status: OrderStatus::NotPaid,
            payment_type: None,
        }
    }

    pub fn seat_ids(&self) -> Vec<i64> {
        self.seats.iter().map(|item| item.seat).collect()
    }

    pub fn contains_seat(&self, seat_id: i64) -> bool {
        self.seats.iter().any(|item| item.seat == seat_id)
    }

    /// Сумма в тийинах, как её присылает Payme.
    pub fn amount_in_minor_units(&self) -> i64 {
        self.amount.saturating_mul(100)
    }

    /// Позиции можно менять только пока провайдер не выставил счёт.
    pub fn is_editable(&self) -> bool {
        self.status == OrderStatus::NotPaid
    }
}

/// Σ цен мест по позициям.
pub fn compute_amount(items: &[LineItem], seats: &[Seat]) -> Result<i64, AmountError> {
    let prices: HashMap<i64, i64> = seats.iter().map(|s| (s.id, s.price)).collect();
    items.iter().try_fold(0i64, |sum, item| {
        let price = prices
            .get(&item.seat)
            .ok_or(AmountError::SeatNotFound(item.seat))?;
        sum.checked_add(*price).ok_or(AmountError::Overflow)
    })
}

// --- Входные данные для создания заказа ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewLineItem {
    #[serde(rename = "eventTitle")]
    #[validate(length(max = 512))]
    pub event_title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "cardImage")]
    pub card_image: Option<String>,
    #[validate(range(min = 1))]
    pub seat: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOrder {
    #[validate(range(min = 1))]
    pub user: i64,
    #[validate(length(min = 1, message = "order must contain at least one seat"), nested)]
    pub seats: Vec<NewLineItem>,
}

// --- Строки PostgreSQL ---

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub create_time: Option<i64>,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub state: Option<i32>,
    pub reason: Option<i32>,
    pub status: String,
    pub payment_type: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct LineItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seat_id: i64,
    pub event_title: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub card_image: Option<String>,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            id: row.id,
            event_title: row.event_title,
            date: row.event_date,
            start_time: row.start_time,
            card_image: row.card_image,
            seat: row.seat_id,
        }
    }
}

impl OrderRow {
    pub fn into_order(self, seats: Vec<LineItem>) -> Result<Order, StoreError> {
        Ok(Order {
            id: self.id,
            user: self.user_id,
            time: HoldWindow {
                start_time: self.start_time,
                end_time: self.end_time,
            },
            seats,
            amount: self.amount,
            transaction_id: self.transaction_id,
            create_time: self.create_time,
            perform_time: self.perform_time,
            cancel_time: self.cancel_time,
            state: self.state.map(TransactionState::try_from).transpose()?,
            reason: self.reason,
            status: self.status.parse()?,
            payment_type: self.payment_type.as_deref().map(str::parse).transpose()?,
        })
    }
}
