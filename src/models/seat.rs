use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

/// Состояние места: free -> reserved -> occupied, либо освобождение обратно в free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Free,
    Reserved,
    Occupied,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Free => "free",
            SeatStatus::Reserved => "reserved",
            SeatStatus::Occupied => "occupied",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SeatStatus::Free),
            "reserved" => Ok(SeatStatus::Reserved),
            "occupied" => Ok(SeatStatus::Occupied),
            other => Err(StoreError::Corrupt(format!("unknown seat status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub category: String,
    pub sector: String,
    pub row: i32,
    #[serde(rename = "seat")]
    pub number: i32,
    /// Цена в сумах (целые, без тийинов).
    pub price: i64,
    pub color: Option<String>,
    pub status: SeatStatus,
    /// Заказ, который держит место (reserved) или купил его (occupied).
    #[serde(rename = "orderId")]
    pub order_id: Option<Uuid>,
    pub booking_time: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn is_held_by(&self, order_id: Uuid) -> bool {
        self.order_id == Some(order_id)
    }
}

// Строка из таблицы seats, статус хранится текстом
#[derive(Debug, FromRow)]
pub struct SeatRow {
    pub id: i64,
    pub category: String,
    pub sector: String,
    pub row: i32,
    pub number: i32,
    pub price: i64,
    pub color: Option<String>,
    pub status: String,
    pub order_id: Option<Uuid>,
    pub booking_time: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            category: row.category,
            sector: row.sector,
            row: row.row,
            number: row.number,
            price: row.price,
            color: row.color,
            status: row.status.parse()?,
            order_id: row.order_id,
            booking_time: row.booking_time,
            expiration_time: row.expiration_time,
        })
    }
}
