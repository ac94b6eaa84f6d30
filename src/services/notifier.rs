//! Уведомления о заказах.
//!
//! Уведомитель получает снимок заказа после каждого изменения и отправляет его
//! наружу. Вызывается только из фоновых задач: ошибка доставки логируется и
//! никак не влияет на сам заказ.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, PaymentType, Seat, User};

/// Место в снимке заказа.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSeat {
    pub seat_id: i64,
    pub event_title: Option<String>,
    pub category: Option<String>,
    pub sector: Option<String>,
    pub row: Option<i32>,
    pub number: Option<i32>,
    pub price: Option<i64>,
}

/// Снимок заказа для бота: кто купил, что купил, сколько и в каком статусе.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub customer_name: String,
    pub phone_number: String,
    pub seats: Vec<SnapshotSeat>,
    /// В сумах.
    pub amount: i64,
    pub payment_type: Option<PaymentType>,
}

impl OrderSnapshot {
    pub fn build(order: &Order, user: Option<&User>, seats: &[Seat]) -> Self {
        let seats = order
            .seats
            .iter()
            .map(|item| {
                let seat = seats.iter().find(|s| s.id == item.seat);
                SnapshotSeat {
                    seat_id: item.seat,
                    event_title: item.event_title.clone(),
                    category: seat.map(|s| s.category.clone()),
                    sector: seat.map(|s| s.sector.clone()),
                    row: seat.map(|s| s.row),
                    number: seat.map(|s| s.number),
                    price: seat.map(|s| s.price),
                }
            })
            .collect();

        OrderSnapshot {
            order_id: order.id,
            status: order.status,
            customer_name: user.map(User::full_name).unwrap_or_default(),
            phone_number: user.map(|u| u.phone_number.clone()).unwrap_or_default(),
            seats,
            amount: order.amount,
            payment_type: order.payment_type,
        }
    }

    /// Названия мероприятий без повторов, через запятую.
    pub fn event_titles(&self) -> String {
        let mut titles: Vec<&str> = Vec::new();
        for title in self.seats.iter().filter_map(|s| s.event_title.as_deref()) {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }
        titles.join(", ")
    }
}

#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_changed(&self, snapshot: &OrderSnapshot) -> anyhow::Result<()>;
}

/// Уведомитель без внешнего канала: пишет снимок в лог.
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_changed(&self, snapshot: &OrderSnapshot) -> anyhow::Result<()> {
        info!(
            order_id = %snapshot.order_id,
            status = snapshot.status.as_str(),
            seats = snapshot.seats.len(),
            "Order {} is now {}, amount {} сум",
            snapshot.order_id,
            snapshot.status.label(),
            format_sum(snapshot.amount)
        );
        Ok(())
    }
}

/// Сумма в формате ru-RU: пробел между разрядами, запятая и два знака.
pub fn format_sum(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{}{},00", sign, grouped)
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML-сообщение о заказе для Telegram.
pub fn render_order_message(snapshot: &OrderSnapshot) -> String {
    let sticker = if snapshot.status == OrderStatus::Paid { "✅" } else { "🟡" };
    let seats = snapshot
        .seats
        .iter()
        .map(|s| match (&s.sector, s.row, s.number) {
            (Some(sector), Some(row), Some(number)) => {
                format!("{} / ряд {} / место {}", escape_html(sector), row, number)
            }
            _ => format!("#{}", s.seat_id),
        })
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "🧾 <b>Заказ {}:</b>\n\
         🔸 <b>Мероприятие:</b> {}\n\
         🔸 <b>Места:</b> {}\n\
         🔸 <b>Клиент:</b> {}\n\
         🔸 <b>Телефон:</b> {}\n\
         {} <b>Статус:</b> {}\n\n\
         🇺🇿 <b>Сумма:</b> {} сум",
        snapshot.order_id,
        escape_html(&snapshot.event_titles()),
        seats,
        escape_html(&snapshot.customer_name),
        escape_html(&snapshot.phone_number),
        sticker,
        snapshot.status.label(),
        format_sum(snapshot.amount),
    )
}

pub fn render_paid_notice(order_id: Uuid) -> String {
    format!("✅ <b>Заказ {}</b> Оплачен", order_id)
}
