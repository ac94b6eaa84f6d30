//! Уведомления в Telegram через Bot API.
//!
//! Неоплаченные заказы уходят в группу ожидания, оплаченные в группу оплат.
//! После оплаты в группу ожидания дополнительно уходит короткое уведомление
//! ответом на сообщение о выставленном счёте.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotifierConfig;
use crate::models::OrderStatus;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::notifier::{
    render_order_message, render_paid_notice, OrderNotifier, OrderSnapshot,
};
use crate::services::pending_messages::PendingMessageStore;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

pub struct TelegramNotifier {
    http_client: reqwest::Client,
    api_url: String,
    bot_token: String,
    pending_chat_id: String,
    paid_chat_id: String,
    pending_messages: Arc<dyn PendingMessageStore>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl TelegramNotifier {
    pub fn new(
        config: &NotifierConfig,
        bot_token: String,
        pending_messages: Arc<dyn PendingMessageStore>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build Telegram HTTP client")?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token,
            pending_chat_id: config.pending_chat_id.clone(),
            paid_chat_id: config.paid_chat_id.clone(),
            pending_messages,
            circuit_breaker,
        })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> anyhow::Result<i64> {
        self.circuit_breaker
            .run(self.post_message(chat_id, text, reply_to_message_id))
            .await
            .map_err(|e| e.into_anyhow("telegram"))
    }

    async fn post_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> anyhow::Result<i64> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            reply_to_message_id,
        };

        let response: SendMessageResponse = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        match (response.ok, response.result) {
            (true, Some(sent)) => Ok(sent.message_id),
            _ => Err(anyhow!(
                "Telegram rejected message: {}",
                response.description.unwrap_or_default()
            )),
        }
    }
}

#[async_trait]
impl OrderNotifier for TelegramNotifier {
    async fn order_changed(&self, snapshot: &OrderSnapshot) -> anyhow::Result<()> {
        let chat_id = match snapshot.status {
            OrderStatus::Paid => &self.paid_chat_id,
            _ => &self.pending_chat_id,
        };

        let message_id = self
            .send_message(chat_id, &render_order_message(snapshot), None)
            .await?;
        debug!("Order {} notice sent as message {}", snapshot.order_id, message_id);

        match snapshot.status {
            OrderStatus::Invoiced => {
                self.pending_messages
                    .remember(snapshot.order_id, message_id)
                    .await?;
            }
            OrderStatus::Paid => {
                let reply_to = self
                    .pending_messages
                    .take(snapshot.order_id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Pending message lookup failed for {}: {}", snapshot.order_id, e);
                        None
                    });
                self.send_message(
                    &self.pending_chat_id,
                    &render_paid_notice(snapshot.order_id),
                    reply_to,
                )
                .await?;
                info!("Paid notice for order {} sent to pending group", snapshot.order_id);
            }
            OrderStatus::Cancelled => {
                self.pending_messages.take(snapshot.order_id).await?;
            }
            OrderStatus::NotPaid => {}
        }

        Ok(())
    }
}
