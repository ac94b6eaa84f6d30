use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::info;

use crate::config::EmailConfig;
use crate::services::circuit_breaker::CircuitBreaker;

pub const PAYMENT_SUCCESS_SUBJECT: &str = "TakeTicket.UZ - payment was successful!";
pub const PAYMENT_SUCCESS_BODY: &str = "Siz chiptani muvoffaqiyatli sotib oldingiz!";

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Без SMTP письма только логируются.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        info!("Email to {} skipped (SMTP not configured): {}", to, subject);
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl SmtpMailer {
    pub fn new(
        config: &EmailConfig,
        host: &str,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid EMAIL_FROM '{}'", config.from))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("failed to create SMTP relay for {}", host))?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from,
            circuit_breaker,
        })
    }

    async fn deliver(&self, message: Message) -> anyhow::Result<()> {
        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient '{}'", to))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        self.circuit_breaker
            .run(self.deliver(message))
            .await
            .map_err(|e| e.into_anyhow("smtp"))?;

        info!("Email '{}' sent to {}", subject, to);
        Ok(())
    }
}
