//! Автоматический выключатель для исходящих вызовов (Telegram, SMTP).
//!
//! После `failure_threshold` подряд неудачных вызовов цепь размыкается и
//! вызовы отклоняются сразу, без сетевого запроса. Через `timeout` цепь
//! переходит в HalfOpen и пропускает пробный вызов.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Нормальный режим, вызовы разрешены.
    Closed,
    /// Вызовы блокируются до истечения таймаута.
    Open,
    /// Разрешён пробный вызов.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Mutex<Inner>,
    failure_threshold: u32,
    timeout: Duration,
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error("{0}")]
    Inner(E),
}

impl CircuitBreakerError<anyhow::Error> {
    pub fn into_anyhow(self, name: &str) -> anyhow::Error {
        match self {
            CircuitBreakerError::Open => anyhow::anyhow!("{} circuit breaker is open", name),
            CircuitBreakerError::Inner(e) => e,
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    // Паника в другом потоке не должна выключать уведомления навсегда
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit breaker '{}' transitioning to HalfOpen state", self.name);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker '{}' recovered - transitioning to Closed state", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    "Circuit breaker '{}' OPENED - {} failures reached threshold {}",
                    self.name, inner.failure_count, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker '{}' test failed - returning to Open state", self.name);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Выполняет операцию через выключатель.
    pub async fn run<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.can_execute() {
            warn!("Circuit breaker '{}' is OPEN - blocking request", self.name);
            return Err(CircuitBreakerError::Open);
        }

        match operation.await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    async fn succeed() -> Result<u8, &'static str> {
        Ok(7)
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_recovers_after_timeout() {
        let breaker = CircuitBreaker::new("test", 2, 30);

        assert!(matches!(breaker.run(fail()).await, Err(CircuitBreakerError::Inner("boom"))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.run(fail()).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(matches!(breaker.run(succeed()).await, Err(CircuitBreakerError::Open)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(breaker.run(succeed()).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new("test", 1, 10);
        let _ = breaker.run(fail()).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        let _ = breaker.run(fail()).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }
}
