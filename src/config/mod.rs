use anyhow::bail;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub orders: OrderConfig,
    pub notifier: NotifierConfig,
    pub email: EmailConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("unknown storage backend '{}'", other),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub pool_size: u32,
}

// Настройки Redis (хранилище id сообщений бота)
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Удержание мест и фоновая очистка заказов
#[derive(Debug, Clone, Deserialize)]
pub struct OrderConfig {
    pub hold_minutes: i64,
    pub sweep_interval_seconds: u64,
}

// Telegram-бот для уведомлений о заказах
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub bot_token: Option<String>,
    pub api_url: String,
    pub pending_chat_id: String,
    pub paid_chat_id: String,
    pub pending_message_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from: String,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} must be a valid value, got '{}': {}", name, raw, e))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend: StorageBackend = parse_var("STORAGE_BACKEND", "postgres")?;
        let database_url = optional_var("DATABASE_URL");
        if backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_BACKEND=postgres");
        }

        let hold_minutes: i64 = parse_var("ORDER_HOLD_MINUTES", "15")?;
        if hold_minutes <= 0 {
            bail!("ORDER_HOLD_MINUTES must be positive");
        }

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var("PORT", "9000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "ticket_payments=debug,tower_http=debug"),
            },
            database: DatabaseConfig {
                backend,
                url: database_url,
                pool_size: parse_var("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: optional_var("REDIS_URL"),
            },
            orders: OrderConfig {
                hold_minutes,
                sweep_interval_seconds: parse_var("EXPIRY_SWEEP_SECONDS", "300")?,
            },
            notifier: NotifierConfig {
                bot_token: optional_var("BOT_TOKEN"),
                api_url: var_or("TELEGRAM_API_URL", "https://api.telegram.org"),
                pending_chat_id: var_or("GROUP_CHAT_ID_PENDING", "-4671797835"),
                paid_chat_id: var_or("GROUP_CHAT_ID_PAID", "-4728546871"),
                pending_message_ttl_seconds: parse_var("PENDING_MESSAGE_TTL_SECONDS", "86400")?,
            },
            email: EmailConfig {
                smtp_host: optional_var("SMTP_HOST"),
                smtp_username: var_or("SMTP_USERNAME", ""),
                smtp_password: var_or("SMTP_PASSWORD", ""),
                from: var_or("EMAIL_FROM", "TakeTicket.UZ <noreply@taketicket.uz>"),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "5")?,
                timeout_seconds: parse_var("CIRCUIT_BREAKER_TIMEOUT_SECONDS", "60")?,
            },
        })
    }

    /// Конфигурация для тестов и локального запуска без внешних сервисов.
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "ticket_payments=debug".to_string(),
            },
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: None,
                pool_size: 1,
            },
            redis: RedisConfig { url: None },
            orders: OrderConfig {
                hold_minutes: 15,
                sweep_interval_seconds: 300,
            },
            notifier: NotifierConfig {
                bot_token: None,
                api_url: "https://api.telegram.org".to_string(),
                pending_chat_id: "pending".to_string(),
                paid_chat_id: "paid".to_string(),
                pending_message_ttl_seconds: 86400,
            },
            email: EmailConfig {
                smtp_host: None,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from: "noreply@example.com".to_string(),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
            },
        }
    }

    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.orders.hold_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_case_insensitive() {
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("postgres".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!("mongo".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn in_memory_config_holds_for_fifteen_minutes() {
        let config = Config::in_memory();
        assert_eq!(config.hold_duration(), chrono::Duration::minutes(15));
        assert_eq!(config.database.backend, StorageBackend::Memory);
    }
}
