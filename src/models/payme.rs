//! Формат сообщений Payme Merchant API (JSON-RPC 2.0).
//!
//! Конверт ответа, коды ошибок и трёхъязычные тексты должны совпадать с тем,
//! что ожидает Payme, поэтому все константы собраны здесь.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymeMethod {
    CheckPerformTransaction,
    CreateTransaction,
    PerformTransaction,
    CheckTransaction,
    CancelTransaction,
    GetStatement,
}

impl PaymeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymeMethod::CheckPerformTransaction => "CheckPerformTransaction",
            PaymeMethod::CreateTransaction => "CreateTransaction",
            PaymeMethod::PerformTransaction => "PerformTransaction",
            PaymeMethod::CheckTransaction => "CheckTransaction",
            PaymeMethod::CancelTransaction => "CancelTransaction",
            PaymeMethod::GetStatement => "GetStatement",
        }
    }

    /// Код "ошибки на стороне сервера" для метода.
    pub fn server_error_code(&self) -> i32 {
        match self {
            PaymeMethod::CheckPerformTransaction | PaymeMethod::CreateTransaction => -31099,
            _ => -31008,
        }
    }

    /// Perform и Check отдают внутренние сбои со статусом 500.
    pub fn server_error_is_http_500(&self) -> bool {
        matches!(self, PaymeMethod::PerformTransaction | PaymeMethod::CheckTransaction)
    }
}

impl FromStr for PaymeMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CheckPerformTransaction" => Ok(PaymeMethod::CheckPerformTransaction),
            "CreateTransaction" => Ok(PaymeMethod::CreateTransaction),
            "PerformTransaction" => Ok(PaymeMethod::PerformTransaction),
            "CheckTransaction" => Ok(PaymeMethod::CheckTransaction),
            "CancelTransaction" => Ok(PaymeMethod::CancelTransaction),
            "GetStatement" => Ok(PaymeMethod::GetStatement),
            _ => Err(()),
        }
    }
}

// --- Запрос ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn request_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Параметры метода; если `params` не объект нужной формы, считаем их пустыми.
    pub fn params(&self) -> Params {
        self.params
            .clone()
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub reason: Option<Value>,
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
}

// Непустая строка или число -> строковый идентификатор
fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    let Value::Number(n) = value? else {
        return None;
    };
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

impl Params {
    /// Идентификатор транзакции Payme.
    pub fn transaction_id(&self) -> Option<String> {
        identifier(self.id.as_ref())
    }

    pub fn order_id(&self) -> Option<String> {
        identifier(self.account.as_ref().and_then(|a| a.order_id.as_ref()))
    }

    /// Время создания транзакции у Payme (epoch ms), 0 считается отсутствующим.
    pub fn time(&self) -> Option<i64> {
        integer(self.time.as_ref()).filter(|t| *t != 0)
    }

    /// Сумма в тийинах; дробная или нечисловая сумма не совпадёт ни с одним заказом.
    pub fn amount(&self) -> Option<i64> {
        integer(self.amount.as_ref())
    }

    pub fn reason(&self) -> Option<i32> {
        match self.reason.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            other => integer(Some(other)).and_then(|r| i32::try_from(r).ok()),
        }
    }

    /// Интервал выписки; оба конца обязаны быть числами.
    pub fn statement_range(&self) -> Option<(i64, i64)> {
        let from = self.from.as_ref().filter(|v| v.is_number())?;
        let to = self.to.as_ref().filter(|v| v.is_number())?;
        let as_ms = |v: &Value| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64));
        Some((as_ms(from)?, as_ms(to)?))
    }
}

// --- Ответ ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedMessage {
    pub ru: &'static str,
    pub uz: &'static str,
    pub en: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: LocalizedMessage,
    /// Имя проблемного параметра. `Some(Value::Null)` сериализуется как `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i32, ru: &'static str, uz: &'static str, en: &'static str, data: Option<&str>) -> Self {
        RpcError {
            code,
            message: LocalizedMessage { ru, uz, en },
            data: data.map(|d| Value::String(d.to_string())),
        }
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Метод не найден", "Usul topilmadi", "Method not found", None)
    }

    /// Нет account.orderId в CheckPerformTransaction.
    pub fn order_id_missing() -> Self {
        Self::new(-32504, "Заказ не найден", "Zakaz topilmadi", "Order not found", Some("orderId"))
    }

    pub fn order_not_found() -> Self {
        Self::new(-31050, "Заказ не найден", "Zakaz topilmadi", "Order not found", Some("orderId"))
    }

    pub fn incorrect_amount() -> Self {
        Self::new(-31001, "Неверная сумма", "Noto‘g‘ri summa", "Incorrect amount", Some("amount"))
    }

    pub fn invalid_params() -> Self {
        Self::new(
            -32504,
            "Неверные параметры запроса",
            "So‘rov parametrlari noto‘g‘ri",
            "Invalid request parameters",
            Some("params"),
        )
    }

    pub fn transaction_id_missing() -> Self {
        Self::new(
            -31050,
            "Идентификатор транзакции отсутствует",
            "Tranzaksiya identifikatori mavjud emas",
            "Transaction ID is missing",
            Some("id"),
        )
    }

    pub fn transaction_not_found() -> Self {
        Self::new(-32504, "Транзакция не найдена", "Tranzaksiya topilmadi", "Transaction not found", Some("id"))
    }

    /// Заказ уже связан с другой транзакцией.
    pub fn invalid_transaction_id() -> Self {
        Self::new(
            -31050,
            "Неверный идентификатор транзакции",
            "Tranzaksiya identifikatori noto‘g‘ri",
            "Invalid transaction ID",
            Some("id"),
        )
    }

    pub fn invalid_state() -> Self {
        Self::new(
            -31007,
            "Неверное состояние транзакции",
            "Noto‘g‘ri tranzaksiya holati",
            "Invalid transaction state",
            Some("state"),
        )
    }

    /// Отменённую транзакцию провести нельзя.
    pub fn cannot_perform() -> Self {
        Self::new(
            -31008,
            "Невозможно выполнить операцию",
            "Amalni bajarib bo‘lmaydi",
            "Unable to perform operation",
            Some("state"),
        )
    }

    pub fn statement_params_invalid() -> Self {
        Self::new(
            -31050,
            "Параметры запроса неверны",
            "So‘rov parametrlari noto‘g‘ri",
            "Request parameters are invalid",
            Some("params"),
        )
    }

    pub fn statement_empty() -> Self {
        RpcError {
            data: Some(Value::Null),
            ..Self::new(-32504, "Транзакция не найдена", "Tranzaksiya topilmadi", "Transaction not found", None)
        }
    }

    pub fn server_error(code: i32) -> Self {
        Self::new(code, "Ошибка на стороне сервера", "Server tomonda xatolik", "Server error", Some("server"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckPerformResult {
    pub allow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateResult {
    pub create_time: i64,
    pub transaction: String,
    pub state: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformResult {
    pub transaction: String,
    pub perform_time: i64,
    pub state: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelResult {
    pub transaction: String,
    pub cancel_time: i64,
    pub state: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementAccount {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Транзакция в плоском формате выписки Payme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementEntry {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: StatementAccount,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub state: i32,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementResult {
    pub transactions: Vec<StatementEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcResult {
    CheckPerform(CheckPerformResult),
    Create(CreateResult),
    Perform(PerformResult),
    Check(CheckResult),
    Cancel(CancelResult),
    Statement(StatementResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RpcResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: RpcResult) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}
