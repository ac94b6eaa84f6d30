//! Машина состояний транзакций Payme.
//!
//! Транзакция живёт на заказе: UNCREATED -> 1 (CreateTransaction) ->
//! 2 (PerformTransaction), отмена даёт -1 из 1 и -2 из 2. Повторные Create,
//! Perform и Cancel с тем же id возвращают уже сохранённый результат и не
//! повторяют побочных эффектов. Все изменяющие методы работают под мьютексом
//! заказа и перечитывают его под замком.

use axum::http::StatusCode;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{OrderError, StoreError};
use crate::models::payme::{
    CancelResult, CheckPerformResult, CheckResult, CreateResult, Params, PaymeMethod,
    PerformResult, RpcError, RpcRequest, RpcResponse, RpcResult, StatementAccount,
    StatementEntry, StatementResult,
};
use crate::models::{Order, OrderStatus, PaymentType, TransactionState};
use crate::repository::{OrderRepository, SeatLedger};
use crate::services::expiry::ExpiryScheduler;
use crate::services::order_locks::OrderLocks;
use crate::services::orders::OrderService;
use crate::services::side_effects::SideEffects;

#[derive(Debug, Error)]
enum MethodError {
    #[error("protocol error {}", .0.code)]
    Protocol(RpcError),

    #[error(transparent)]
    Internal(#[from] OrderError),
}

impl From<RpcError> for MethodError {
    fn from(err: RpcError) -> Self {
        MethodError::Protocol(err)
    }
}

impl From<StoreError> for MethodError {
    fn from(err: StoreError) -> Self {
        MethodError::Internal(OrderError::Store(err))
    }
}

type MethodResult = Result<RpcResult, MethodError>;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn state_code(order: &Order) -> i32 {
    order.state.map(TransactionState::code).unwrap_or(0)
}

pub struct PaymeService {
    orders: Arc<dyn OrderRepository>,
    seats: Arc<dyn SeatLedger>,
    order_service: Arc<OrderService>,
    locks: Arc<OrderLocks>,
    scheduler: Arc<ExpiryScheduler>,
    effects: SideEffects,
}

impl PaymeService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        seats: Arc<dyn SeatLedger>,
        order_service: Arc<OrderService>,
        locks: Arc<OrderLocks>,
        scheduler: Arc<ExpiryScheduler>,
        effects: SideEffects,
    ) -> Self {
        Self {
            orders,
            seats,
            order_service,
            locks,
            scheduler,
            effects,
        }
    }

    /// Обрабатывает один JSON-RPC вызов. Ошибка всегда уходит конвертом
    /// JSON-RPC; HTTP 500 только для внутренних сбоев Perform и Check.
    pub async fn handle(&self, request: RpcRequest) -> (StatusCode, RpcResponse) {
        let id = request.request_id();

        let Some(method) = request
            .method
            .as_deref()
            .and_then(|m| m.parse::<PaymeMethod>().ok())
        else {
            warn!("Unknown Payme method {:?}", request.method);
            return (StatusCode::OK, RpcResponse::failure(id, RpcError::method_not_found()));
        };

        let params = request.params();
        info!(method = method.as_str(), request_id = %id, "Payme request");

        let outcome = match method {
            PaymeMethod::CheckPerformTransaction => self.check_perform(&params).await,
            PaymeMethod::CreateTransaction => self.create(&params).await,
            PaymeMethod::PerformTransaction => self.perform(&params).await,
            PaymeMethod::CheckTransaction => self.check(&params).await,
            PaymeMethod::CancelTransaction => self.cancel(&params).await,
            PaymeMethod::GetStatement => self.statement(&params).await,
        };

        match outcome {
            Ok(result) => (StatusCode::OK, RpcResponse::success(id, result)),
            Err(MethodError::Protocol(err)) => {
                info!(method = method.as_str(), code = err.code, "Payme request rejected");
                (StatusCode::OK, RpcResponse::failure(id, err))
            }
            Err(MethodError::Internal(err)) => {
                error!("Error in {}: {}", method.as_str(), err);
                let status = if method.server_error_is_http_500() {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                };
                let err = RpcError::server_error(method.server_error_code());
                (status, RpcResponse::failure(id, err))
            }
        }
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        match Uuid::parse_str(order_id) {
            Ok(id) => self.orders.find(id).await,
            Err(_) => Ok(None),
        }
    }

    // Сумма заказа по живым ценам в тийинах против присланной
    async fn ensure_amount(&self, order: &mut Order, params: &Params) -> Result<(), MethodError> {
        self.order_service.recompute_amount(order).await?;
        if params.amount() != Some(order.amount_in_minor_units()) {
            return Err(RpcError::incorrect_amount().into());
        }
        Ok(())
    }

    async fn check_perform(&self, params: &Params) -> MethodResult {
        let order_id = params.order_id().ok_or_else(RpcError::order_id_missing)?;
        let mut order = self
            .find_order(&order_id)
            .await?
            .ok_or_else(RpcError::order_not_found)?;

        self.ensure_amount(&mut order, params).await?;
        Ok(RpcResult::CheckPerform(CheckPerformResult { allow: true }))
    }

    async fn create(&self, params: &Params) -> MethodResult {
        let (Some(order_id), Some(transaction_id), Some(time)) =
            (params.order_id(), params.transaction_id(), params.time())
        else {
            return Err(RpcError::invalid_params().into());
        };

        let order_uuid = Uuid::parse_str(&order_id).map_err(|_| RpcError::order_not_found())?;
        let _guard = self.locks.acquire(order_uuid).await;

        let mut order = self
            .orders
            .find(order_uuid)
            .await?
            .ok_or_else(RpcError::order_not_found)?;
        self.ensure_amount(&mut order, params).await?;

        if let Some(existing) = self.orders.find_by_transaction(&transaction_id).await? {
            return Ok(RpcResult::Create(CreateResult {
                create_time: existing.create_time.unwrap_or(0),
                transaction: transaction_id,
                state: state_code(&existing),
            }));
        }

        if order.transaction_id.as_deref().is_some_and(|tx| tx != transaction_id) {
            return Err(RpcError::invalid_transaction_id().into());
        }

        order.transaction_id = Some(transaction_id.clone());
        order.create_time = Some(time);
        order.state = Some(TransactionState::Created);
        order.status = OrderStatus::Invoiced;
        order.payment_type = Some(PaymentType::Payme);
        self.order_service.persist(&mut order).await?;

        self.scheduler.cancel(order.id).await;
        info!("Transaction {} created for order {}", transaction_id, order.id);
        self.effects.order_changed(order.clone());

        Ok(RpcResult::Create(CreateResult {
            create_time: time,
            transaction: transaction_id,
            state: TransactionState::Created.code(),
        }))
    }

    // Находит заказ по транзакции, берёт его мьютекс и перечитывает под замком
    async fn lock_transaction(
        &self,
        params: &Params,
    ) -> Result<(Order, tokio::sync::OwnedMutexGuard<()>), MethodError> {
        let transaction_id = params
            .transaction_id()
            .ok_or_else(RpcError::transaction_id_missing)?;
        let order = self
            .orders
            .find_by_transaction(&transaction_id)
            .await?
            .ok_or_else(RpcError::transaction_not_found)?;

        let guard = self.locks.acquire(order.id).await;
        let order = self
            .orders
            .find(order.id)
            .await?
            .filter(|o| o.transaction_id.as_deref() == Some(transaction_id.as_str()))
            .ok_or_else(RpcError::transaction_not_found)?;
        Ok((order, guard))
    }

    async fn perform(&self, params: &Params) -> MethodResult {
        let (mut order, _guard) = self.lock_transaction(params).await?;
        let transaction = order.transaction_id.clone().unwrap_or_default();

        match order.state {
            Some(TransactionState::Performed) => {
                return Ok(RpcResult::Perform(PerformResult {
                    transaction,
                    perform_time: order.perform_time.unwrap_or(0),
                    state: TransactionState::Performed.code(),
                }));
            }
            Some(TransactionState::Created) => {}
            _ => return Err(RpcError::cannot_perform().into()),
        }

        let perform_time = now_ms();
        order.state = Some(TransactionState::Performed);
        order.perform_time = Some(perform_time);
        order.status = OrderStatus::Paid;
        self.order_service.persist(&mut order).await?;

        self.scheduler.cancel(order.id).await;
        match self.seats.finalize(order.id, &order.seat_ids()).await {
            Ok(sold) => info!("Order {} paid, {} seats sold", order.id, sold),
            Err(e) => warn!("Order {} paid but seats were not finalized: {}", order.id, e),
        }
        self.effects.payment_confirmed(order.clone());

        Ok(RpcResult::Perform(PerformResult {
            transaction,
            perform_time,
            state: TransactionState::Performed.code(),
        }))
    }

    async fn check(&self, params: &Params) -> MethodResult {
        let transaction_id = params
            .transaction_id()
            .ok_or_else(RpcError::transaction_id_missing)?;
        let order = self
            .orders
            .find_by_transaction(&transaction_id)
            .await?
            .ok_or_else(RpcError::transaction_not_found)?;

        Ok(RpcResult::Check(CheckResult {
            create_time: order.create_time.unwrap_or(0),
            perform_time: order.perform_time.unwrap_or(0),
            cancel_time: order.cancel_time.unwrap_or(0),
            transaction: transaction_id,
            state: state_code(&order),
            reason: order.reason,
        }))
    }

    async fn cancel(&self, params: &Params) -> MethodResult {
        let (mut order, _guard) = self.lock_transaction(params).await?;
        let transaction = order.transaction_id.clone().unwrap_or_default();

        let next = match order.state {
            Some(TransactionState::Created) => TransactionState::CancelledWhileHeld,
            Some(TransactionState::Performed) => TransactionState::CancelledAfterPerform,
            Some(state) if state.is_cancelled() => {
                return Ok(RpcResult::Cancel(CancelResult {
                    transaction,
                    cancel_time: order.cancel_time.unwrap_or(0),
                    state: state.code(),
                }));
            }
            _ => return Err(RpcError::invalid_state().into()),
        };

        let cancel_time = now_ms();
        order.state = Some(next);
        order.cancel_time = Some(cancel_time);
        order.reason = params.reason();
        order.status = OrderStatus::Cancelled;
        self.order_service.persist(&mut order).await?;

        self.scheduler.cancel(order.id).await;
        match self.seats.release(order.id, &order.seat_ids()).await {
            Ok(released) => info!(
                "Transaction {} cancelled with state {}, {} seats released",
                transaction,
                next.code(),
                released
            ),
            Err(e) => warn!("Order {} cancelled but seats were not released: {}", order.id, e),
        }
        self.effects.order_changed(order.clone());

        Ok(RpcResult::Cancel(CancelResult {
            transaction,
            cancel_time,
            state: next.code(),
        }))
    }

    async fn statement(&self, params: &Params) -> MethodResult {
        let (from, to) = params
            .statement_range()
            .ok_or_else(RpcError::statement_params_invalid)?;

        let orders = self.orders.list_created_between(from, to).await?;
        if orders.is_empty() {
            return Err(RpcError::statement_empty().into());
        }

        let transactions = orders
            .iter()
            .map(|order| StatementEntry {
                id: order.transaction_id.clone().unwrap_or_default(),
                time: order.create_time.unwrap_or(0),
                amount: order.amount_in_minor_units(),
                account: StatementAccount {
                    order_id: order.id.to_string(),
                },
                create_time: order.create_time.unwrap_or(0),
                perform_time: order.perform_time.unwrap_or(0),
                cancel_time: order.cancel_time.unwrap_or(0),
                state: state_code(order),
                reason: order.reason,
            })
            .collect();

        Ok(RpcResult::Statement(StatementResult { transactions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewLineItem, NewOrder, SeatStatus};
    use crate::services::expiry::ExpiryOutcome;
    use crate::services::testing::Harness;
    use serde_json::{json, Value};

    fn rpc(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            method: Some(method.to_string()),
            params: Some(params),
            id: Some(json!(1)),
        }
    }

    async fn call(h: &Harness, method: &str, params: Value) -> (StatusCode, Value) {
        let (status, response) = h.payme.handle(rpc(method, params)).await;
        (status, serde_json::to_value(response).unwrap())
    }

    async fn order_for(h: &Harness, seats: &[i64]) -> Order {
        let seats = seats
            .iter()
            .map(|seat| NewLineItem {
                event_title: Some("Concert".to_string()),
                date: None,
                start_time: None,
                card_image: None,
                seat: *seat,
            })
            .collect();
        h.orders.create(NewOrder { user: 1, seats }).await.unwrap()
    }

    fn create_params(order: &Order, tx: &str, amount: i64) -> Value {
        json!({
            "id": tx,
            "time": 1_700_000_000_000i64,
            "amount": amount,
            "account": { "orderId": order.id.to_string() }
        })
    }

    #[tokio::test]
    async fn unknown_method_is_32601() {
        let h = Harness::new().await;
        let (status, body) = call(&h, "Refund", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["id"], 1);
        assert!(body["error"].get("data").is_none());
    }

    #[tokio::test]
    async fn check_perform_compares_minor_units() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1, 2]).await;
        assert_eq!(order.amount, 50000);
        let account = json!({ "orderId": order.id.to_string() });

        let (_, ok) = call(
            &h,
            "CheckPerformTransaction",
            json!({ "amount": 5_000_000, "account": account.clone() }),
        )
        .await;
        assert_eq!(ok["result"], json!({ "allow": true }));

        let (_, mismatch) = call(
            &h,
            "CheckPerformTransaction",
            json!({ "amount": 4_000_000, "account": account }),
        )
        .await;
        assert_eq!(mismatch["error"]["code"], -31001);
        assert_eq!(mismatch["error"]["data"], "amount");
    }

    #[tokio::test]
    async fn check_perform_missing_and_unknown_order() {
        let h = Harness::new().await;
        let (_, missing) = call(&h, "CheckPerformTransaction", json!({ "amount": 1 })).await;
        assert_eq!(missing["error"]["code"], -32504);
        assert_eq!(missing["error"]["data"], "orderId");

        let (_, unknown) = call(
            &h,
            "CheckPerformTransaction",
            json!({ "amount": 1, "account": { "orderId": Uuid::new_v4().to_string() } }),
        )
        .await;
        assert_eq!(unknown["error"]["code"], -31050);

        let (_, garbage) = call(
            &h,
            "CheckPerformTransaction",
            json!({ "amount": 1, "account": { "orderId": "not-a-uuid" } }),
        )
        .await;
        assert_eq!(garbage["error"]["code"], -31050);
    }

    #[tokio::test]
    async fn create_is_idempotent_and_invoices_order() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1, 2]).await;
        let params = create_params(&order, "tx-1", 5_000_000);

        let (_, first) = call(&h, "CreateTransaction", params.clone()).await;
        let (_, second) = call(&h, "CreateTransaction", params).await;
        assert_eq!(first["result"], second["result"]);
        assert_eq!(
            first["result"],
            json!({ "create_time": 1_700_000_000_000i64, "transaction": "tx-1", "state": 1 })
        );

        let stored = h.orders.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Invoiced);
        assert_eq!(stored.state, Some(TransactionState::Created));
        assert_eq!(stored.payment_type, Some(PaymentType::Payme));
        assert_eq!(stored.amount, 50000);
        assert!(!h.scheduler.is_armed(order.id).await);
    }

    #[tokio::test]
    async fn create_with_wrong_amount_leaves_order_untouched() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1, 2]).await;

        let (_, body) = call(&h, "CreateTransaction", create_params(&order, "tx-1", 4_000_000)).await;
        assert_eq!(body["error"]["code"], -31001);

        let stored = h.orders.get(order.id).await.unwrap();
        assert_eq!(stored.transaction_id, None);
        assert_eq!(stored.status, OrderStatus::NotPaid);
    }

    #[tokio::test]
    async fn create_rejects_second_transaction_and_missing_params() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 2_000_000)).await;

        let (_, conflict) = call(&h, "CreateTransaction", create_params(&order, "tx-2", 2_000_000)).await;
        assert_eq!(conflict["error"]["code"], -31050);
        assert_eq!(conflict["error"]["data"], "id");

        let (_, missing) = call(
            &h,
            "CreateTransaction",
            json!({ "id": "tx-3", "account": { "orderId": order.id.to_string() } }),
        )
        .await;
        assert_eq!(missing["error"]["code"], -32504);
        assert_eq!(missing["error"]["data"], "params");
    }

    #[tokio::test]
    async fn perform_is_idempotent_and_fires_effects_once() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1, 2]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 5_000_000)).await;

        let (_, first) = call(&h, "PerformTransaction", json!({ "id": "tx-1" })).await;
        assert_eq!(first["result"]["state"], 2);
        let (_, second) = call(&h, "PerformTransaction", json!({ "id": "tx-1" })).await;
        assert_eq!(first["result"], second["result"]);

        let stored = h.orders.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Occupied);

        h.settle().await;
        let paid = h
            .notifier
            .statuses()
            .await
            .into_iter()
            .filter(|s| *s == OrderStatus::Paid)
            .count();
        assert_eq!(paid, 1);
        assert_eq!(h.mailer.sent().await, vec!["ali@example.com".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_performs_settle_once() {
        let h = Arc::new(Harness::new().await);
        let order = order_for(&h, &[1, 2]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 5_000_000)).await;

        let performs: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move {
                    call(&h, "PerformTransaction", json!({ "id": "tx-1" })).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for perform in performs {
            let (status, body) = perform.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["result"]["state"], 2);
            results.push(body["result"].clone());
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));

        h.settle().await;
        assert_eq!(
            h.notifier.statuses().await,
            vec![OrderStatus::NotPaid, OrderStatus::Invoiced, OrderStatus::Paid]
        );
        assert_eq!(h.mailer.sent().await, vec!["ali@example.com".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn expiry_racing_create_never_drops_an_invoice() {
        for _ in 0..20 {
            let h = Arc::new(Harness::new().await);
            let order = order_for(&h, &[1]).await;
            let order_id = order.id;

            let expiry = {
                let h = h.clone();
                tokio::spawn(async move { h.scheduler.expire(order_id).await.unwrap() })
            };
            let create = {
                let h = h.clone();
                let params = create_params(&order, "tx-1", 2_000_000);
                tokio::spawn(async move { call(&h, "CreateTransaction", params).await })
            };

            let outcome = expiry.await.unwrap();
            let (_, body) = create.await.unwrap();
            let stored = h.order_repo.find(order_id).await.unwrap();
            let seat = h.seats.get(1).await.unwrap();

            if body["result"]["state"] == 1 {
                assert_eq!(outcome, ExpiryOutcome::Kept(OrderStatus::Invoiced));
                assert_eq!(stored.map(|o| o.status), Some(OrderStatus::Invoiced));
                assert_eq!(seat.status, SeatStatus::Reserved);
            } else {
                assert_eq!(body["error"]["code"], -31050);
                assert_eq!(outcome, ExpiryOutcome::Expired { released: 1 });
                assert!(stored.is_none());
                assert_eq!(seat.status, SeatStatus::Free);
            }
        }
    }

    #[tokio::test]
    async fn perform_unknown_or_missing_transaction() {
        let h = Harness::new().await;
        let (_, missing) = call(&h, "PerformTransaction", json!({})).await;
        assert_eq!(missing["error"]["code"], -31050);
        assert_eq!(missing["error"]["data"], "id");

        let (status, unknown) = call(&h, "PerformTransaction", json!({ "id": "nope" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unknown["error"]["code"], -32504);
    }

    #[tokio::test]
    async fn cancel_before_and_after_perform() {
        let h = Harness::new().await;
        let held = order_for(&h, &[1]).await;
        let paid = order_for(&h, &[2]).await;
        call(&h, "CreateTransaction", create_params(&held, "tx-held", 2_000_000)).await;
        call(&h, "CreateTransaction", create_params(&paid, "tx-paid", 3_000_000)).await;
        call(&h, "PerformTransaction", json!({ "id": "tx-paid" })).await;

        let (_, first) = call(&h, "CancelTransaction", json!({ "id": "tx-held", "reason": 3 })).await;
        assert_eq!(first["result"]["state"], -1);
        let (_, refund) = call(&h, "CancelTransaction", json!({ "id": "tx-paid", "reason": 5 })).await;
        assert_eq!(refund["result"]["state"], -2);

        let (_, again) = call(&h, "CancelTransaction", json!({ "id": "tx-held" })).await;
        assert_eq!(again["result"], first["result"]);

        let stored = h.orders.get(held.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.reason, Some(3));
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Free);
        assert_eq!(h.seats.get(2).await.unwrap().status, SeatStatus::Free);

        let (_, perform) = call(&h, "PerformTransaction", json!({ "id": "tx-held" })).await;
        assert_eq!(perform["error"]["code"], -31008);
    }

    #[tokio::test]
    async fn check_transaction_reports_times_and_reason() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 2_000_000)).await;

        let (_, body) = call(&h, "CheckTransaction", json!({ "id": "tx-1" })).await;
        assert_eq!(
            body["result"],
            json!({
                "create_time": 1_700_000_000_000i64,
                "perform_time": 0,
                "cancel_time": 0,
                "transaction": "tx-1",
                "state": 1,
                "reason": null
            })
        );
    }

    #[tokio::test]
    async fn statement_lists_range_or_reports_empty() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1, 2]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 5_000_000)).await;

        let (_, body) = call(
            &h,
            "GetStatement",
            json!({ "from": 1_600_000_000_000i64, "to": 1_800_000_000_000i64 }),
        )
        .await;
        let entries = body["result"]["transactions"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "tx-1");
        assert_eq!(entries[0]["amount"], 5_000_000);
        assert_eq!(entries[0]["account"]["orderId"], order.id.to_string());

        let (_, empty) = call(&h, "GetStatement", json!({ "from": 1, "to": 2 })).await;
        assert_eq!(empty["error"]["code"], -32504);
        assert_eq!(empty["error"]["data"], Value::Null);

        let (_, invalid) = call(&h, "GetStatement", json!({ "from": "1", "to": 2 })).await;
        assert_eq!(invalid["error"]["code"], -31050);
        assert_eq!(invalid["error"]["data"], "params");
    }

    #[tokio::test(start_paused = true)]
    async fn invoiced_order_is_not_expired() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1]).await;
        call(&h, "CreateTransaction", create_params(&order, "tx-1", 2_000_000)).await;

        tokio::time::sleep(std::time::Duration::from_secs(20 * 60)).await;
        assert_eq!(h.scheduler.expire(order.id).await.unwrap(), ExpiryOutcome::Kept(OrderStatus::Invoiced));
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Reserved);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_order_is_gone_after_hold() {
        let h = Harness::new().await;
        let order = order_for(&h, &[1]).await;

        tokio::time::sleep(std::time::Duration::from_secs(16 * 60)).await;
        assert!(matches!(h.orders.get(order.id).await, Err(OrderError::OrderNotFound(_))));
        assert_eq!(h.seats.get(1).await.unwrap().status, SeatStatus::Free);

        let (_, body) = call(&h, "CreateTransaction", create_params(&order, "tx-1", 2_000_000)).await;
        assert_eq!(body["error"]["code"], -31050);
    }
}
