//! Побочные эффекты изменения заказа: уведомление в бот и письмо об оплате.
//!
//! Запускаются после успешного сохранения заказа отдельной задачей, так что
//! сбой бота или SMTP не может ни задержать, ни откатить сам переход.
//! Задачи одного заказа выполняются строго в порядке вызова: уведомление об
//! оплате ждёт, пока бот запомнит сообщение о выставленном счёте.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Order;
use crate::repository::{SeatLedger, UserRepository};
use crate::services::mailer::{EmailSender, PAYMENT_SUCCESS_BODY, PAYMENT_SUCCESS_SUBJECT};
use crate::services::notifier::{OrderNotifier, OrderSnapshot};

// Последняя задача заказа в очереди: номер и сигнал её завершения
struct Tail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

#[derive(Default)]
struct Queues {
    next_ticket: u64,
    tails: HashMap<Uuid, Tail>,
}

#[derive(Clone)]
pub struct SideEffects {
    notifier: Arc<dyn OrderNotifier>,
    mailer: Arc<dyn EmailSender>,
    users: Arc<dyn UserRepository>,
    seats: Arc<dyn SeatLedger>,
    queues: Arc<Mutex<Queues>>,
}

impl SideEffects {
    pub fn new(
        notifier: Arc<dyn OrderNotifier>,
        mailer: Arc<dyn EmailSender>,
        users: Arc<dyn UserRepository>,
        seats: Arc<dyn SeatLedger>,
    ) -> Self {
        Self {
            notifier,
            mailer,
            users,
            seats,
            queues: Arc::default(),
        }
    }

    /// Отправляет снимок заказа в бот.
    pub fn order_changed(&self, order: Order) -> JoinHandle<()> {
        let effects = self.clone();
        self.enqueue(order.id, async move {
            effects.notify(&order).await;
        })
    }

    /// Уведомление об оплате и письмо покупателю.
    pub fn payment_confirmed(&self, order: Order) -> JoinHandle<()> {
        let effects = self.clone();
        self.enqueue(order.id, async move {
            effects.notify(&order).await;
            effects.send_receipt(&order).await;
        })
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Ставит задачу в хвост очереди заказа. Место в очереди занимается
    // синхронно, поэтому порядок задач совпадает с порядком вызовов.
    fn enqueue<F>(&self, order_id: Uuid, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let (ticket, previous) = {
            let mut queues = self.queues();
            queues.next_ticket += 1;
            let ticket = queues.next_ticket;
            let tail = Tail {
                ticket,
                done: done_rx,
            };
            (ticket, queues.tails.insert(order_id, tail))
        };

        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err: предыдущая задача упала, ждать больше нечего
                let _ = previous.done.await;
            }
            job.await;

            {
                let mut queues = queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if queues.tails.get(&order_id).is_some_and(|tail| tail.ticket == ticket) {
                    queues.tails.remove(&order_id);
                }
            }
            let _ = done_tx.send(());
        })
    }

    #[cfg(test)]
    fn queued_orders(&self) -> usize {
        self.queues().tails.len()
    }

    async fn snapshot(&self, order: &Order) -> OrderSnapshot {
        let user = self.users.find(order.user).await.unwrap_or_else(|e| {
            warn!("Failed to load user {} for order {}: {}", order.user, order.id, e);
            None
        });
        let seats = self
            .seats
            .find_priceable(&order.seat_ids())
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to load seats for order {}: {}", order.id, e);
                Vec::new()
            });
        OrderSnapshot::build(order, user.as_ref(), &seats)
    }

    async fn notify(&self, order: &Order) {
        let snapshot = self.snapshot(order).await;
        match self.notifier.order_changed(&snapshot).await {
            Ok(()) => debug!("Order {} notification delivered", order.id),
            Err(e) => warn!("Failed to notify about order {}: {:#}", order.id, e),
        }
    }

    async fn send_receipt(&self, order: &Order) {
        let email = match self.users.find(order.user).await {
            Ok(Some(user)) => user.email,
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load user {} for receipt: {}", order.user, e);
                None
            }
        };

        let Some(email) = email.filter(|e| !e.trim().is_empty()) else {
            debug!("Order {} owner has no email, receipt skipped", order.id);
            return;
        };

        if let Err(e) = self
            .mailer
            .send(&email, PAYMENT_SUCCESS_SUBJECT, PAYMENT_SUCCESS_BODY)
            .await
        {
            warn!("Failed to send receipt for order {}: {:#}", order.id, e);
        }
    }
}
