pub mod circuit_breaker;
pub mod expiry;
pub mod mailer;
pub mod notifier;
pub mod order_locks;
pub mod orders;
pub mod payme;
pub mod pending_messages;
pub mod side_effects;
pub mod telegram;

#[cfg(test)]
pub mod testing;
