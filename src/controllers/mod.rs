pub mod orders;
pub mod payme;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(orders::routes())
        .merge(payme::routes())
}
