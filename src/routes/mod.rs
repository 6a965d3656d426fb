use std::sync::Arc;

use axum::Router;

use crate::db::Store;
use crate::service::WalletService;

pub mod tx;
pub mod user;
pub mod utils;
pub mod views;

/// All wallet endpoints, without middleware.
pub fn router<S: Store>(service: Arc<WalletService<S>>) -> Router {
    Router::new()
        .merge(user::user_routes(service.clone()))
        .merge(tx::tx_routes(service))
}
