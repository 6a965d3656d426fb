use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{Store, User};
use crate::service::WalletService;

use super::utils::{ok, ApiError};
use super::views::{TransactionView, UserWalletsView};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
struct CreateUserResponse {
    user: User,
}

#[derive(Debug, Serialize)]
struct TransactionsResponse {
    transactions: Vec<TransactionView>,
}

async fn create_user<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Response, ApiError> {
    let user = match service.create_user(&payload.username).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!("Failed to create user {}: {}", payload.username, err);
            return Err(err.into());
        }
    };
    Ok(ok(CreateUserResponse { user }))
}

async fn get_wallets<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let user_wallets = service.get_wallets(&username).await?;
    Ok(ok(UserWalletsView::from(user_wallets)))
}

// return all transactions a user requested or received, newest first
async fn get_transactions<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let history = service.get_transactions(&username).await?;
    let transactions = history.into_iter().map(TransactionView::from).collect();
    Ok(ok(TransactionsResponse { transactions }))
}

pub fn user_routes<S: Store>(service: Arc<WalletService<S>>) -> Router {
    Router::new()
        .route("/user", post(create_user::<S>))
        .route("/user/:username/wallets", get(get_wallets::<S>))
        .route("/user/:username/transactions", get(get_transactions::<S>))
        .with_state(service)
}
