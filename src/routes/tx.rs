use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::Store;
use crate::error::LedgerError;
use crate::service::WalletService;
use crate::validate;

use super::utils::{ok, validate_principal, ApiError};
use super::views::{TransactionView, WalletView};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWalletRequest {
    pub username: String,
    pub currency: String,
}

/// Body of deposit and withdraw requests. `amount` is a decimal string.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovementRequest {
    pub amount: String,
    pub nonce: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination_wallet_id: i64,
    pub amount: String,
    pub nonce: i64,
}

#[derive(Debug, Serialize)]
struct WalletResponse {
    wallet: WalletView,
}

#[derive(Debug, Serialize)]
struct TransactionResponse {
    transaction: TransactionView,
}

async fn create_wallet<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    Json(payload): Json<CreateWalletRequest>,
) -> Result<Response, ApiError> {
    let wallet = service.create_wallet(&payload.username, &payload.currency).await?;
    Ok(ok(WalletResponse { wallet: wallet.into() }))
}

async fn deposit<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    headers: HeaderMap,
    Path(wallet_id): Path<i64>,
    Json(payload): Json<MovementRequest>,
) -> Result<Response, ApiError> {
    let principal = validate_principal(&headers)?;
    let amount = validate::amount_str(&payload.amount).map_err(LedgerError::from)?;

    let posting = match service.deposit(&principal, payload.nonce, wallet_id, amount).await {
        Ok(posting) => posting,
        Err(err) => {
            tracing::warn!("Deposit to wallet {} by {} failed: {}", wallet_id, principal, err);
            return Err(err.into());
        }
    };
    Ok(ok(TransactionResponse { transaction: posting.into() }))
}

async fn withdraw<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    headers: HeaderMap,
    Path(wallet_id): Path<i64>,
    Json(payload): Json<MovementRequest>,
) -> Result<Response, ApiError> {
    let principal = validate_principal(&headers)?;
    let amount = validate::amount_str(&payload.amount).map_err(LedgerError::from)?;

    let posting = match service.withdraw(&principal, payload.nonce, wallet_id, amount).await {
        Ok(posting) => posting,
        Err(err) => {
            tracing::warn!("Withdrawal from wallet {} by {} failed: {}", wallet_id, principal, err);
            return Err(err.into());
        }
    };
    Ok(ok(TransactionResponse { transaction: posting.into() }))
}

async fn transfer<S: Store>(
    State(service): State<Arc<WalletService<S>>>,
    headers: HeaderMap,
    Path(wallet_id): Path<i64>,
    Json(payload): Json<TransferRequest>,
) -> Result<Response, ApiError> {
    let principal = validate_principal(&headers)?;
    let amount = validate::amount_str(&payload.amount).map_err(LedgerError::from)?;

    let receipt = match service
        .transfer(&principal, payload.nonce, wallet_id, payload.destination_wallet_id, amount)
        .await
    {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::warn!(
                "Transfer from wallet {} to wallet {} by {} failed: {}",
                wallet_id,
                payload.destination_wallet_id,
                principal,
                err
            );
            return Err(err.into());
        }
    };
    Ok(ok(TransactionResponse { transaction: receipt.into() }))
}

pub fn tx_routes<S: Store>(service: Arc<WalletService<S>>) -> Router {
    Router::new()
        .route("/wallet", post(create_wallet::<S>))
        .route("/wallet/:wallet_id/deposit", post(deposit::<S>))
        .route("/wallet/:wallet_id/withdraw", post(withdraw::<S>))
        .route("/wallet/:wallet_id/transfer", post(transfer::<S>))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderValue, StatusCode};
    use base64::Engine;
    use serde_json::Value;

    use super::*;
    use crate::db::MemoryStore;

    fn basic(username: &str) -> HeaderMap {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:pw"));
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {encoded}")).unwrap());
        headers
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn setup(service: &Arc<WalletService<MemoryStore>>, username: &str, currency: &str) -> i64 {
        service.create_user(username).await.unwrap();
        service.create_wallet(username, currency).await.unwrap().id
    }

    #[tokio::test]
    async fn deposit_returns_transaction_with_credit_ledger() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        let wallet_id = setup(&service, "alice", "SGD").await;

        let response = deposit(
            State(service.clone()),
            basic("alice"),
            Path(wallet_id),
            Json(MovementRequest { amount: "40.123".to_string(), nonce: 1 }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let transaction = &body["data"]["transaction"];
        assert_eq!(transaction["status"], "success");
        assert_eq!(transaction["operation"], "deposit");
        assert_eq!(transaction["ledgers"][0]["entry_type"], "credit");
        assert_eq!(transaction["ledgers"][0]["balance"], "40.123");
        assert_eq!(transaction["metadata"]["amount"], "40.123");
    }

    #[tokio::test]
    async fn negative_deposit_is_invalid_amount() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        let wallet_id = setup(&service, "alice", "SGD").await;

        let err = deposit(
            State(service),
            basic("alice"),
            Path(wallet_id),
            Json(MovementRequest { amount: "-40".to_string(), nonce: 1 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "invalid_amount");
    }

    #[tokio::test]
    async fn deposit_without_credentials_is_unauthorized() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        let wallet_id = setup(&service, "alice", "SGD").await;

        let err = deposit(
            State(service),
            HeaderMap::new(),
            Path(wallet_id),
            Json(MovementRequest { amount: "1".to_string(), nonce: 1 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn withdraw_from_foreign_wallet_is_forbidden() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        let wallet_id = setup(&service, "alice", "SGD").await;
        setup(&service, "mallory", "SGD").await;

        let err = withdraw(
            State(service),
            basic("mallory"),
            Path(wallet_id),
            Json(MovementRequest { amount: "1".to_string(), nonce: 1 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn transfer_across_currencies_is_currency_mismatch() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        let source = setup(&service, "alice", "SGD").await;
        let destination = setup(&service, "bob", "USD").await;
        service.deposit("alice", 1, source, "60.2".parse().unwrap()).await.unwrap();

        let err = transfer(
            State(service),
            basic("alice"),
            Path(source),
            Json(TransferRequest { destination_wallet_id: destination, amount: "60.2".to_string(), nonce: 2 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "currency_mismatch");
    }

    #[tokio::test]
    async fn create_wallet_renders_zero_balance() {
        let service = Arc::new(WalletService::new(MemoryStore::new()));
        service.create_user("alice").await.unwrap();

        let response = create_wallet(
            State(service),
            Json(CreateWalletRequest { username: "alice".to_string(), currency: "sgd".to_string() }),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["wallet"]["balance"], "0");
        assert_eq!(body["data"]["wallet"]["currency"], "SGD");
    }
}
