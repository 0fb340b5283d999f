//! Wallet endpoints

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::member::WalletBalance, AppState};

use super::AuthenticatedUser;

/// Top-up request carrying the provider's payment reference
#[derive(Debug, Deserialize, ToSchema)]
pub struct TopUpRequest {
    pub payment_id: String,
}

/// Current balance of the caller's wallet
#[utoipa::path(
    get,
    path = "/wallet",
    tag = "wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet balance", body = WalletBalance),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<WalletBalance>> {
    let balance = state.services.wallet.balance(claims.member_id).await?;
    Ok(Json(balance))
}

/// Credit a captured payment to the caller's wallet
#[utoipa::path(
    post,
    path = "/wallet/top-up",
    tag = "wallet",
    security(("bearer_auth" = [])),
    request_body = TopUpRequest,
    responses(
        (status = 200, description = "New wallet balance", body = WalletBalance),
        (status = 400, description = "Payment not captured or in another currency"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn top_up(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<TopUpRequest>,
) -> AppResult<Json<WalletBalance>> {
    let balance = state
        .services
        .wallet
        .top_up(claims.member_id, &request.payment_id)
        .await?;
    Ok(Json(balance))
}
