use axum::{Extension, Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, auth::Claims, validation};
use crate::api::types::{CreateDepositRequest, DepositDto};

/// POST /api/deposits
/// Creates a pending deposit request for the calling user. Only an admin
/// approval later turns it into balance.
pub async fn create_deposit(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateDepositRequest>,
) -> Result<Json<ApiResponse<DepositDto>>, ApiError> {
    let amount = validation::validate_amount(payload.amount)?;
    let note = payload.note.unwrap_or_default();
    validation::validate_note(&note)?;

    let deposit = state
        .store()
        .create_deposit(claims.user_id, amount, &note)
        .await?;

    tracing::info!(
        "Deposit {} created by user {} for {}",
        deposit.id,
        claims.user_id,
        amount
    );

    Ok(Json(ApiResponse::success(DepositDto::from(deposit))))
}

/// GET /api/deposits
pub async fn my_deposits(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<DepositDto>>>, ApiError> {
    let deposits = state.store().deposits_for_user(claims.user_id).await?;
    let dtos: Vec<DepositDto> = deposits.into_iter().map(DepositDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}
