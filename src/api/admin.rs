use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, validation};
use crate::api::types::{
    AdjustBalanceRequest, AdminDepositDto, AdminUserDto, BalanceResponse, DepositDto, KeyDto,
    LedgerEntryDto, ManualCreateKeyRequest, MessageResponse, UserDetailResponse, UserDto,
};
use crate::constants::codes;

// ============================================================================
// Deposits
// ============================================================================

/// GET /api/admin/deposits
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AdminDepositDto>>>, ApiError> {
    let rows = state.store().list_deposits().await?;
    let dtos: Vec<AdminDepositDto> = rows
        .into_iter()
        .map(|(dep, username)| AdminDepositDto::from_row(dep, username))
        .collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// POST /api/admin/deposits/{id}/approve
/// The only ordinary path that credits balance. Approving a terminal
/// deposit is a conflict, not a no-op.
pub async fn approve_deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let id = validation::validate_id(id)?;
    let balance = state.store().approve_deposit(id).await?;

    tracing::info!("Deposit {} approved", id);

    Ok(Json(ApiResponse::success(BalanceResponse { balance })))
}

/// POST /api/admin/deposits/{id}/reject
pub async fn reject_deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validation::validate_id(id)?;
    state.store().reject_deposit(id).await?;

    tracing::info!("Deposit {} rejected", id);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Deposit rejected".to_string(),
    })))
}

// ============================================================================
// Users
// ============================================================================

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AdminUserDto>>>, ApiError> {
    let rows = state.store().list_users_with_stats().await?;
    let dtos: Vec<AdminUserDto> = rows.into_iter().map(AdminUserDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// GET /api/admin/users/{id}
pub async fn get_user_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDetailResponse>>, ApiError> {
    let id = validation::validate_id(id)?;

    let user = state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let deposits = state.store().deposits_for_user(id).await?;
    let keys = state.store().keys_for_user(id).await?;

    Ok(Json(ApiResponse::success(UserDetailResponse {
        user: UserDto::from(user),
        deposits: deposits.into_iter().map(DepositDto::from).collect(),
        keys: keys.into_iter().map(KeyDto::from).collect(),
    })))
}

/// GET /api/admin/users/{id}/ledger
pub async fn get_user_ledger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<LedgerEntryDto>>>, ApiError> {
    let id = validation::validate_id(id)?;

    state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let entries = state.store().ledger_for_user(id).await?;
    let dtos: Vec<LedgerEntryDto> = entries.into_iter().map(LedgerEntryDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// POST /api/admin/users/{id}/delete
/// Hard delete, cascading to deposits, keys and ledger entries. Admin
/// accounts are protected.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validation::validate_id(id)?;
    state.store().delete_user(id).await?;

    tracing::info!("User {} deleted with all owned records", id);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "User and all owned records deleted".to_string(),
    })))
}

/// POST /api/admin/users/{id}/adjust-balance
/// Privileged escape hatch: moves balance with no matching deposit or key.
/// The audit trail is the ledger entry it writes.
pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<AdjustBalanceRequest>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let id = validation::validate_id(id)?;

    let balance = state
        .store()
        .adjust_balance(id, payload.delta, payload.reason.as_deref())
        .await?;

    tracing::info!(
        "Balance of user {} adjusted by {} ({})",
        id,
        payload.delta,
        payload.reason.as_deref().unwrap_or("no reason")
    );

    Ok(Json(ApiResponse::success(BalanceResponse { balance })))
}

// ============================================================================
// Keys
// ============================================================================

/// POST /api/admin/keys/manual-create
/// Mints a key with no debit; may leave it unassigned.
pub async fn manual_create_key(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ManualCreateKeyRequest>,
) -> Result<Json<ApiResponse<KeyDto>>, ApiError> {
    let time_label = payload.time_label.unwrap_or_else(|| "custom".to_string());
    let minutes = payload.minutes.unwrap_or(0);
    let random_len = payload.random_len.unwrap_or(codes::MIN_SUFFIX_LEN + 4);

    if let Some(user_id) = payload.user_id {
        validation::validate_id(user_id)?;
    }

    let key_config = state.config().read().await.keys.clone();

    let key = state
        .store()
        .manual_issue_key(&time_label, minutes, random_len, payload.user_id, &key_config)
        .await?;

    tracing::info!("Key {} manually issued ({})", key.id, key.pack_type);

    Ok(Json(ApiResponse::success(KeyDto::from(key))))
}

/// POST /api/admin/keys/{id}/delete
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validation::validate_id(id)?;
    state.store().delete_key(id).await?;

    tracing::info!("Key {} deleted", id);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Key deleted".to_string(),
    })))
}

/// POST /api/admin/keys/{id}/reset-device
/// Idempotent: clearing an already-null binding succeeds.
pub async fn reset_key_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validation::validate_id(id)?;
    state.store().reset_key_device(id).await?;

    tracing::info!("Device binding cleared for key {}", id);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Device binding cleared".to_string(),
    })))
}
