use axum::{Extension, Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, auth::Claims};
use crate::api::types::{KeyDto, PackDto, PurchaseKeyRequest, PurchaseResponse};
use crate::error::LedgerError;

/// POST /api/keys/purchase
/// Looks the pack up, then debits and mints in one transaction.
pub async fn purchase_key(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PurchaseKeyRequest>,
) -> Result<Json<ApiResponse<PurchaseResponse>>, ApiError> {
    let pack = state
        .catalog()
        .get(&payload.pack)
        .cloned()
        .ok_or_else(|| ApiError::from(LedgerError::UnknownPack(payload.pack.clone())))?;

    let key_config = state.config().read().await.keys.clone();

    let (key, balance) = state
        .store()
        .purchase_key(claims.user_id, &pack, &key_config)
        .await?;

    tracing::info!(
        "User {} purchased pack '{}' for {} (key {})",
        claims.user_id,
        pack.code,
        pack.price,
        key.id
    );

    Ok(Json(ApiResponse::success(PurchaseResponse {
        price: pack.price,
        balance,
        key: KeyDto::from(key),
    })))
}

/// GET /api/keys
pub async fn my_keys(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<KeyDto>>>, ApiError> {
    let keys = state.store().keys_for_user(claims.user_id).await?;
    let dtos: Vec<KeyDto> = keys.into_iter().map(KeyDto::from).collect();
    Ok(Json(ApiResponse::success(dtos)))
}

/// GET /api/packs
pub async fn list_packs(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<PackDto>>> {
    let dtos: Vec<PackDto> = state.catalog().packs().iter().map(PackDto::from).collect();
    Json(ApiResponse::success(dtos))
}
