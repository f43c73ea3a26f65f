use serde::{Deserialize, Serialize};

use crate::catalog::Pack;
use crate::db::repositories::key;
use crate::db::{User, UserWithStats};
use crate::entities::{deposits, keys, ledger_entries};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub balance: i64,
    pub is_admin: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
    pub last_active_at: Option<String>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            balance: user.balance,
            is_admin: user.is_admin,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
            last_active_at: user.last_active_at,
        }
    }
}

/// User row as the admin listing shows it, with deposit/key aggregates.
#[derive(Debug, Serialize)]
pub struct AdminUserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub balance: i64,
    pub is_admin: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
    pub last_active_at: Option<String>,
    pub total_deposit_approved: i64,
    pub key_count: i64,
}

impl From<UserWithStats> for AdminUserDto {
    fn from(row: UserWithStats) -> Self {
        Self {
            id: row.user.id,
            username: row.user.username,
            email: row.user.email,
            balance: row.user.balance,
            is_admin: row.user.is_admin,
            created_at: row.user.created_at,
            last_login_at: row.user.last_login_at,
            last_active_at: row.user.last_active_at,
            total_deposit_approved: row.total_deposit_approved,
            key_count: row.key_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepositDto {
    pub id: i32,
    pub user_id: i32,
    pub amount: i64,
    pub note: String,
    pub status: String,
    pub created_at: String,
}

impl From<deposits::Model> for DepositDto {
    fn from(dep: deposits::Model) -> Self {
        Self {
            id: dep.id,
            user_id: dep.user_id,
            amount: dep.amount,
            note: dep.note,
            status: dep.status,
            created_at: dep.created_at,
        }
    }
}

/// Deposit row as the admin listing shows it, with the owning username.
#[derive(Debug, Serialize)]
pub struct AdminDepositDto {
    pub id: i32,
    pub user_id: i32,
    pub username: String,
    pub amount: i64,
    pub note: String,
    pub status: String,
    pub created_at: String,
}

impl AdminDepositDto {
    #[must_use]
    pub fn from_row(dep: deposits::Model, username: Option<String>) -> Self {
        Self {
            id: dep.id,
            user_id: dep.user_id,
            username: username.unwrap_or_else(|| "unknown".to_string()),
            amount: dep.amount,
            note: dep.note,
            status: dep.status,
            created_at: dep.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyDto {
    pub id: i32,
    pub user_id: Option<i32>,
    pub code: String,
    pub pack_type: String,
    pub duration_minutes: i64,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub device_id: Option<String>,
    /// Derived from expires_at at read time.
    pub is_expired: bool,
}

impl From<keys::Model> for KeyDto {
    fn from(key: keys::Model) -> Self {
        let is_expired = key::is_expired(key.expires_at.as_deref());
        Self {
            id: key.id,
            user_id: key.user_id,
            code: key.code,
            pack_type: key.pack_type,
            duration_minutes: key.duration_minutes,
            created_at: key.created_at,
            expires_at: key.expires_at,
            device_id: key.device_id,
            is_expired,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PackDto {
    pub code: String,
    pub price: i64,
    pub minutes: i64,
    pub label: String,
}

impl From<&Pack> for PackDto {
    fn from(pack: &Pack) -> Self {
        Self {
            code: pack.code.clone(),
            price: pack.price,
            minutes: pack.minutes,
            label: pack.label.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerEntryDto {
    pub id: i32,
    pub user_id: i32,
    pub delta: i64,
    pub kind: String,
    pub ref_id: Option<i32>,
    pub reason: Option<String>,
    pub created_at: String,
}

impl From<ledger_entries::Model> for LedgerEntryDto {
    fn from(entry: ledger_entries::Model) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            delta: entry.delta,
            kind: entry.kind,
            ref_id: entry.ref_id,
            reason: entry.reason,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserDto,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub price: i64,
    pub balance: i64,
    pub key: KeyDto,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    pub user: UserDto,
    pub deposits: Vec<DepositDto>,
    pub keys: Vec<KeyDto>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepositRequest {
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseKeyRequest {
    pub pack: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub delta: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManualCreateKeyRequest {
    #[serde(default)]
    pub time_label: Option<String>,
    #[serde(default)]
    pub minutes: Option<i64>,
    #[serde(default)]
    pub random_len: Option<usize>,
    #[serde(default)]
    pub user_id: Option<i32>,
}
