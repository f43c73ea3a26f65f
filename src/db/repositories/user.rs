use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};
use std::collections::HashMap;
use tokio::task;

use crate::config::SecurityConfig;
use crate::constants::{deposit_status, ledger_kind};
use crate::entities::{deposits, keys, prelude::*, users};
use crate::error::LedgerError;

use super::ledger;

/// User data returned from the repository (without the password hash)
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub balance: i64,
    pub is_admin: bool,
    pub api_key: String,
    pub created_at: String,
    pub last_login_at: Option<String>,
    pub last_active_at: Option<String>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            balance: model.balance,
            is_admin: model.is_admin,
            api_key: model.api_key,
            created_at: model.created_at,
            last_login_at: model.last_login_at,
            last_active_at: model.last_active_at,
        }
    }
}

/// A user row with the aggregates the admin listing shows.
#[derive(Debug, Clone)]
pub struct UserWithStats {
    pub user: User,
    pub total_deposit_approved: i64,
    pub key_count: i64,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    /// Insert a new non-admin user with a freshly hashed password and a
    /// random API key. The caller is responsible for input validation and
    /// the duplicate-username check; the unique index backstops the race.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        email: &str,
        security: &SecurityConfig,
    ) -> Result<User> {
        let password = password.to_string();
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            email: Set(email.to_string()),
            balance: Set(0),
            is_admin: Set(false),
            api_key: Set(generate_api_key()),
            created_at: Set(now),
            last_login_at: Set(None),
            last_active_at: Set(None),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// Verify password for a user
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Verify API key and return the associated user
    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::ApiKey.eq(api_key))
            .one(&self.conn)
            .await
            .context("Failed to query user by API key")?;

        Ok(user.map(User::from))
    }

    /// Swap the user's API key for a fresh one. The old key stops
    /// authenticating the moment this returns.
    pub async fn regenerate_api_key(&self, user_id: i32) -> Result<String, LedgerError> {
        let user = Users::find_by_id(user_id)
            .one(&self.conn)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        let new_api_key = generate_api_key();

        let mut active: users::ActiveModel = user.into();
        active.api_key = Set(new_api_key.clone());
        active.update(&self.conn).await?;

        Ok(new_api_key)
    }

    /// Stamp both activity columns on successful login.
    pub async fn touch_login(&self, user_id: i32) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        Users::update_many()
            .col_expr(users::Column::LastLoginAt, Expr::value(now.clone()))
            .col_expr(users::Column::LastActiveAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to stamp login time")?;

        Ok(())
    }

    pub async fn touch_active(&self, user_id: i32) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        Users::update_many()
            .col_expr(users::Column::LastActiveAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to stamp activity time")?;

        Ok(())
    }

    /// All users with the aggregates the admin listing shows: total
    /// approved deposit volume and owned key count.
    pub async fn list_with_stats(&self) -> Result<Vec<UserWithStats>> {
        let users = Users::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        let approved = Deposits::find()
            .filter(deposits::Column::Status.eq(deposit_status::APPROVED))
            .all(&self.conn)
            .await
            .context("Failed to load approved deposits")?;

        let owned_keys = Keys::find()
            .filter(keys::Column::UserId.is_not_null())
            .all(&self.conn)
            .await
            .context("Failed to load keys")?;

        let mut approved_by_user: HashMap<i32, i64> = HashMap::new();
        for dep in approved {
            *approved_by_user.entry(dep.user_id).or_default() += dep.amount;
        }

        let mut keys_by_user: HashMap<i32, i64> = HashMap::new();
        for key in owned_keys {
            if let Some(owner) = key.user_id {
                *keys_by_user.entry(owner).or_default() += 1;
            }
        }

        Ok(users
            .into_iter()
            .map(|u| {
                let total_deposit_approved = approved_by_user.get(&u.id).copied().unwrap_or(0);
                let key_count = keys_by_user.get(&u.id).copied().unwrap_or(0);
                UserWithStats {
                    user: User::from(u),
                    total_deposit_approved,
                    key_count,
                }
            })
            .collect())
    }

    /// Direct admin balance mutation, the one path where balance moves
    /// without a matching deposit or key. Still bounded below by zero: a
    /// negative delta uses the same guarded update as purchases.
    pub async fn adjust_balance(
        &self,
        user_id: i32,
        delta: i64,
        reason: Option<&str>,
    ) -> Result<i64, LedgerError> {
        if delta == 0 {
            return Err(LedgerError::validation("delta must be non-zero"));
        }

        let txn = self.conn.begin().await?;

        let affected = if delta > 0 {
            Users::update_many()
                .col_expr(
                    users::Column::Balance,
                    Expr::col(users::Column::Balance).add(delta),
                )
                .filter(users::Column::Id.eq(user_id))
                .exec(&txn)
                .await?
                .rows_affected
        } else {
            Users::update_many()
                .col_expr(
                    users::Column::Balance,
                    Expr::col(users::Column::Balance).sub(-delta),
                )
                .filter(users::Column::Id.eq(user_id))
                .filter(users::Column::Balance.gte(-delta))
                .exec(&txn)
                .await?
                .rows_affected
        };

        if affected == 0 {
            let user = Users::find_by_id(user_id).one(&txn).await?;
            return match user {
                None => Err(LedgerError::UserNotFound(user_id)),
                Some(u) => Err(LedgerError::InsufficientFunds {
                    required: -delta,
                    balance: u.balance,
                }),
            };
        }

        ledger::record(
            &txn,
            user_id,
            delta,
            ledger_kind::ADMIN_ADJUSTMENT,
            None,
            reason,
        )
        .await?;

        let user = Users::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        txn.commit().await?;
        Ok(user.balance)
    }

    /// Hard delete of a user and everything it owns, in one transaction.
    /// Admin accounts are protected.
    pub async fn delete_cascade(&self, user_id: i32) -> Result<(), LedgerError> {
        let txn = self.conn.begin().await?;

        let user = Users::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        if user.is_admin {
            return Err(LedgerError::ProtectedAccount);
        }

        LedgerEntries::delete_many()
            .filter(crate::entities::ledger_entries::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        Keys::delete_many()
            .filter(keys::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        Deposits::delete_many()
            .filter(deposits::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        Users::delete_by_id(user_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(())
    }
}

/// Hash a password using Argon2id with the configured cost params.
pub fn hash_password(password: &str, security: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        security.argon2_memory_cost_kib,
        security.argon2_time_cost,
        security.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Generate a random API key (64 character hex string)
#[must_use]
pub fn generate_api_key() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
