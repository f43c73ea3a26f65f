use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::catalog::Pack;
use crate::config::{KeyConfig, SecurityConfig};
use crate::entities::{deposits, keys, ledger_entries};
use crate::error::LedgerError;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{User, UserWithStats};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // An in-memory SQLite database exists per connection, so the pool
        // must stay at a single connection or every handle sees its own DB.
        let max_connections = if in_memory { 1 } else { max_connections };
        let min_connections = min_connections.min(max_connections);

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn deposit_repo(&self) -> repositories::deposit::DepositRepository {
        repositories::deposit::DepositRepository::new(self.conn.clone())
    }

    fn key_repo(&self) -> repositories::key::KeyRepository {
        repositories::key::KeyRepository::new(self.conn.clone())
    }

    fn ledger_repo(&self) -> repositories::ledger::LedgerRepository {
        repositories::ledger::LedgerRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        security: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(username, password, email, security)
            .await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<User>> {
        self.user_repo().verify_api_key(api_key).await
    }

    pub async fn regenerate_api_key(&self, user_id: i32) -> Result<String, LedgerError> {
        self.user_repo().regenerate_api_key(user_id).await
    }

    pub async fn touch_last_login(&self, user_id: i32) -> Result<()> {
        self.user_repo().touch_login(user_id).await
    }

    pub async fn touch_last_active(&self, user_id: i32) -> Result<()> {
        self.user_repo().touch_active(user_id).await
    }

    pub async fn list_users_with_stats(&self) -> Result<Vec<UserWithStats>> {
        self.user_repo().list_with_stats().await
    }

    pub async fn adjust_balance(
        &self,
        user_id: i32,
        delta: i64,
        reason: Option<&str>,
    ) -> Result<i64, LedgerError> {
        self.user_repo().adjust_balance(user_id, delta, reason).await
    }

    pub async fn delete_user(&self, user_id: i32) -> Result<(), LedgerError> {
        self.user_repo().delete_cascade(user_id).await
    }

    // ========== Deposits ==========

    pub async fn create_deposit(
        &self,
        user_id: i32,
        amount: i64,
        note: &str,
    ) -> Result<deposits::Model, LedgerError> {
        self.deposit_repo().create(user_id, amount, note).await
    }

    pub async fn deposits_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<deposits::Model>, LedgerError> {
        self.deposit_repo().list_for_user(user_id).await
    }

    pub async fn list_deposits(
        &self,
    ) -> Result<Vec<(deposits::Model, Option<String>)>, LedgerError> {
        self.deposit_repo().list_all().await
    }

    pub async fn approve_deposit(&self, deposit_id: i32) -> Result<i64, LedgerError> {
        self.deposit_repo().approve(deposit_id).await
    }

    pub async fn reject_deposit(&self, deposit_id: i32) -> Result<(), LedgerError> {
        self.deposit_repo().reject(deposit_id).await
    }

    // ========== Keys ==========

    pub async fn purchase_key(
        &self,
        user_id: i32,
        pack: &Pack,
        key_config: &KeyConfig,
    ) -> Result<(keys::Model, i64), LedgerError> {
        self.key_repo().purchase(user_id, pack, key_config).await
    }

    pub async fn manual_issue_key(
        &self,
        time_label: &str,
        minutes: i64,
        random_len: usize,
        user_id: Option<i32>,
        key_config: &KeyConfig,
    ) -> Result<keys::Model, LedgerError> {
        self.key_repo()
            .manual_issue(time_label, minutes, random_len, user_id, key_config)
            .await
    }

    pub async fn keys_for_user(&self, user_id: i32) -> Result<Vec<keys::Model>, LedgerError> {
        self.key_repo().list_for_user(user_id).await
    }

    pub async fn reset_key_device(&self, key_id: i32) -> Result<(), LedgerError> {
        self.key_repo().reset_device(key_id).await
    }

    pub async fn delete_key(&self, key_id: i32) -> Result<(), LedgerError> {
        self.key_repo().delete(key_id).await
    }

    // ========== Ledger ==========

    pub async fn ledger_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<ledger_entries::Model>, sea_orm::DbErr> {
        self.ledger_repo().entries_for_user(user_id).await
    }
}
