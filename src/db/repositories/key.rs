use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};

use crate::catalog::Pack;
use crate::config::KeyConfig;
use crate::constants::{codes, ledger_kind};
use crate::entities::{keys, prelude::*, users};
use crate::error::LedgerError;

use super::ledger;

/// Repository for key issuance. A purchase is one transaction: the guarded
/// debit, the key insert and the audit row commit together or not at all.
/// No path debits without issuing or issues without debiting.
pub struct KeyRepository {
    conn: DatabaseConnection,
}

impl KeyRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Debit the pack price from the buyer and mint a key for it.
    /// Returns the key and the buyer's new balance.
    pub async fn purchase(
        &self,
        user_id: i32,
        pack: &Pack,
        key_config: &KeyConfig,
    ) -> Result<(keys::Model, i64), LedgerError> {
        let txn = self.conn.begin().await?;

        // Guarded debit: the balance check and the subtraction are one
        // statement, so two concurrent purchases against the same near-empty
        // balance cannot both win.
        let debited = Users::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).sub(pack.price),
            )
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::Balance.gte(pack.price))
            .exec(&txn)
            .await?;

        if debited.rows_affected == 0 {
            let user = Users::find_by_id(user_id).one(&txn).await?;
            return match user {
                None => Err(LedgerError::UserNotFound(user_id)),
                Some(u) => Err(LedgerError::InsufficientFunds {
                    required: pack.price,
                    balance: u.balance,
                }),
            };
        }

        let code = allocate_code(
            &txn,
            &key_config.code_prefix,
            &pack.label,
            key_config.code_suffix_len,
        )
        .await?;

        let key = insert_key(
            &txn,
            Some(user_id),
            &code,
            &pack.label,
            pack.minutes,
        )
        .await?;

        ledger::record(
            &txn,
            user_id,
            -pack.price,
            ledger_kind::KEY_PURCHASE,
            Some(key.id),
            None,
        )
        .await?;

        let user = Users::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        txn.commit().await?;
        Ok((key, user.balance))
    }

    /// Admin escape hatch: mint a key with no debit, optionally unassigned.
    pub async fn manual_issue(
        &self,
        time_label: &str,
        minutes: i64,
        random_len: usize,
        user_id: Option<i32>,
        key_config: &KeyConfig,
    ) -> Result<keys::Model, LedgerError> {
        if minutes < 0 {
            return Err(LedgerError::validation("minutes cannot be negative"));
        }

        let random_len = random_len.max(codes::MIN_SUFFIX_LEN);

        let txn = self.conn.begin().await?;

        if let Some(uid) = user_id {
            Users::find_by_id(uid)
                .one(&txn)
                .await?
                .ok_or(LedgerError::UserNotFound(uid))?;
        }

        let code = allocate_code(&txn, &key_config.code_prefix, time_label, random_len).await?;
        let key = insert_key(&txn, user_id, &code, time_label, minutes).await?;

        txn.commit().await?;
        Ok(key)
    }

    pub async fn get(&self, id: i32) -> Result<Option<keys::Model>, LedgerError> {
        Ok(Keys::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<keys::Model>, LedgerError> {
        Ok(Keys::find()
            .filter(keys::Column::UserId.eq(user_id))
            .order_by_desc(keys::Column::Id)
            .all(&self.conn)
            .await?)
    }

    /// Clear the device binding. Clearing an already-null binding is a
    /// no-op success.
    pub async fn reset_device(&self, key_id: i32) -> Result<(), LedgerError> {
        Keys::find_by_id(key_id)
            .one(&self.conn)
            .await?
            .ok_or(LedgerError::KeyNotFound(key_id))?;

        Keys::update_many()
            .col_expr(keys::Column::DeviceId, Expr::value(Option::<String>::None))
            .filter(keys::Column::Id.eq(key_id))
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn delete(&self, key_id: i32) -> Result<(), LedgerError> {
        let result = Keys::delete_by_id(key_id).exec(&self.conn).await?;

        if result.rows_affected == 0 {
            return Err(LedgerError::KeyNotFound(key_id));
        }
        Ok(())
    }
}

async fn insert_key<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<i32>,
    code: &str,
    pack_type: &str,
    minutes: i64,
) -> Result<keys::Model, LedgerError> {
    let now = chrono::Utc::now();
    let expires_at = if minutes > 0 {
        Some((now + chrono::Duration::minutes(minutes)).to_rfc3339())
    } else {
        None
    };

    let active = keys::ActiveModel {
        user_id: Set(user_id),
        code: Set(code.to_string()),
        pack_type: Set(pack_type.to_string()),
        duration_minutes: Set(minutes),
        created_at: Set(now.to_rfc3339()),
        expires_at: Set(expires_at),
        device_id: Set(None),
        ..Default::default()
    };

    let res = Keys::insert(active).exec(conn).await?;
    let key = Keys::find_by_id(res.last_insert_id)
        .one(conn)
        .await?
        .ok_or(LedgerError::KeyNotFound(res.last_insert_id))?;

    Ok(key)
}

/// Sample a fresh code and verify it against persisted codes before use.
/// Collisions are vanishingly rare at 16 alphanumeric characters, but codes
/// gate paid access, so the check runs inside the issuing transaction with
/// a bounded retry.
async fn allocate_code<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    label: &str,
    suffix_len: usize,
) -> Result<String, LedgerError> {
    for _ in 0..codes::MAX_ATTEMPTS {
        let code = format!("{}-{}-{}", prefix, label, random_suffix(suffix_len));

        let taken = Keys::find()
            .filter(keys::Column::Code.eq(&code))
            .count(conn)
            .await?;

        if taken == 0 {
            return Ok(code);
        }
    }

    Err(LedgerError::CodeCollision)
}

/// Uniform alphanumeric sample from the OS RNG.
fn random_suffix(len: usize) -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..codes::ALPHABET.len());
            codes::ALPHABET[idx] as char
        })
        .collect()
}

/// Expiry is derived from `expires_at` at read time, never stored.
#[must_use]
pub fn is_expired(expires_at: Option<&str>) -> bool {
    expires_at
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|dt| dt.with_timezone(&chrono::Utc) < chrono::Utc::now())
}
