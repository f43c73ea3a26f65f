use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
    sea_query::{Expr, ExprTrait},
};

use crate::constants::{deposit_status, ledger_kind};
use crate::entities::{deposits, prelude::*, users};
use crate::error::LedgerError;

use super::ledger;

/// Repository for the deposit workflow. Approval is the only ordinary
/// producer of balance credits, and the status flip is atomic with the
/// credit: the guarded update below either wins the pending row or the
/// whole transaction rolls back.
pub struct DepositRepository {
    conn: DatabaseConnection,
}

impl DepositRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: i32,
        amount: i64,
        note: &str,
    ) -> Result<deposits::Model, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::validation("amount must be a positive integer"));
        }

        let active = deposits::ActiveModel {
            user_id: Set(user_id),
            amount: Set(amount),
            note: Set(note.trim().to_string()),
            status: Set(deposit_status::PENDING.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<deposits::Model>, LedgerError> {
        Ok(Deposits::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<deposits::Model>, LedgerError> {
        Ok(Deposits::find()
            .filter(deposits::Column::UserId.eq(user_id))
            .order_by_desc(deposits::Column::Id)
            .all(&self.conn)
            .await?)
    }

    /// All deposits paired with the owning username, newest first.
    pub async fn list_all(
        &self,
    ) -> Result<Vec<(deposits::Model, Option<String>)>, LedgerError> {
        let rows = Deposits::find()
            .find_also_related(Users)
            .order_by_desc(deposits::Column::Id)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(dep, user)| (dep, user.map(|u| u.username)))
            .collect())
    }

    /// Flip `pending -> approved` and credit the owner, atomically.
    /// Returns the owner's new balance. Re-approving a terminal deposit is
    /// an error, never a no-op: a second invocation must not credit twice.
    pub async fn approve(&self, deposit_id: i32) -> Result<i64, LedgerError> {
        let txn = self.conn.begin().await?;

        let dep = Deposits::find_by_id(deposit_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::DepositNotFound(deposit_id))?;

        // The filter on status is the real guard: of two concurrent
        // approvals only one update matches the pending row.
        let flipped = Deposits::update_many()
            .col_expr(
                deposits::Column::Status,
                Expr::value(deposit_status::APPROVED),
            )
            .filter(deposits::Column::Id.eq(deposit_id))
            .filter(deposits::Column::Status.eq(deposit_status::PENDING))
            .exec(&txn)
            .await?;

        if flipped.rows_affected == 0 {
            return Err(LedgerError::AlreadyProcessed(deposit_id));
        }

        Users::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).add(dep.amount),
            )
            .filter(users::Column::Id.eq(dep.user_id))
            .exec(&txn)
            .await?;

        ledger::record(
            &txn,
            dep.user_id,
            dep.amount,
            ledger_kind::DEPOSIT_APPROVED,
            Some(dep.id),
            None,
        )
        .await?;

        let user = Users::find_by_id(dep.user_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::UserNotFound(dep.user_id))?;

        txn.commit().await?;
        Ok(user.balance)
    }

    /// Flip `pending -> rejected`. No ledger effect.
    pub async fn reject(&self, deposit_id: i32) -> Result<(), LedgerError> {
        let txn = self.conn.begin().await?;

        Deposits::find_by_id(deposit_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::DepositNotFound(deposit_id))?;

        let flipped = Deposits::update_many()
            .col_expr(
                deposits::Column::Status,
                Expr::value(deposit_status::REJECTED),
            )
            .filter(deposits::Column::Id.eq(deposit_id))
            .filter(deposits::Column::Status.eq(deposit_status::PENDING))
            .exec(&txn)
            .await?;

        if flipped.rows_affected == 0 {
            return Err(LedgerError::AlreadyProcessed(deposit_id));
        }

        txn.commit().await?;
        Ok(())
    }
}
