use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::entities::{ledger_entries, prelude::*};

/// Repository for the balance audit trail
pub struct LedgerRepository {
    conn: DatabaseConnection,
}

impl LedgerRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn entries_for_user(&self, user_id: i32) -> Result<Vec<ledger_entries::Model>, DbErr> {
        LedgerEntries::find()
            .filter(ledger_entries::Column::UserId.eq(user_id))
            .order_by_desc(ledger_entries::Column::Id)
            .all(&self.conn)
            .await
    }
}

/// Write one audit row. Callers pass the transaction the balance mutation
/// runs in, so the entry commits or rolls back with it.
pub(crate) async fn record<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    delta: i64,
    kind: &str,
    ref_id: Option<i32>,
    reason: Option<&str>,
) -> Result<(), DbErr> {
    let entry = ledger_entries::ActiveModel {
        user_id: Set(user_id),
        delta: Set(delta),
        kind: Set(kind.to_string()),
        ref_id: Set(ref_id),
        reason: Set(reason.map(ToString::to_string)),
        created_at: Set(chrono::Utc::now().to_rfc3339()),
        ..Default::default()
    };

    LedgerEntries::insert(entry).exec(conn).await?;
    Ok(())
}
