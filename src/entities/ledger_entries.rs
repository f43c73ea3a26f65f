use sea_orm::entity::prelude::*;

/// Audit row written in the same transaction as every balance mutation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    /// Signed amount in the smallest currency unit.
    pub delta: i64,

    /// "deposit_approved", "key_purchase" or "admin_adjustment".
    pub kind: String,

    /// Id of the deposit or key that produced this entry, when one exists.
    pub ref_id: Option<i32>,

    pub reason: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
