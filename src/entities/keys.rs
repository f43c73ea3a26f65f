use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Owner; null for admin-minted unassigned keys.
    pub user_id: Option<i32>,

    #[sea_orm(unique)]
    pub code: String,

    pub pack_type: String,

    /// 0 means the key never expires.
    pub duration_minutes: i64,

    pub created_at: String,

    /// Null iff duration_minutes == 0. Expiry is always derived from this
    /// at read time, never stored as a flag.
    pub expires_at: Option<String>,

    pub device_id: Option<String>,
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
