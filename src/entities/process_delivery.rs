use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Link row between a sales process and a delivery.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "process_deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub process_id: i64,
    pub delivery_id: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_process::Entity",
        from = "Column::ProcessId",
        to = "super::sales_process::Column::Id"
    )]
    SalesProcess,
}

impl Related<super::sales_process::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesProcess.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
