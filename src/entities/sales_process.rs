use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::status::ProcessStatus;

/// Quote-to-cash aggregate. References documents, never owns them.
///
/// The one-per-process documents are plain nullable columns; deliveries and
/// invoices go through the `process_deliveries` and `process_invoices` link
/// tables.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_processes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub contact_id: i64,
    pub status: ProcessStatus,
    pub quotation_id: Option<i64>,
    pub sales_order_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::process_delivery::Entity")]
    DeliveryLinks,
    #[sea_orm(has_many = "super::process_invoice::Entity")]
    InvoiceLinks,
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
}

impl Related<super::process_delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryLinks.def()
    }
}

impl Related<super::process_invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceLinks.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
