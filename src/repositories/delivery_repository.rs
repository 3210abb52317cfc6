use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, NotSet, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::cancellation::CancelSignal;
use crate::common::{DateRange, DocumentKind, Paginated, PaginationLimits, PaginationParams};
use crate::db::{QueryBuilder, TxScope};
use crate::entities::contact::{self, Entity as Contact};
use crate::entities::delivery::{self, Entity as Delivery};
use crate::entities::delivery_item::{self, Entity as DeliveryItem};
use crate::entities::purchase_order::{self, Entity as PurchaseOrder};
use crate::entities::sales_order::{self, Entity as SalesOrder};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, DeliveryStatus, DocumentStatus};

use super::{
    explicit_number, non_negative, numbering, position, BaseRepository, DocumentReader,
    Repository,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeliveryItemInput {
    #[validate(length(min = 1, message = "Item description is required"))]
    pub description: String,
    #[validate(custom = "non_negative")]
    pub quantity: Decimal,
}

impl DeliveryItemInput {
    pub fn new(description: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DeliveryInput {
    /// Generated as `DEL-YEAR-NNNN` when blank.
    pub delivery_number: Option<String>,
    pub contact_id: i64,
    pub purchase_order_id: Option<i64>,
    pub sales_order_id: Option<i64>,
    pub status: Option<DeliveryStatus>,
    pub delivery_date: DateTime<Utc>,
    pub shipping_address: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    #[validate]
    pub items: Vec<DeliveryItemInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    #[serde(flatten)]
    pub delivery: delivery::Model,
    pub items: Vec<delivery_item::Model>,
    pub contact: Option<contact::Model>,
    pub purchase_order: Option<purchase_order::Model>,
    pub sales_order: Option<sales_order::Model>,
}

/// Deliveries have no dependents; deleting one is never refused.
#[derive(Debug)]
pub struct DeliveryRepository {
    base: BaseRepository,
}

impl DeliveryRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
        }
    }

    pub async fn create(&self, input: DeliveryInput) -> Result<DeliveryRecord, ServiceError> {
        self.create_with_signal(input, &CancelSignal::none()).await
    }

    /// Parent row first, items in a second pass, same transaction.
    #[instrument(skip(self, input, signal), fields(contact_id = input.contact_id))]
    pub async fn create_with_signal(
        &self,
        input: DeliveryInput,
        signal: &CancelSignal,
    ) -> Result<DeliveryRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "create_delivery").await?;
        let result = insert_delivery(&scope, input).await;
        let (delivery, items) = scope.finish(result).await?;

        info!(
            delivery_id = delivery.id,
            number = %delivery.delivery_number,
            "Delivery created"
        );
        self.with_references(delivery, items).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<DeliveryRecord, ServiceError> {
        let delivery = find_in(self.get_db(), id).await?;
        self.load_record(delivery).await
    }

    pub async fn get_all(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn get_by_status(
        &self,
        status: DeliveryStatus,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let query =
            QueryBuilder::new().filter(Condition::all().add(delivery::Column::Status.eq(status)));
        self.page(query, params).await
    }

    pub async fn get_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(delivery::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    pub async fn get_by_period(
        &self,
        range: DateRange,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(delivery::Column::DeliveryDate.gte(range.start))
                .add(delivery::Column::DeliveryDate.lte(range.end)),
        );
        self.page(query, params).await
    }

    pub async fn get_by_sales_order(
        &self,
        sales_order_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(delivery::Column::SalesOrderId.eq(sales_order_id)));
        self.page(query, params).await
    }

    pub async fn get_by_purchase_order(
        &self,
        purchase_order_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all().add(delivery::Column::PurchaseOrderId.eq(purchase_order_id)),
        );
        self.page(query, params).await
    }

    pub async fn update(
        &self,
        id: i64,
        input: DeliveryInput,
    ) -> Result<DeliveryRecord, ServiceError> {
        self.update_with_signal(id, input, &CancelSignal::none())
            .await
    }

    #[instrument(skip(self, input, signal))]
    pub async fn update_with_signal(
        &self,
        id: i64,
        input: DeliveryInput,
        signal: &CancelSignal,
    ) -> Result<DeliveryRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "update_delivery").await?;
        let result = overwrite_delivery(&scope, id, input).await;
        let (delivery, items) = scope.finish(result).await?;

        info!(delivery_id = id, status = %delivery.status, "Delivery updated");
        self.with_references(delivery, items).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: DeliveryStatus,
    ) -> Result<delivery::Model, ServiceError> {
        let signal = CancelSignal::none();
        let scope = TxScope::begin(self.get_db(), &signal, "update_delivery_status").await?;
        let result = async {
            let existing = find_in(scope.txn(), id).await?;
            ensure_transition(existing.status, status)?;
            let mut active: delivery::ActiveModel = existing.into();
            active.status = Set(status);
            active
                .update(scope.txn())
                .await
                .db_context("updating delivery status")
        }
        .await;
        let delivery = scope.finish(result).await?;
        info!(delivery_id = id, status = %status, "Delivery status changed");
        Ok(delivery)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Process links pointing at the delivery are left in place; the
    /// aggregate skips them on load.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_delivery").await?;
        let result = remove_delivery(&scope, id).await;
        scope.finish(result).await?;
        info!(delivery_id = id, "Delivery deleted");
        Ok(())
    }

    async fn page(
        &self,
        query: QueryBuilder<Delivery>,
        params: PaginationParams,
    ) -> Result<Paginated<DeliveryRecord>, ServiceError> {
        let mut page = query
            .order_by(delivery::Column::Id, true)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        let rows = std::mem::take(&mut page.items);
        let mut records = Vec::with_capacity(rows.len());
        for delivery in rows {
            records.push(self.load_record(delivery).await?);
        }
        Ok(page.with_items(records))
    }

    async fn load_record(&self, delivery: delivery::Model) -> Result<DeliveryRecord, ServiceError> {
        let items = load_items(self.get_db(), delivery.id).await?;
        self.with_references(delivery, items).await
    }

    async fn with_references(
        &self,
        delivery: delivery::Model,
        items: Vec<delivery_item::Model>,
    ) -> Result<DeliveryRecord, ServiceError> {
        let db = self.get_db();
        let contact = delivery
            .find_related(Contact)
            .one(db)
            .await
            .db_context("loading delivery contact")?;
        let purchase_order = match delivery.purchase_order_id {
            Some(purchase_order_id) => PurchaseOrder::find_by_id(purchase_order_id)
                .one(db)
                .await
                .db_context("loading delivery purchase order")?,
            None => None,
        };
        let sales_order = match delivery.sales_order_id {
            Some(sales_order_id) => SalesOrder::find_by_id(sales_order_id)
                .one(db)
                .await
                .db_context("loading delivery sales order")?,
            None => None,
        };
        Ok(DeliveryRecord {
            delivery,
            items,
            contact,
            purchase_order,
            sales_order,
        })
    }
}

impl Repository for DeliveryRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl DocumentReader for DeliveryRepository {
    type Record = DeliveryRecord;

    async fn get_by_id(&self, id: i64) -> Result<DeliveryRecord, ServiceError> {
        DeliveryRepository::get_by_id(self, id).await
    }
}

async fn find_in<C: ConnectionTrait>(conn: &C, id: i64) -> Result<delivery::Model, ServiceError> {
    Delivery::find_by_id(id)
        .one(conn)
        .await
        .db_context("loading delivery")?
        .ok_or_else(|| ServiceError::not_found(DocumentKind::Delivery, id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    delivery_id: i64,
) -> Result<Vec<delivery_item::Model>, ServiceError> {
    DeliveryItem::find()
        .filter(delivery_item::Column::DeliveryId.eq(delivery_id))
        .order_by_asc(delivery_item::Column::Position)
        .all(conn)
        .await
        .db_context("loading delivery items")
}

async fn insert_items(
    scope: &TxScope<'_>,
    delivery_id: i64,
    items: &[DeliveryItemInput],
) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        scope.checkpoint()?;
        delivery_item::ActiveModel {
            id: NotSet,
            delivery_id: Set(delivery_id),
            position: Set(position(index)),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
        }
        .insert(scope.txn())
        .await
        .db_context("inserting delivery item")?;
    }
    Ok(())
}

async fn insert_delivery(
    scope: &TxScope<'_>,
    input: DeliveryInput,
) -> Result<(delivery::Model, Vec<delivery_item::Model>), ServiceError> {
    let txn = scope.txn();
    let delivery_number = match explicit_number(&input.delivery_number) {
        Some(number) => number,
        None => numbering::next_number(txn, DocumentKind::Delivery, Utc::now()).await?,
    };

    let delivery = delivery::ActiveModel {
        id: NotSet,
        delivery_number: Set(delivery_number),
        contact_id: Set(input.contact_id),
        purchase_order_id: Set(input.purchase_order_id),
        sales_order_id: Set(input.sales_order_id),
        status: Set(input.status.unwrap_or_else(DeliveryStatus::initial)),
        delivery_date: Set(input.delivery_date),
        shipping_address: Set(input.shipping_address),
        tracking_number: Set(input.tracking_number),
        notes: Set(input.notes),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await
    .db_context("inserting delivery")?;

    insert_items(scope, delivery.id, &input.items).await?;
    let items = load_items(txn, delivery.id).await?;
    Ok((delivery, items))
}

async fn overwrite_delivery(
    scope: &TxScope<'_>,
    id: i64,
    input: DeliveryInput,
) -> Result<(delivery::Model, Vec<delivery_item::Model>), ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, id).await?;

    let status = input.status.unwrap_or(existing.status);
    ensure_transition(existing.status, status)?;
    let delivery_number = explicit_number(&input.delivery_number)
        .unwrap_or_else(|| existing.delivery_number.clone());

    let mut active: delivery::ActiveModel = existing.into();
    active.delivery_number = Set(delivery_number);
    active.contact_id = Set(input.contact_id);
    active.purchase_order_id = Set(input.purchase_order_id);
    active.sales_order_id = Set(input.sales_order_id);
    active.status = Set(status);
    active.delivery_date = Set(input.delivery_date);
    active.shipping_address = Set(input.shipping_address);
    active.tracking_number = Set(input.tracking_number);
    active.notes = Set(input.notes);
    let delivery = active.update(txn).await.db_context("updating delivery")?;

    let removed = DeliveryItem::delete_many()
        .filter(delivery_item::Column::DeliveryId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting delivery items")?;
    debug!(delivery_id = id, removed = removed.rows_affected, "Replacing delivery items");

    insert_items(scope, id, &input.items).await?;
    let items = load_items(txn, id).await?;
    Ok((delivery, items))
}

async fn remove_delivery(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();
    scope.checkpoint()?;
    DeliveryItem::delete_many()
        .filter(delivery_item::Column::DeliveryId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting delivery items")?;

    let deleted = Delivery::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting delivery")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::Delivery, id));
    }
    Ok(())
}
