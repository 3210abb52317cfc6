use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::{Validate, ValidationError};

use crate::cancellation::CancelSignal;
use crate::common::{DateRange, DocumentKind, Paginated, PaginationLimits, PaginationParams};
use crate::db::{QueryBuilder, TxScope};
use crate::entities::contact::{self, Entity as Contact};
use crate::entities::delivery::{self, Entity as Delivery};
use crate::entities::purchase_order::{self, Entity as PurchaseOrder};
use crate::entities::purchase_order_item::{self, Entity as PurchaseOrderItem};
use crate::entities::sales_order::{self, Entity as SalesOrder};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, DocumentStatus, PurchaseOrderStatus};

use super::{
    ensure_no_dependents, explicit_number, non_negative, numbering, position, BaseRepository,
    DocumentReader, LineItemInput, Repository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_purchase_order_dates"))]
pub struct PurchaseOrderInput {
    /// Generated as `PO-YEAR-NNNN` when blank.
    pub po_number: Option<String>,
    /// Supplier.
    pub contact_id: i64,
    pub sales_order_id: Option<i64>,
    pub status: Option<PurchaseOrderStatus>,
    pub order_date: DateTime<Utc>,
    pub expected_delivery: DateTime<Utc>,
    #[validate(custom = "non_negative")]
    pub subtotal: Decimal,
    #[validate(custom = "non_negative")]
    pub tax_amount: Decimal,
    #[validate(custom = "non_negative")]
    pub discount_amount: Decimal,
    #[validate(custom = "non_negative")]
    pub grand_total: Decimal,
    pub notes: Option<String>,
    #[validate]
    pub items: Vec<LineItemInput>,
}

fn validate_purchase_order_dates(input: &PurchaseOrderInput) -> Result<(), ValidationError> {
    if input.expected_delivery < input.order_date {
        let mut err = ValidationError::new("expected_delivery");
        err.message = Some("expected_delivery must not precede order_date".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderRecord {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
    pub contact: Option<contact::Model>,
    pub sales_order: Option<sales_order::Model>,
}

#[derive(Debug)]
pub struct PurchaseOrderRepository {
    base: BaseRepository,
}

impl PurchaseOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
        }
    }

    pub async fn create(
        &self,
        input: PurchaseOrderInput,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        self.create_with_signal(input, &CancelSignal::none()).await
    }

    #[instrument(skip(self, input, signal), fields(contact_id = input.contact_id))]
    pub async fn create_with_signal(
        &self,
        input: PurchaseOrderInput,
        signal: &CancelSignal,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "create_purchase_order").await?;
        let result = insert_purchase_order(&scope, input).await;
        let (order, items) = scope.finish(result).await?;

        info!(
            purchase_order_id = order.id,
            number = %order.po_number,
            "Purchase order created"
        );
        self.with_references(order, items).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<PurchaseOrderRecord, ServiceError> {
        let order = find_in(self.get_db(), id).await?;
        self.load_record(order).await
    }

    pub async fn get_all(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn get_by_status(
        &self,
        status: PurchaseOrderStatus,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(purchase_order::Column::Status.eq(status)));
        self.page(query, params).await
    }

    pub async fn get_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(purchase_order::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    pub async fn get_by_period(
        &self,
        range: DateRange,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(purchase_order::Column::OrderDate.gte(range.start))
                .add(purchase_order::Column::OrderDate.lte(range.end)),
        );
        self.page(query, params).await
    }

    pub async fn get_by_sales_order(
        &self,
        sales_order_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(purchase_order::Column::SalesOrderId.eq(sales_order_id)));
        self.page(query, params).await
    }

    /// Open purchase orders whose expected delivery date has passed.
    ///
    /// Read-only: the stored status is never rewritten here.
    pub async fn get_overdue(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(purchase_order::Column::ExpectedDelivery.lt(Utc::now()))
                .add(purchase_order::Column::Status.is_not_in(PurchaseOrderStatus::closed_statuses())),
        );
        self.page(query, params).await
    }

    pub async fn update(
        &self,
        id: i64,
        input: PurchaseOrderInput,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        self.update_with_signal(id, input, &CancelSignal::none())
            .await
    }

    #[instrument(skip(self, input, signal))]
    pub async fn update_with_signal(
        &self,
        id: i64,
        input: PurchaseOrderInput,
        signal: &CancelSignal,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "update_purchase_order").await?;
        let result = overwrite_purchase_order(&scope, id, input).await;
        let (order, items) = scope.finish(result).await?;

        info!(purchase_order_id = id, status = %order.status, "Purchase order updated");
        self.with_references(order, items).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: PurchaseOrderStatus,
    ) -> Result<purchase_order::Model, ServiceError> {
        let signal = CancelSignal::none();
        let scope =
            TxScope::begin(self.get_db(), &signal, "update_purchase_order_status").await?;
        let result = async {
            let existing = find_in(scope.txn(), id).await?;
            ensure_transition(existing.status, status)?;
            let mut active: purchase_order::ActiveModel = existing.into();
            active.status = Set(status);
            active
                .update(scope.txn())
                .await
                .db_context("updating purchase order status")
        }
        .await;
        let order = scope.finish(result).await?;
        info!(purchase_order_id = id, status = %status, "Purchase order status changed");
        Ok(order)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Refused while any delivery references the purchase order.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_purchase_order").await?;
        let result = remove_purchase_order(&scope, id).await;
        scope.finish(result).await?;
        info!(purchase_order_id = id, "Purchase order deleted");
        Ok(())
    }

    async fn page(
        &self,
        query: QueryBuilder<PurchaseOrder>,
        params: PaginationParams,
    ) -> Result<Paginated<PurchaseOrderRecord>, ServiceError> {
        let mut page = query
            .order_by(purchase_order::Column::Id, true)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        let rows = std::mem::take(&mut page.items);
        let mut records = Vec::with_capacity(rows.len());
        for order in rows {
            records.push(self.load_record(order).await?);
        }
        Ok(page.with_items(records))
    }

    async fn load_record(
        &self,
        order: purchase_order::Model,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        let items = load_items(self.get_db(), order.id).await?;
        self.with_references(order, items).await
    }

    async fn with_references(
        &self,
        order: purchase_order::Model,
        items: Vec<purchase_order_item::Model>,
    ) -> Result<PurchaseOrderRecord, ServiceError> {
        let db = self.get_db();
        let contact = order
            .find_related(Contact)
            .one(db)
            .await
            .db_context("loading purchase order contact")?;
        let sales_order = match order.sales_order_id {
            Some(sales_order_id) => SalesOrder::find_by_id(sales_order_id)
                .one(db)
                .await
                .db_context("loading purchase order sales order")?,
            None => None,
        };
        Ok(PurchaseOrderRecord {
            purchase_order: order,
            items,
            contact,
            sales_order,
        })
    }
}

impl Repository for PurchaseOrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl DocumentReader for PurchaseOrderRepository {
    type Record = PurchaseOrderRecord;

    async fn get_by_id(&self, id: i64) -> Result<PurchaseOrderRecord, ServiceError> {
        PurchaseOrderRepository::get_by_id(self, id).await
    }
}

async fn find_in<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<purchase_order::Model, ServiceError> {
    PurchaseOrder::find_by_id(id)
        .one(conn)
        .await
        .db_context("loading purchase order")?
        .ok_or_else(|| ServiceError::not_found(DocumentKind::PurchaseOrder, id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    purchase_order_id: i64,
) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
    PurchaseOrderItem::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
        .order_by_asc(purchase_order_item::Column::Position)
        .all(conn)
        .await
        .db_context("loading purchase order items")
}

async fn insert_items(
    scope: &TxScope<'_>,
    purchase_order_id: i64,
    items: &[LineItemInput],
) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        scope.checkpoint()?;
        purchase_order_item::ActiveModel {
            id: NotSet,
            purchase_order_id: Set(purchase_order_id),
            position: Set(position(index)),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(item.total()),
        }
        .insert(scope.txn())
        .await
        .db_context("inserting purchase order item")?;
    }
    Ok(())
}

async fn insert_purchase_order(
    scope: &TxScope<'_>,
    input: PurchaseOrderInput,
) -> Result<(purchase_order::Model, Vec<purchase_order_item::Model>), ServiceError> {
    let txn = scope.txn();
    let po_number = match explicit_number(&input.po_number) {
        Some(number) => number,
        None => numbering::next_number(txn, DocumentKind::PurchaseOrder, Utc::now()).await?,
    };

    let order = purchase_order::ActiveModel {
        id: NotSet,
        po_number: Set(po_number),
        contact_id: Set(input.contact_id),
        sales_order_id: Set(input.sales_order_id),
        status: Set(input.status.unwrap_or_else(PurchaseOrderStatus::initial)),
        order_date: Set(input.order_date),
        expected_delivery: Set(input.expected_delivery),
        subtotal: Set(input.subtotal),
        tax_amount: Set(input.tax_amount),
        discount_amount: Set(input.discount_amount),
        grand_total: Set(input.grand_total),
        notes: Set(input.notes),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await
    .db_context("inserting purchase order")?;

    insert_items(scope, order.id, &input.items).await?;
    let items = load_items(txn, order.id).await?;
    Ok((order, items))
}

async fn overwrite_purchase_order(
    scope: &TxScope<'_>,
    id: i64,
    input: PurchaseOrderInput,
) -> Result<(purchase_order::Model, Vec<purchase_order_item::Model>), ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, id).await?;

    let status = input.status.unwrap_or(existing.status);
    ensure_transition(existing.status, status)?;
    let po_number = explicit_number(&input.po_number).unwrap_or_else(|| existing.po_number.clone());

    let mut active: purchase_order::ActiveModel = existing.into();
    active.po_number = Set(po_number);
    active.contact_id = Set(input.contact_id);
    active.sales_order_id = Set(input.sales_order_id);
    active.status = Set(status);
    active.order_date = Set(input.order_date);
    active.expected_delivery = Set(input.expected_delivery);
    active.subtotal = Set(input.subtotal);
    active.tax_amount = Set(input.tax_amount);
    active.discount_amount = Set(input.discount_amount);
    active.grand_total = Set(input.grand_total);
    active.notes = Set(input.notes);
    let order = active.update(txn).await.db_context("updating purchase order")?;

    let removed = PurchaseOrderItem::delete_many()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting purchase order items")?;
    debug!(purchase_order_id = id, removed = removed.rows_affected, "Replacing purchase order items");

    insert_items(scope, id, &input.items).await?;
    let items = load_items(txn, id).await?;
    Ok((order, items))
}

async fn remove_purchase_order(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();
    let deliveries = Delivery::find()
        .filter(delivery::Column::PurchaseOrderId.eq(id))
        .count(txn)
        .await
        .db_context("counting deliveries for purchase order")?;
    ensure_no_dependents(DocumentKind::PurchaseOrder, id, DocumentKind::Delivery, deliveries)?;

    scope.checkpoint()?;
    PurchaseOrderItem::delete_many()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting purchase order items")?;

    let deleted = PurchaseOrder::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting purchase order")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::PurchaseOrder, id));
    }
    Ok(())
}
