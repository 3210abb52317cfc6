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
use validator::Validate;

use crate::cancellation::CancelSignal;
use crate::common::{DateRange, DocumentKind, Paginated, PaginationLimits, PaginationParams};
use crate::db::{QueryBuilder, TxScope};
use crate::entities::contact::{self, Entity as Contact};
use crate::entities::delivery::{self, Entity as Delivery};
use crate::entities::invoice::{self, Entity as Invoice};
use crate::entities::purchase_order::{self, Entity as PurchaseOrder};
use crate::entities::quotation::{self, Entity as Quotation};
use crate::entities::sales_order::{self, Entity as SalesOrder};
use crate::entities::sales_order_item::{self, Entity as SalesOrderItem};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, DocumentStatus, SalesOrderStatus};

use super::{
    ensure_no_dependents, explicit_number, non_negative, numbering, position, BaseRepository,
    DocumentReader, LineItemInput, Repository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SalesOrderInput {
    /// Generated as `SO-YEAR-NNNN` when blank.
    pub order_number: Option<String>,
    pub contact_id: i64,
    pub quotation_id: Option<i64>,
    pub status: Option<SalesOrderStatus>,
    pub order_date: DateTime<Utc>,
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

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderRecord {
    #[serde(flatten)]
    pub sales_order: sales_order::Model,
    pub items: Vec<sales_order_item::Model>,
    pub contact: Option<contact::Model>,
    /// Quotation the order was raised from.
    pub quotation: Option<quotation::Model>,
}

#[derive(Debug)]
pub struct SalesOrderRepository {
    base: BaseRepository,
}

impl SalesOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
        }
    }

    pub async fn create(&self, input: SalesOrderInput) -> Result<SalesOrderRecord, ServiceError> {
        self.create_with_signal(input, &CancelSignal::none()).await
    }

    #[instrument(skip(self, input, signal), fields(contact_id = input.contact_id))]
    pub async fn create_with_signal(
        &self,
        input: SalesOrderInput,
        signal: &CancelSignal,
    ) -> Result<SalesOrderRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "create_sales_order").await?;
        let result = insert_sales_order(&scope, input).await;
        let (order, items) = scope.finish(result).await?;

        info!(
            sales_order_id = order.id,
            number = %order.order_number,
            "Sales order created"
        );
        self.with_references(order, items).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<SalesOrderRecord, ServiceError> {
        let order = find_in(self.get_db(), id).await?;
        self.load_record(order).await
    }

    pub async fn get_all(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn get_by_status(
        &self,
        status: SalesOrderStatus,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(sales_order::Column::Status.eq(status)));
        self.page(query, params).await
    }

    pub async fn get_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(sales_order::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    pub async fn get_by_period(
        &self,
        range: DateRange,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(sales_order::Column::OrderDate.gte(range.start))
                .add(sales_order::Column::OrderDate.lte(range.end)),
        );
        self.page(query, params).await
    }

    pub async fn get_by_quotation(
        &self,
        quotation_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(sales_order::Column::QuotationId.eq(quotation_id)));
        self.page(query, params).await
    }

    pub async fn update(
        &self,
        id: i64,
        input: SalesOrderInput,
    ) -> Result<SalesOrderRecord, ServiceError> {
        self.update_with_signal(id, input, &CancelSignal::none())
            .await
    }

    #[instrument(skip(self, input, signal))]
    pub async fn update_with_signal(
        &self,
        id: i64,
        input: SalesOrderInput,
        signal: &CancelSignal,
    ) -> Result<SalesOrderRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "update_sales_order").await?;
        let result = overwrite_sales_order(&scope, id, input).await;
        let (order, items) = scope.finish(result).await?;

        info!(sales_order_id = id, status = %order.status, "Sales order updated");
        self.with_references(order, items).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: SalesOrderStatus,
    ) -> Result<sales_order::Model, ServiceError> {
        let signal = CancelSignal::none();
        let scope = TxScope::begin(self.get_db(), &signal, "update_sales_order_status").await?;
        let result = async {
            let existing = find_in(scope.txn(), id).await?;
            ensure_transition(existing.status, status)?;
            let mut active: sales_order::ActiveModel = existing.into();
            active.status = Set(status);
            active
                .update(scope.txn())
                .await
                .db_context("updating sales order status")
        }
        .await;
        let order = scope.finish(result).await?;
        info!(sales_order_id = id, status = %status, "Sales order status changed");
        Ok(order)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Refused while purchase orders, deliveries or invoices reference the order.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_sales_order").await?;
        let result = remove_sales_order(&scope, id).await;
        scope.finish(result).await?;
        info!(sales_order_id = id, "Sales order deleted");
        Ok(())
    }

    async fn page(
        &self,
        query: QueryBuilder<SalesOrder>,
        params: PaginationParams,
    ) -> Result<Paginated<SalesOrderRecord>, ServiceError> {
        let mut page = query
            .order_by(sales_order::Column::Id, true)
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
        order: sales_order::Model,
    ) -> Result<SalesOrderRecord, ServiceError> {
        let items = load_items(self.get_db(), order.id).await?;
        self.with_references(order, items).await
    }

    async fn with_references(
        &self,
        order: sales_order::Model,
        items: Vec<sales_order_item::Model>,
    ) -> Result<SalesOrderRecord, ServiceError> {
        let db = self.get_db();
        let contact = order
            .find_related(Contact)
            .one(db)
            .await
            .db_context("loading sales order contact")?;
        let quotation = match order.quotation_id {
            Some(quotation_id) => Quotation::find_by_id(quotation_id)
                .one(db)
                .await
                .db_context("loading sales order quotation")?,
            None => None,
        };
        Ok(SalesOrderRecord {
            sales_order: order,
            items,
            contact,
            quotation,
        })
    }
}

impl Repository for SalesOrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl DocumentReader for SalesOrderRepository {
    type Record = SalesOrderRecord;

    async fn get_by_id(&self, id: i64) -> Result<SalesOrderRecord, ServiceError> {
        SalesOrderRepository::get_by_id(self, id).await
    }
}

async fn find_in<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<sales_order::Model, ServiceError> {
    SalesOrder::find_by_id(id)
        .one(conn)
        .await
        .db_context("loading sales order")?
        .ok_or_else(|| ServiceError::not_found(DocumentKind::SalesOrder, id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    sales_order_id: i64,
) -> Result<Vec<sales_order_item::Model>, ServiceError> {
    SalesOrderItem::find()
        .filter(sales_order_item::Column::SalesOrderId.eq(sales_order_id))
        .order_by_asc(sales_order_item::Column::Position)
        .all(conn)
        .await
        .db_context("loading sales order items")
}

async fn insert_items(
    scope: &TxScope<'_>,
    sales_order_id: i64,
    items: &[LineItemInput],
) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        scope.checkpoint()?;
        sales_order_item::ActiveModel {
            id: NotSet,
            sales_order_id: Set(sales_order_id),
            position: Set(position(index)),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(item.total()),
        }
        .insert(scope.txn())
        .await
        .db_context("inserting sales order item")?;
    }
    Ok(())
}

async fn insert_sales_order(
    scope: &TxScope<'_>,
    input: SalesOrderInput,
) -> Result<(sales_order::Model, Vec<sales_order_item::Model>), ServiceError> {
    let txn = scope.txn();
    let order_number = match explicit_number(&input.order_number) {
        Some(number) => number,
        None => numbering::next_number(txn, DocumentKind::SalesOrder, Utc::now()).await?,
    };

    let order = sales_order::ActiveModel {
        id: NotSet,
        order_number: Set(order_number),
        contact_id: Set(input.contact_id),
        quotation_id: Set(input.quotation_id),
        status: Set(input.status.unwrap_or_else(SalesOrderStatus::initial)),
        order_date: Set(input.order_date),
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
    .db_context("inserting sales order")?;

    insert_items(scope, order.id, &input.items).await?;
    let items = load_items(txn, order.id).await?;
    Ok((order, items))
}

async fn overwrite_sales_order(
    scope: &TxScope<'_>,
    id: i64,
    input: SalesOrderInput,
) -> Result<(sales_order::Model, Vec<sales_order_item::Model>), ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, id).await?;

    let status = input.status.unwrap_or(existing.status);
    ensure_transition(existing.status, status)?;
    let order_number =
        explicit_number(&input.order_number).unwrap_or_else(|| existing.order_number.clone());

    let mut active: sales_order::ActiveModel = existing.into();
    active.order_number = Set(order_number);
    active.contact_id = Set(input.contact_id);
    active.quotation_id = Set(input.quotation_id);
    active.status = Set(status);
    active.order_date = Set(input.order_date);
    active.subtotal = Set(input.subtotal);
    active.tax_amount = Set(input.tax_amount);
    active.discount_amount = Set(input.discount_amount);
    active.grand_total = Set(input.grand_total);
    active.notes = Set(input.notes);
    let order = active.update(txn).await.db_context("updating sales order")?;

    let removed = SalesOrderItem::delete_many()
        .filter(sales_order_item::Column::SalesOrderId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting sales order items")?;
    debug!(sales_order_id = id, removed = removed.rows_affected, "Replacing sales order items");

    insert_items(scope, id, &input.items).await?;
    let items = load_items(txn, id).await?;
    Ok((order, items))
}

async fn remove_sales_order(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();

    let purchase_orders = PurchaseOrder::find()
        .filter(purchase_order::Column::SalesOrderId.eq(id))
        .count(txn)
        .await
        .db_context("counting purchase orders for sales order")?;
    ensure_no_dependents(
        DocumentKind::SalesOrder,
        id,
        DocumentKind::PurchaseOrder,
        purchase_orders,
    )?;

    let deliveries = Delivery::find()
        .filter(delivery::Column::SalesOrderId.eq(id))
        .count(txn)
        .await
        .db_context("counting deliveries for sales order")?;
    ensure_no_dependents(DocumentKind::SalesOrder, id, DocumentKind::Delivery, deliveries)?;

    let invoices = Invoice::find()
        .filter(invoice::Column::SalesOrderId.eq(id))
        .count(txn)
        .await
        .db_context("counting invoices for sales order")?;
    ensure_no_dependents(DocumentKind::SalesOrder, id, DocumentKind::Invoice, invoices)?;

    scope.checkpoint()?;
    SalesOrderItem::delete_many()
        .filter(sales_order_item::Column::SalesOrderId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting sales order items")?;

    let deleted = SalesOrder::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting sales order")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::SalesOrder, id));
    }
    Ok(())
}
