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
use crate::entities::quotation::{self, Entity as Quotation};
use crate::entities::quotation_item::{self, Entity as QuotationItem};
use crate::entities::sales_order::{self, Entity as SalesOrder};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, DocumentStatus, QuotationStatus};

use super::{
    ensure_no_dependents, explicit_number, non_negative, numbering, position, BaseRepository,
    DocumentReader, LineItemInput, Repository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_quotation_dates"))]
pub struct QuotationInput {
    /// Generated as `QUO-YEAR-NNNN` when blank.
    pub quotation_number: Option<String>,
    pub contact_id: i64,
    /// Defaults to draft on create and to the stored status on update.
    pub status: Option<QuotationStatus>,
    pub issue_date: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
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

fn validate_quotation_dates(input: &QuotationInput) -> Result<(), ValidationError> {
    if input.valid_until < input.issue_date {
        let mut err = ValidationError::new("valid_until");
        err.message = Some("valid_until must not precede issue_date".into());
        return Err(err);
    }
    Ok(())
}

/// Quotation with its ordered items and contact.
#[derive(Debug, Clone, Serialize)]
pub struct QuotationRecord {
    #[serde(flatten)]
    pub quotation: quotation::Model,
    pub items: Vec<quotation_item::Model>,
    pub contact: Option<contact::Model>,
}

#[derive(Debug)]
pub struct QuotationRepository {
    base: BaseRepository,
}

impl QuotationRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
        }
    }

    pub async fn create(&self, input: QuotationInput) -> Result<QuotationRecord, ServiceError> {
        self.create_with_signal(input, &CancelSignal::none()).await
    }

    /// Inserts the quotation, then its items, then reloads the items, all in
    /// one transaction.
    #[instrument(skip(self, input, signal), fields(contact_id = input.contact_id))]
    pub async fn create_with_signal(
        &self,
        input: QuotationInput,
        signal: &CancelSignal,
    ) -> Result<QuotationRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "create_quotation").await?;
        let result = insert_quotation(&scope, input).await;
        let (quotation, items) = scope.finish(result).await?;

        info!(
            quotation_id = quotation.id,
            number = %quotation.quotation_number,
            "Quotation created"
        );
        self.with_contact(quotation, items).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<QuotationRecord, ServiceError> {
        let quotation = Quotation::find_by_id(id)
            .one(self.get_db())
            .await
            .db_context("loading quotation")?
            .ok_or_else(|| ServiceError::not_found(DocumentKind::Quotation, id))?;
        self.load_record(quotation).await
    }

    pub async fn get_all(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn get_by_status(
        &self,
        status: QuotationStatus,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        let query =
            QueryBuilder::new().filter(Condition::all().add(quotation::Column::Status.eq(status)));
        self.page(query, params).await
    }

    pub async fn get_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(quotation::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    /// Quotations issued within `range`.
    pub async fn get_by_period(
        &self,
        range: DateRange,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(quotation::Column::IssueDate.gte(range.start))
                .add(quotation::Column::IssueDate.lte(range.end)),
        );
        self.page(query, params).await
    }

    /// Draft or sent quotations whose validity has lapsed.
    ///
    /// Read-only: unlike overdue invoices, the stored status is left alone.
    pub async fn get_expired(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(quotation::Column::ValidUntil.lt(Utc::now()))
                .add(quotation::Column::Status.is_in(QuotationStatus::open_statuses())),
        );
        self.page(query, params).await
    }

    pub async fn update(
        &self,
        id: i64,
        input: QuotationInput,
    ) -> Result<QuotationRecord, ServiceError> {
        self.update_with_signal(id, input, &CancelSignal::none())
            .await
    }

    /// Overwrites the quotation and replaces its items wholesale.
    #[instrument(skip(self, input, signal))]
    pub async fn update_with_signal(
        &self,
        id: i64,
        input: QuotationInput,
        signal: &CancelSignal,
    ) -> Result<QuotationRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "update_quotation").await?;
        let result = overwrite_quotation(&scope, id, input).await;
        let (quotation, items) = scope.finish(result).await?;

        info!(quotation_id = id, status = %quotation.status, "Quotation updated");
        self.with_contact(quotation, items).await
    }

    /// Explicit status change, checked against the quotation state machine.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: QuotationStatus,
    ) -> Result<quotation::Model, ServiceError> {
        let signal = CancelSignal::none();
        let scope = TxScope::begin(self.get_db(), &signal, "update_quotation_status").await?;
        let result = async {
            let existing = find_in(scope.txn(), id).await?;
            ensure_transition(existing.status, status)?;
            let mut active: quotation::ActiveModel = existing.into();
            active.status = Set(status);
            active
                .update(scope.txn())
                .await
                .db_context("updating quotation status")
        }
        .await;
        let quotation = scope.finish(result).await?;
        info!(quotation_id = id, status = %status, "Quotation status changed");
        Ok(quotation)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Refused while any sales order references the quotation.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_quotation").await?;
        let result = remove_quotation(&scope, id).await;
        scope.finish(result).await?;
        info!(quotation_id = id, "Quotation deleted");
        Ok(())
    }

    async fn page(
        &self,
        query: QueryBuilder<Quotation>,
        params: PaginationParams,
    ) -> Result<Paginated<QuotationRecord>, ServiceError> {
        let mut page = query
            .order_by(quotation::Column::Id, true)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        let rows = std::mem::take(&mut page.items);
        let mut records = Vec::with_capacity(rows.len());
        for quotation in rows {
            records.push(self.load_record(quotation).await?);
        }
        Ok(page.with_items(records))
    }

    async fn load_record(
        &self,
        quotation: quotation::Model,
    ) -> Result<QuotationRecord, ServiceError> {
        let items = load_items(self.get_db(), quotation.id).await?;
        self.with_contact(quotation, items).await
    }

    async fn with_contact(
        &self,
        quotation: quotation::Model,
        items: Vec<quotation_item::Model>,
    ) -> Result<QuotationRecord, ServiceError> {
        let contact = quotation
            .find_related(Contact)
            .one(self.get_db())
            .await
            .db_context("loading quotation contact")?;
        Ok(QuotationRecord {
            quotation,
            items,
            contact,
        })
    }
}

impl Repository for QuotationRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl DocumentReader for QuotationRepository {
    type Record = QuotationRecord;

    async fn get_by_id(&self, id: i64) -> Result<QuotationRecord, ServiceError> {
        QuotationRepository::get_by_id(self, id).await
    }
}

async fn find_in<C: ConnectionTrait>(conn: &C, id: i64) -> Result<quotation::Model, ServiceError> {
    Quotation::find_by_id(id)
        .one(conn)
        .await
        .db_context("loading quotation")?
        .ok_or_else(|| ServiceError::not_found(DocumentKind::Quotation, id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    quotation_id: i64,
) -> Result<Vec<quotation_item::Model>, ServiceError> {
    QuotationItem::find()
        .filter(quotation_item::Column::QuotationId.eq(quotation_id))
        .order_by_asc(quotation_item::Column::Position)
        .all(conn)
        .await
        .db_context("loading quotation items")
}

async fn insert_items(
    scope: &TxScope<'_>,
    quotation_id: i64,
    items: &[LineItemInput],
) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        scope.checkpoint()?;
        quotation_item::ActiveModel {
            id: NotSet,
            quotation_id: Set(quotation_id),
            position: Set(position(index)),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(item.total()),
        }
        .insert(scope.txn())
        .await
        .db_context("inserting quotation item")?;
    }
    Ok(())
}

async fn insert_quotation(
    scope: &TxScope<'_>,
    input: QuotationInput,
) -> Result<(quotation::Model, Vec<quotation_item::Model>), ServiceError> {
    let txn = scope.txn();
    let quotation_number = match explicit_number(&input.quotation_number) {
        Some(number) => number,
        None => numbering::next_number(txn, DocumentKind::Quotation, Utc::now()).await?,
    };

    let quotation = quotation::ActiveModel {
        id: NotSet,
        quotation_number: Set(quotation_number),
        contact_id: Set(input.contact_id),
        status: Set(input.status.unwrap_or_else(QuotationStatus::initial)),
        issue_date: Set(input.issue_date),
        valid_until: Set(input.valid_until),
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
    .db_context("inserting quotation")?;

    insert_items(scope, quotation.id, &input.items).await?;
    let items = load_items(txn, quotation.id).await?;
    Ok((quotation, items))
}

async fn overwrite_quotation(
    scope: &TxScope<'_>,
    id: i64,
    input: QuotationInput,
) -> Result<(quotation::Model, Vec<quotation_item::Model>), ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, id).await?;

    let status = input.status.unwrap_or(existing.status);
    ensure_transition(existing.status, status)?;
    let quotation_number = explicit_number(&input.quotation_number)
        .unwrap_or_else(|| existing.quotation_number.clone());

    let mut active: quotation::ActiveModel = existing.into();
    active.quotation_number = Set(quotation_number);
    active.contact_id = Set(input.contact_id);
    active.status = Set(status);
    active.issue_date = Set(input.issue_date);
    active.valid_until = Set(input.valid_until);
    active.subtotal = Set(input.subtotal);
    active.tax_amount = Set(input.tax_amount);
    active.discount_amount = Set(input.discount_amount);
    active.grand_total = Set(input.grand_total);
    active.notes = Set(input.notes);
    let quotation = active.update(txn).await.db_context("updating quotation")?;

    let removed = QuotationItem::delete_many()
        .filter(quotation_item::Column::QuotationId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting quotation items")?;
    debug!(quotation_id = id, removed = removed.rows_affected, "Replacing quotation items");

    insert_items(scope, id, &input.items).await?;
    let items = load_items(txn, id).await?;
    Ok((quotation, items))
}

async fn remove_quotation(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();
    let orders = SalesOrder::find()
        .filter(sales_order::Column::QuotationId.eq(id))
        .count(txn)
        .await
        .db_context("counting sales orders for quotation")?;
    ensure_no_dependents(DocumentKind::Quotation, id, DocumentKind::SalesOrder, orders)?;

    scope.checkpoint()?;
    QuotationItem::delete_many()
        .filter(quotation_item::Column::QuotationId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting quotation items")?;

    let deleted = Quotation::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting quotation")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::Quotation, id));
    }
    Ok(())
}
