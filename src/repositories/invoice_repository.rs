use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, Unchanged,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::cancellation::CancelSignal;
use crate::common::{DateRange, DocumentKind, Paginated, PaginationLimits, PaginationParams};
use crate::db::{QueryBuilder, TxScope};
use crate::entities::contact::{self, Entity as Contact};
use crate::entities::invoice::{self, Entity as Invoice};
use crate::entities::invoice_item::{self, Entity as InvoiceItem};
use crate::entities::payment::{self, Entity as Payment};
use crate::entities::sales_order::{self, Entity as SalesOrder};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, InvoiceStatus};

use super::{
    ensure_no_dependents, explicit_number, non_negative, numbering, position, BaseRepository,
    DocumentReader, LineItemInput, Repository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_invoice_dates"))]
pub struct InvoiceInput {
    /// Generated as `INV-YEAR-NNNN` when blank.
    pub invoice_number: Option<String>,
    pub contact_id: i64,
    pub sales_order_id: Option<i64>,
    /// Leaving this unset (or equal to the stored status) lets the status
    /// follow the payment position.
    pub status: Option<InvoiceStatus>,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[validate(custom = "non_negative")]
    pub subtotal: Decimal,
    #[validate(custom = "non_negative")]
    pub tax_amount: Decimal,
    #[validate(custom = "non_negative")]
    pub discount_amount: Decimal,
    #[validate(custom = "non_negative")]
    pub grand_total: Decimal,
    #[validate(custom = "non_negative")]
    pub amount_paid: Decimal,
    pub notes: Option<String>,
    #[validate]
    pub items: Vec<LineItemInput>,
}

fn validate_invoice_dates(input: &InvoiceInput) -> Result<(), ValidationError> {
    if input.due_date < input.issue_date {
        let mut err = ValidationError::new("due_date");
        err.message = Some("due_date must not precede issue_date".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentInput {
    #[validate(custom = "positive")]
    pub amount: Decimal,
    pub payment_date: DateTime<Utc>,
    #[validate(length(min = 1, max = 32))]
    pub method: String,
    pub reference: Option<String>,
}

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("Payment amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRecord {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
    pub contact: Option<contact::Model>,
    pub sales_order: Option<sales_order::Model>,
    pub payments: Vec<payment::Model>,
}

#[derive(Debug)]
pub struct InvoiceRepository {
    base: BaseRepository,
}

impl InvoiceRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
        }
    }

    pub async fn create(&self, input: InvoiceInput) -> Result<InvoiceRecord, ServiceError> {
        self.create_with_signal(input, &CancelSignal::none()).await
    }

    #[instrument(skip(self, input, signal), fields(contact_id = input.contact_id))]
    pub async fn create_with_signal(
        &self,
        input: InvoiceInput,
        signal: &CancelSignal,
    ) -> Result<InvoiceRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "create_invoice").await?;
        let result = insert_invoice(&scope, input).await;
        let (invoice, items) = scope.finish(result).await?;

        info!(
            invoice_id = invoice.id,
            number = %invoice.invoice_number,
            status = %invoice.status,
            "Invoice created"
        );
        self.with_references(invoice, items).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<InvoiceRecord, ServiceError> {
        let invoice = find_in(self.get_db(), id).await?;
        self.load_record(invoice).await
    }

    pub async fn get_all(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn get_by_status(
        &self,
        status: InvoiceStatus,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let query =
            QueryBuilder::new().filter(Condition::all().add(invoice::Column::Status.eq(status)));
        self.page(query, params).await
    }

    pub async fn get_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(invoice::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    pub async fn get_by_period(
        &self,
        range: DateRange,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let query = QueryBuilder::new().filter(
            Condition::all()
                .add(invoice::Column::IssueDate.gte(range.start))
                .add(invoice::Column::IssueDate.lte(range.end)),
        );
        self.page(query, params).await
    }

    pub async fn get_by_sales_order(
        &self,
        sales_order_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(invoice::Column::SalesOrderId.eq(sales_order_id)));
        self.page(query, params).await
    }

    /// Unsettled invoices past their due date, reported as `overdue`.
    ///
    /// This read writes: every returned invoice not yet stored as overdue is
    /// rewritten to overdue, one row at a time and outside any transaction.
    /// A failed write is logged and skipped; the returned record says
    /// `overdue` either way. No other read path in this crate writes.
    #[instrument(skip(self))]
    pub async fn get_overdue(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let query = QueryBuilder::<Invoice>::new()
            .filter(
                Condition::all()
                    .add(invoice::Column::DueDate.lt(Utc::now()))
                    .add(invoice::Column::Status.is_not_in(InvoiceStatus::settled_statuses())),
            )
            .order_by(invoice::Column::DueDate, false);
        let mut page = query
            .order_by(invoice::Column::Id, false)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        let rows = std::mem::take(&mut page.items);
        let mut records = Vec::with_capacity(rows.len());
        for mut invoice in rows {
            if invoice.status != InvoiceStatus::Overdue {
                self.mark_overdue(&invoice).await;
                invoice.status = InvoiceStatus::Overdue;
            }
            records.push(self.load_record(invoice).await?);
        }
        Ok(page.with_items(records))
    }

    async fn mark_overdue(&self, invoice: &invoice::Model) {
        let active = invoice::ActiveModel {
            id: Unchanged(invoice.id),
            status: Set(InvoiceStatus::Overdue),
            ..Default::default()
        };
        match active.update(self.get_db()).await {
            Ok(_) => debug!(invoice_id = invoice.id, from = %invoice.status, "Invoice marked overdue"),
            Err(err) => warn!(
                invoice_id = invoice.id,
                error = %err,
                "Failed to persist overdue status; reporting overdue anyway"
            ),
        }
    }

    pub async fn get_payments(&self, invoice_id: i64) -> Result<Vec<payment::Model>, ServiceError> {
        load_payments(self.get_db(), invoice_id).await
    }

    pub async fn update(&self, id: i64, input: InvoiceInput) -> Result<InvoiceRecord, ServiceError> {
        self.update_with_signal(id, input, &CancelSignal::none())
            .await
    }

    /// Overwrites the invoice and replaces its items. When the caller keeps
    /// the stored status, the status is then re-derived from the new
    /// `amount_paid` and `grand_total` and written in the same transaction.
    #[instrument(skip(self, input, signal))]
    pub async fn update_with_signal(
        &self,
        id: i64,
        input: InvoiceInput,
        signal: &CancelSignal,
    ) -> Result<InvoiceRecord, ServiceError> {
        input.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "update_invoice").await?;
        let result = overwrite_invoice(&scope, id, input).await;
        let (invoice, items) = scope.finish(result).await?;

        info!(invoice_id = id, status = %invoice.status, "Invoice updated");
        self.with_references(invoice, items).await
    }

    /// Explicit status change, checked against the invoice state machine.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: InvoiceStatus,
    ) -> Result<invoice::Model, ServiceError> {
        let signal = CancelSignal::none();
        let scope = TxScope::begin(self.get_db(), &signal, "update_invoice_status").await?;
        let result = async {
            let existing = find_in(scope.txn(), id).await?;
            ensure_transition(existing.status, status)?;
            let mut active: invoice::ActiveModel = existing.into();
            active.status = Set(status);
            active
                .update(scope.txn())
                .await
                .db_context("updating invoice status")
        }
        .await;
        let invoice = scope.finish(result).await?;
        info!(invoice_id = id, status = %status, "Invoice status changed");
        Ok(invoice)
    }

    pub async fn record_payment(
        &self,
        invoice_id: i64,
        payment: PaymentInput,
    ) -> Result<InvoiceRecord, ServiceError> {
        self.record_payment_with_signal(invoice_id, payment, &CancelSignal::none())
            .await
    }

    /// Inserts the payment, adds it to `amount_paid` and re-derives the
    /// status, all in one transaction.
    #[instrument(skip(self, payment, signal), fields(amount = %payment.amount))]
    pub async fn record_payment_with_signal(
        &self,
        invoice_id: i64,
        payment: PaymentInput,
        signal: &CancelSignal,
    ) -> Result<InvoiceRecord, ServiceError> {
        payment.validate()?;

        let scope = TxScope::begin(self.get_db(), signal, "record_invoice_payment").await?;
        let result = apply_payment(&scope, invoice_id, payment).await;
        let invoice = scope.finish(result).await?;

        info!(
            invoice_id,
            amount_paid = %invoice.amount_paid,
            status = %invoice.status,
            "Payment recorded"
        );
        self.load_record(invoice).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Refused while any payment references the invoice.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_invoice").await?;
        let result = remove_invoice(&scope, id).await;
        scope.finish(result).await?;
        info!(invoice_id = id, "Invoice deleted");
        Ok(())
    }

    async fn page(
        &self,
        query: QueryBuilder<Invoice>,
        params: PaginationParams,
    ) -> Result<Paginated<InvoiceRecord>, ServiceError> {
        let mut page = query
            .order_by(invoice::Column::Id, true)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        let rows = std::mem::take(&mut page.items);
        let mut records = Vec::with_capacity(rows.len());
        for invoice in rows {
            records.push(self.load_record(invoice).await?);
        }
        Ok(page.with_items(records))
    }

    async fn load_record(&self, invoice: invoice::Model) -> Result<InvoiceRecord, ServiceError> {
        let items = load_items(self.get_db(), invoice.id).await?;
        self.with_references(invoice, items).await
    }

    async fn with_references(
        &self,
        invoice: invoice::Model,
        items: Vec<invoice_item::Model>,
    ) -> Result<InvoiceRecord, ServiceError> {
        let db = self.get_db();
        let contact = invoice
            .find_related(Contact)
            .one(db)
            .await
            .db_context("loading invoice contact")?;
        let sales_order = match invoice.sales_order_id {
            Some(sales_order_id) => SalesOrder::find_by_id(sales_order_id)
                .one(db)
                .await
                .db_context("loading invoice sales order")?,
            None => None,
        };
        let payments = load_payments(db, invoice.id).await?;
        Ok(InvoiceRecord {
            invoice,
            items,
            contact,
            sales_order,
            payments,
        })
    }
}

impl Repository for InvoiceRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl DocumentReader for InvoiceRepository {
    type Record = InvoiceRecord;

    async fn get_by_id(&self, id: i64) -> Result<InvoiceRecord, ServiceError> {
        InvoiceRepository::get_by_id(self, id).await
    }
}

async fn find_in<C: ConnectionTrait>(conn: &C, id: i64) -> Result<invoice::Model, ServiceError> {
    Invoice::find_by_id(id)
        .one(conn)
        .await
        .db_context("loading invoice")?
        .ok_or_else(|| ServiceError::not_found(DocumentKind::Invoice, id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    invoice_id: i64,
) -> Result<Vec<invoice_item::Model>, ServiceError> {
    InvoiceItem::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_item::Column::Position)
        .all(conn)
        .await
        .db_context("loading invoice items")
}

async fn load_payments<C: ConnectionTrait>(
    conn: &C,
    invoice_id: i64,
) -> Result<Vec<payment::Model>, ServiceError> {
    Payment::find()
        .filter(payment::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::Id)
        .all(conn)
        .await
        .db_context("loading invoice payments")
}

async fn insert_items(
    scope: &TxScope<'_>,
    invoice_id: i64,
    items: &[LineItemInput],
) -> Result<(), ServiceError> {
    for (index, item) in items.iter().enumerate() {
        scope.checkpoint()?;
        invoice_item::ActiveModel {
            id: NotSet,
            invoice_id: Set(invoice_id),
            position: Set(position(index)),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(item.total()),
        }
        .insert(scope.txn())
        .await
        .db_context("inserting invoice item")?;
    }
    Ok(())
}

async fn insert_invoice(
    scope: &TxScope<'_>,
    input: InvoiceInput,
) -> Result<(invoice::Model, Vec<invoice_item::Model>), ServiceError> {
    let txn = scope.txn();
    let invoice_number = match explicit_number(&input.invoice_number) {
        Some(number) => number,
        None => numbering::next_number(txn, DocumentKind::Invoice, Utc::now()).await?,
    };
    let status = input.status.unwrap_or_else(|| {
        InvoiceStatus::derive(InvoiceStatus::Draft, input.amount_paid, input.grand_total)
    });

    let invoice = invoice::ActiveModel {
        id: NotSet,
        invoice_number: Set(invoice_number),
        contact_id: Set(input.contact_id),
        sales_order_id: Set(input.sales_order_id),
        status: Set(status),
        issue_date: Set(input.issue_date),
        due_date: Set(input.due_date),
        subtotal: Set(input.subtotal),
        tax_amount: Set(input.tax_amount),
        discount_amount: Set(input.discount_amount),
        grand_total: Set(input.grand_total),
        amount_paid: Set(input.amount_paid),
        notes: Set(input.notes),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await
    .db_context("inserting invoice")?;

    insert_items(scope, invoice.id, &input.items).await?;
    let items = load_items(txn, invoice.id).await?;
    Ok((invoice, items))
}

async fn overwrite_invoice(
    scope: &TxScope<'_>,
    id: i64,
    input: InvoiceInput,
) -> Result<(invoice::Model, Vec<invoice_item::Model>), ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, id).await?;
    let stored_status = existing.status;

    let requested = input.status.unwrap_or(stored_status);
    let explicit = requested != stored_status;
    if explicit {
        ensure_transition(stored_status, requested)?;
    }
    if input.amount_paid < existing.amount_paid {
        warn!(
            invoice_id = id,
            previous = %existing.amount_paid,
            new = %input.amount_paid,
            "Invoice amount_paid decreased"
        );
    }
    let invoice_number = explicit_number(&input.invoice_number)
        .unwrap_or_else(|| existing.invoice_number.clone());
    let (amount_paid, grand_total) = (input.amount_paid, input.grand_total);

    let mut active: invoice::ActiveModel = existing.into();
    active.invoice_number = Set(invoice_number);
    active.contact_id = Set(input.contact_id);
    active.sales_order_id = Set(input.sales_order_id);
    active.status = Set(requested);
    active.issue_date = Set(input.issue_date);
    active.due_date = Set(input.due_date);
    active.subtotal = Set(input.subtotal);
    active.tax_amount = Set(input.tax_amount);
    active.discount_amount = Set(input.discount_amount);
    active.grand_total = Set(grand_total);
    active.amount_paid = Set(amount_paid);
    active.notes = Set(input.notes);
    let mut invoice = active.update(txn).await.db_context("updating invoice")?;

    let removed = InvoiceItem::delete_many()
        .filter(invoice_item::Column::InvoiceId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting invoice items")?;
    debug!(invoice_id = id, removed = removed.rows_affected, "Replacing invoice items");
    insert_items(scope, id, &input.items).await?;

    if !explicit {
        let derived = InvoiceStatus::derive(stored_status, amount_paid, grand_total);
        if derived != invoice.status {
            scope.checkpoint()?;
            let mut active: invoice::ActiveModel = invoice.into();
            active.status = Set(derived);
            invoice = active
                .update(txn)
                .await
                .db_context("writing derived invoice status")?;
            debug!(invoice_id = id, status = %derived, "Invoice status derived from payments");
        }
    }

    let items = load_items(txn, id).await?;
    Ok((invoice, items))
}

async fn apply_payment(
    scope: &TxScope<'_>,
    invoice_id: i64,
    payment: PaymentInput,
) -> Result<invoice::Model, ServiceError> {
    let txn = scope.txn();
    let existing = find_in(txn, invoice_id).await?;
    if existing.status == InvoiceStatus::Cancelled {
        return Err(ServiceError::ValidationError(format!(
            "cannot record a payment against cancelled invoice {}",
            invoice_id
        )));
    }

    payment::ActiveModel {
        id: NotSet,
        invoice_id: Set(invoice_id),
        amount: Set(payment.amount),
        payment_date: Set(payment.payment_date),
        method: Set(payment.method),
        reference: Set(payment.reference),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await
    .db_context("inserting payment")?;

    scope.checkpoint()?;
    let amount_paid = existing.amount_paid + payment.amount;
    let status = InvoiceStatus::derive(existing.status, amount_paid, existing.grand_total);

    let mut active: invoice::ActiveModel = existing.into();
    active.amount_paid = Set(amount_paid);
    active.status = Set(status);
    active
        .update(txn)
        .await
        .db_context("applying payment to invoice")
}

async fn remove_invoice(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();
    let payments = Payment::find()
        .filter(payment::Column::InvoiceId.eq(id))
        .count(txn)
        .await
        .db_context("counting payments for invoice")?;
    ensure_no_dependents(DocumentKind::Invoice, id, DocumentKind::Payment, payments)?;

    scope.checkpoint()?;
    InvoiceItem::delete_many()
        .filter(invoice_item::Column::InvoiceId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting invoice items")?;

    let deleted = Invoice::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting invoice")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::Invoice, id));
    }
    Ok(())
}
