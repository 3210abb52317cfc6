use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait, NotSet,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::cancellation::CancelSignal;
use crate::common::{DocumentKind, Paginated, PaginationLimits, PaginationParams};
use crate::db::{QueryBuilder, TxScope};
use crate::entities::contact::{self, Entity as Contact};
use crate::entities::process_delivery::{self, Entity as ProcessDelivery};
use crate::entities::process_invoice::{self, Entity as ProcessInvoice};
use crate::entities::sales_process::{self, Entity as SalesProcess};
use crate::errors::{DbResultExt, ServiceError};
use crate::status::{ensure_transition, DocumentStatus, ProcessStatus};

use super::{
    BaseRepository, DeliveryRecord, DocumentReaders, InvoiceRecord, ProcessLinker,
    PurchaseOrderRecord, QuotationRecord, Repository, SalesOrderRecord,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProcessInput {
    #[validate(length(min = 1, max = 255, message = "Process title is required"))]
    pub title: String,
    pub contact_id: i64,
    /// Defaults to open on create and to the stored status on update.
    pub status: Option<ProcessStatus>,
    pub notes: Option<String>,
}

/// A process with every document it references, each loaded through the
/// owning repository.
#[derive(Debug, Clone, Serialize)]
pub struct SalesProcessAggregate {
    #[serde(flatten)]
    pub process: sales_process::Model,
    pub contact: Option<contact::Model>,
    pub quotation: Option<QuotationRecord>,
    pub sales_order: Option<SalesOrderRecord>,
    pub purchase_order: Option<PurchaseOrderRecord>,
    pub deliveries: Vec<DeliveryRecord>,
    pub invoices: Vec<InvoiceRecord>,
}

pub struct SalesProcessRepository {
    base: BaseRepository,
    linker: Arc<ProcessLinker>,
    readers: DocumentReaders,
}

impl SalesProcessRepository {
    pub fn new(
        db: Arc<DatabaseConnection>,
        limits: PaginationLimits,
        linker: Arc<ProcessLinker>,
        readers: DocumentReaders,
    ) -> Self {
        Self {
            base: BaseRepository::new(db, limits),
            linker,
            readers,
        }
    }

    #[instrument(skip(self, input), fields(contact_id = input.contact_id))]
    pub async fn create(&self, input: ProcessInput) -> Result<sales_process::Model, ServiceError> {
        input.validate()?;

        let process = sales_process::ActiveModel {
            id: NotSet,
            title: Set(input.title),
            contact_id: Set(input.contact_id),
            status: Set(input.status.unwrap_or_else(ProcessStatus::initial)),
            quotation_id: Set(None),
            sales_order_id: Set(None),
            purchase_order_id: Set(None),
            notes: Set(input.notes),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(self.get_db())
        .await
        .db_context("inserting sales process")?;

        info!(process_id = process.id, "Sales process created");
        Ok(process)
    }

    /// Loads the process and every document it links to.
    ///
    /// A linked document that can no longer be read is left out of the
    /// aggregate; only failures on the process row, its contact or the link
    /// tables fail the call.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<SalesProcessAggregate, ServiceError> {
        let process = self.find(id).await?;
        self.assemble(process).await
    }

    pub async fn list(
        &self,
        params: PaginationParams,
    ) -> Result<Paginated<SalesProcessAggregate>, ServiceError> {
        self.page(QueryBuilder::new(), params).await
    }

    pub async fn list_by_contact(
        &self,
        contact_id: i64,
        params: PaginationParams,
    ) -> Result<Paginated<SalesProcessAggregate>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(sales_process::Column::ContactId.eq(contact_id)));
        self.page(query, params).await
    }

    pub async fn list_by_status(
        &self,
        status: ProcessStatus,
        params: PaginationParams,
    ) -> Result<Paginated<SalesProcessAggregate>, ServiceError> {
        let query = QueryBuilder::new()
            .filter(Condition::all().add(sales_process::Column::Status.eq(status)));
        self.page(query, params).await
    }

    /// Overwrites title, contact, status and notes. Document links are
    /// managed through the linker and left untouched.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: i64,
        input: ProcessInput,
    ) -> Result<sales_process::Model, ServiceError> {
        input.validate()?;

        let existing = self.find(id).await?;
        let status = input.status.unwrap_or(existing.status);
        if status != existing.status {
            ensure_transition(existing.status, status)?;
        }

        let mut active: sales_process::ActiveModel = existing.into();
        active.title = Set(input.title);
        active.contact_id = Set(input.contact_id);
        active.status = Set(status);
        active.notes = Set(input.notes);
        let process = active
            .update(self.get_db())
            .await
            .db_context("updating sales process")?;

        info!(process_id = id, status = %process.status, "Sales process updated");
        Ok(process)
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i64,
        status: ProcessStatus,
    ) -> Result<sales_process::Model, ServiceError> {
        let existing = self.find(id).await?;
        ensure_transition(existing.status, status)?;

        let mut active: sales_process::ActiveModel = existing.into();
        active.status = Set(status);
        let process = active
            .update(self.get_db())
            .await
            .db_context("updating sales process status")?;

        info!(process_id = id, status = %status, "Sales process status changed");
        Ok(process)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_with_signal(id, &CancelSignal::none()).await
    }

    /// Removes the link rows and then the process in one transaction. The
    /// linked documents stay.
    #[instrument(skip(self, signal))]
    pub async fn delete_with_signal(
        &self,
        id: i64,
        signal: &CancelSignal,
    ) -> Result<(), ServiceError> {
        let scope = TxScope::begin(self.get_db(), signal, "delete_sales_process").await?;
        let result = remove_process(&scope, id).await;
        scope.finish(result).await?;
        info!(process_id = id, "Sales process deleted");
        Ok(())
    }

    async fn find(&self, id: i64) -> Result<sales_process::Model, ServiceError> {
        SalesProcess::find_by_id(id)
            .one(self.get_db())
            .await
            .db_context("loading sales process")?
            .ok_or_else(|| ServiceError::not_found(DocumentKind::SalesProcess, id))
    }

    async fn page(
        &self,
        query: QueryBuilder<SalesProcess>,
        params: PaginationParams,
    ) -> Result<Paginated<SalesProcessAggregate>, ServiceError> {
        let mut page = query
            .order_by(sales_process::Column::Id, true)
            .fetch_page(self.get_db(), params, self.base.limits())
            .await?;

        // One aggregate load per row.
        let rows = std::mem::take(&mut page.items);
        let mut aggregates = Vec::with_capacity(rows.len());
        for process in rows {
            aggregates.push(self.assemble(process).await?);
        }
        Ok(page.with_items(aggregates))
    }

    async fn assemble(
        &self,
        process: sales_process::Model,
    ) -> Result<SalesProcessAggregate, ServiceError> {
        let process_id = process.id;
        let contact = process
            .find_related(Contact)
            .one(self.get_db())
            .await
            .db_context("loading sales process contact")?;

        let quotation = match process.quotation_id {
            Some(id) => linked(
                self.readers.quotations.get_by_id(id).await,
                process_id,
                DocumentKind::Quotation,
                id,
            ),
            None => None,
        };
        let sales_order = match process.sales_order_id {
            Some(id) => linked(
                self.readers.sales_orders.get_by_id(id).await,
                process_id,
                DocumentKind::SalesOrder,
                id,
            ),
            None => None,
        };
        let purchase_order = match process.purchase_order_id {
            Some(id) => linked(
                self.readers.purchase_orders.get_by_id(id).await,
                process_id,
                DocumentKind::PurchaseOrder,
                id,
            ),
            None => None,
        };

        let mut deliveries = Vec::new();
        for id in self.linker.delivery_ids(process_id).await? {
            let result = self.readers.deliveries.get_by_id(id).await;
            if let Some(delivery) = linked(result, process_id, DocumentKind::Delivery, id) {
                deliveries.push(delivery);
            }
        }

        let mut invoices = Vec::new();
        for id in self.linker.invoice_ids(process_id).await? {
            let result = self.readers.invoices.get_by_id(id).await;
            if let Some(invoice) = linked(result, process_id, DocumentKind::Invoice, id) {
                invoices.push(invoice);
            }
        }

        Ok(SalesProcessAggregate {
            process,
            contact,
            quotation,
            sales_order,
            purchase_order,
            deliveries,
            invoices,
        })
    }
}

impl Repository for SalesProcessRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

/// Keeps a linked document that loaded; drops one that did not.
fn linked<T>(
    result: Result<T, ServiceError>,
    process_id: i64,
    kind: DocumentKind,
    document_id: i64,
) -> Option<T> {
    match result {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(
                process_id,
                document_id,
                %kind,
                error = %err,
                "Skipping linked document that failed to load"
            );
            None
        }
    }
}

async fn remove_process(scope: &TxScope<'_>, id: i64) -> Result<(), ServiceError> {
    let txn = scope.txn();
    let deliveries = ProcessDelivery::delete_many()
        .filter(process_delivery::Column::ProcessId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting process delivery links")?;

    scope.checkpoint()?;
    let invoices = ProcessInvoice::delete_many()
        .filter(process_invoice::Column::ProcessId.eq(id))
        .exec(txn)
        .await
        .db_context("deleting process invoice links")?;
    debug!(
        process_id = id,
        deliveries = deliveries.rows_affected,
        invoices = invoices.rows_affected,
        "Cleared process links"
    );

    scope.checkpoint()?;
    let deleted = SalesProcess::delete_by_id(id)
        .exec(txn)
        .await
        .db_context("deleting sales process")?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::not_found(DocumentKind::SalesProcess, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_loads_are_dropped() {
        let missing: Result<u8, _> = Err(ServiceError::not_found(DocumentKind::Delivery, 7));
        assert_eq!(linked(missing, 1, DocumentKind::Delivery, 7), None);
        assert_eq!(linked(Ok(5u8), 1, DocumentKind::Delivery, 7), Some(5));
    }

    #[test]
    fn blank_title_is_rejected() {
        let input = ProcessInput {
            title: String::new(),
            contact_id: 1,
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
