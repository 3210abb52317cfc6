use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::common::DocumentKind;
use crate::entities::process_delivery::{self, Entity as ProcessDelivery};
use crate::entities::process_invoice::{self, Entity as ProcessInvoice};
use crate::entities::sales_process::{self, Entity as SalesProcess};
use crate::errors::{DbResultExt, ServiceError};

use super::{
    DeliveryRecord, DocumentReader, InvoiceRecord, PurchaseOrderRecord, QuotationRecord,
    SalesOrderRecord,
};

/// Point readers for every document type, injected into the linker and the
/// aggregator at construction.
#[derive(Clone)]
pub struct DocumentReaders {
    pub quotations: Arc<dyn DocumentReader<Record = QuotationRecord>>,
    pub sales_orders: Arc<dyn DocumentReader<Record = SalesOrderRecord>>,
    pub purchase_orders: Arc<dyn DocumentReader<Record = PurchaseOrderRecord>>,
    pub deliveries: Arc<dyn DocumentReader<Record = DeliveryRecord>>,
    pub invoices: Arc<dyn DocumentReader<Record = InvoiceRecord>>,
}

/// What a link call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    Created,
    AlreadyLinked,
    /// A one-per-process slot was re-pointed away from `previous`.
    Replaced { previous: i64 },
}

/// One-per-process document slots, stored as columns on `sales_processes`.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Quotation,
    SalesOrder,
    PurchaseOrder,
}

impl Slot {
    fn kind(self) -> DocumentKind {
        match self {
            Slot::Quotation => DocumentKind::Quotation,
            Slot::SalesOrder => DocumentKind::SalesOrder,
            Slot::PurchaseOrder => DocumentKind::PurchaseOrder,
        }
    }

    fn current(self, process: &sales_process::Model) -> Option<i64> {
        match self {
            Slot::Quotation => process.quotation_id,
            Slot::SalesOrder => process.sales_order_id,
            Slot::PurchaseOrder => process.purchase_order_id,
        }
    }

    fn assign(self, active: &mut sales_process::ActiveModel, document_id: i64) {
        match self {
            Slot::Quotation => active.quotation_id = Set(Some(document_id)),
            Slot::SalesOrder => active.sales_order_id = Set(Some(document_id)),
            Slot::PurchaseOrder => active.purchase_order_id = Set(Some(document_id)),
        }
    }
}

/// Records which documents belong to which sales process.
///
/// Every link call reads the process, asks the owning repository for the
/// document, checks for an existing link and only then writes. These steps
/// are separate statements, not one transaction: a process or document
/// removed between the check and the write leaves a dangling link, which the
/// aggregator tolerates.
pub struct ProcessLinker {
    db: Arc<DatabaseConnection>,
    readers: DocumentReaders,
}

impl ProcessLinker {
    pub fn new(db: Arc<DatabaseConnection>, readers: DocumentReaders) -> Self {
        Self { db, readers }
    }

    #[instrument(skip(self))]
    pub async fn link_quotation(
        &self,
        process_id: i64,
        quotation_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        let process = self.find_process(process_id).await?;
        self.readers.quotations.get_by_id(quotation_id).await?;
        self.link_slot(process, Slot::Quotation, quotation_id).await
    }

    #[instrument(skip(self))]
    pub async fn link_sales_order(
        &self,
        process_id: i64,
        sales_order_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        let process = self.find_process(process_id).await?;
        self.readers.sales_orders.get_by_id(sales_order_id).await?;
        self.link_slot(process, Slot::SalesOrder, sales_order_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn link_purchase_order(
        &self,
        process_id: i64,
        purchase_order_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        let process = self.find_process(process_id).await?;
        self.readers
            .purchase_orders
            .get_by_id(purchase_order_id)
            .await?;
        self.link_slot(process, Slot::PurchaseOrder, purchase_order_id)
            .await
    }

    /// Adds a delivery to the process. Linking the same pair twice writes
    /// one row.
    #[instrument(skip(self))]
    pub async fn link_delivery(
        &self,
        process_id: i64,
        delivery_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        self.find_process(process_id).await?;
        self.readers.deliveries.get_by_id(delivery_id).await?;

        if self.is_linked_delivery(process_id, delivery_id).await? {
            debug!(process_id, delivery_id, "Delivery already linked");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        process_delivery::ActiveModel {
            id: NotSet,
            process_id: Set(process_id),
            delivery_id: Set(delivery_id),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .db_context("inserting process delivery link")?;

        counter!("sales_process.link.created", 1, "document" => "delivery");
        info!(process_id, delivery_id, "Delivery linked to process");
        Ok(LinkOutcome::Created)
    }

    #[instrument(skip(self))]
    pub async fn link_invoice(
        &self,
        process_id: i64,
        invoice_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        self.find_process(process_id).await?;
        self.readers.invoices.get_by_id(invoice_id).await?;

        if self.is_linked_invoice(process_id, invoice_id).await? {
            debug!(process_id, invoice_id, "Invoice already linked");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        process_invoice::ActiveModel {
            id: NotSet,
            process_id: Set(process_id),
            invoice_id: Set(invoice_id),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .db_context("inserting process invoice link")?;

        counter!("sales_process.link.created", 1, "document" => "invoice");
        info!(process_id, invoice_id, "Invoice linked to process");
        Ok(LinkOutcome::Created)
    }

    pub async fn is_linked_quotation(
        &self,
        process_id: i64,
        quotation_id: i64,
    ) -> Result<bool, ServiceError> {
        let process = self.find_process(process_id).await?;
        Ok(Slot::Quotation.current(&process) == Some(quotation_id))
    }

    pub async fn is_linked_sales_order(
        &self,
        process_id: i64,
        sales_order_id: i64,
    ) -> Result<bool, ServiceError> {
        let process = self.find_process(process_id).await?;
        Ok(Slot::SalesOrder.current(&process) == Some(sales_order_id))
    }

    pub async fn is_linked_purchase_order(
        &self,
        process_id: i64,
        purchase_order_id: i64,
    ) -> Result<bool, ServiceError> {
        let process = self.find_process(process_id).await?;
        Ok(Slot::PurchaseOrder.current(&process) == Some(purchase_order_id))
    }

    pub async fn is_linked_delivery(
        &self,
        process_id: i64,
        delivery_id: i64,
    ) -> Result<bool, ServiceError> {
        let count = ProcessDelivery::find()
            .filter(process_delivery::Column::ProcessId.eq(process_id))
            .filter(process_delivery::Column::DeliveryId.eq(delivery_id))
            .count(self.db.as_ref())
            .await
            .db_context("counting process delivery links")?;
        Ok(count > 0)
    }

    pub async fn is_linked_invoice(
        &self,
        process_id: i64,
        invoice_id: i64,
    ) -> Result<bool, ServiceError> {
        let count = ProcessInvoice::find()
            .filter(process_invoice::Column::ProcessId.eq(process_id))
            .filter(process_invoice::Column::InvoiceId.eq(invoice_id))
            .count(self.db.as_ref())
            .await
            .db_context("counting process invoice links")?;
        Ok(count > 0)
    }

    /// Linked delivery ids in link order.
    pub async fn delivery_ids(&self, process_id: i64) -> Result<Vec<i64>, ServiceError> {
        let links = ProcessDelivery::find()
            .filter(process_delivery::Column::ProcessId.eq(process_id))
            .order_by_asc(process_delivery::Column::Id)
            .all(self.db.as_ref())
            .await
            .db_context("loading process delivery links")?;
        Ok(links.into_iter().map(|link| link.delivery_id).collect())
    }

    /// Linked invoice ids in link order.
    pub async fn invoice_ids(&self, process_id: i64) -> Result<Vec<i64>, ServiceError> {
        let links = ProcessInvoice::find()
            .filter(process_invoice::Column::ProcessId.eq(process_id))
            .order_by_asc(process_invoice::Column::Id)
            .all(self.db.as_ref())
            .await
            .db_context("loading process invoice links")?;
        Ok(links.into_iter().map(|link| link.invoice_id).collect())
    }

    async fn find_process(&self, id: i64) -> Result<sales_process::Model, ServiceError> {
        SalesProcess::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .db_context("loading sales process")?
            .ok_or_else(|| ServiceError::not_found(DocumentKind::SalesProcess, id))
    }

    async fn link_slot(
        &self,
        process: sales_process::Model,
        slot: Slot,
        document_id: i64,
    ) -> Result<LinkOutcome, ServiceError> {
        let process_id = process.id;
        let kind = slot.kind();
        let previous = slot.current(&process);
        if previous == Some(document_id) {
            debug!(process_id, document_id, %kind, "Document already linked");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let mut active: sales_process::ActiveModel = process.into();
        slot.assign(&mut active, document_id);
        active
            .update(self.db.as_ref())
            .await
            .db_context("updating sales process link")?;

        counter!("sales_process.link.created", 1, "document" => kind.to_string());
        match previous {
            Some(previous) => {
                warn!(
                    process_id,
                    previous,
                    document_id,
                    %kind,
                    "Process already referenced another document; link replaced"
                );
                Ok(LinkOutcome::Replaced { previous })
            }
            None => {
                info!(process_id, document_id, %kind, "Document linked to process");
                Ok(LinkOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProcessStatus;

    fn process(quotation_id: Option<i64>) -> sales_process::Model {
        let now = Utc::now();
        sales_process::Model {
            id: 1,
            title: "Fit-out".into(),
            contact_id: 1,
            status: ProcessStatus::Open,
            quotation_id,
            sales_order_id: None,
            purchase_order_id: Some(9),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn slots_read_their_own_column() {
        let model = process(Some(4));
        assert_eq!(Slot::Quotation.current(&model), Some(4));
        assert_eq!(Slot::SalesOrder.current(&model), None);
        assert_eq!(Slot::PurchaseOrder.current(&model), Some(9));
        assert_eq!(Slot::PurchaseOrder.kind(), DocumentKind::PurchaseOrder);
    }

    #[test]
    fn assigning_a_slot_only_touches_that_column() {
        let mut active: sales_process::ActiveModel = process(None).into();
        Slot::Quotation.assign(&mut active, 12);
        assert_eq!(active.quotation_id, Set(Some(12)));
        assert!(!active.sales_order_id.is_set());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(LinkOutcome::Replaced { previous: 3 }).unwrap();
        assert_eq!(json["outcome"], "replaced");
        assert_eq!(json["previous"], 3);
    }
}
