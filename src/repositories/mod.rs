use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::common::{DocumentKind, PaginationLimits};
use crate::db::DatabaseProvider;
use crate::errors::ServiceError;

pub mod contact_repository;
pub mod delivery_repository;
pub mod invoice_repository;
pub mod numbering;
pub mod process_linker;
pub mod purchase_order_repository;
pub mod quotation_repository;
pub mod sales_order_repository;
pub mod sales_process_repository;

pub use contact_repository::{ContactInput, ContactRepository};
pub use delivery_repository::{DeliveryInput, DeliveryItemInput, DeliveryRecord, DeliveryRepository};
pub use invoice_repository::{InvoiceInput, InvoiceRecord, InvoiceRepository, PaymentInput};
pub use process_linker::{DocumentReaders, LinkOutcome, ProcessLinker};
pub use purchase_order_repository::{
    PurchaseOrderInput, PurchaseOrderRecord, PurchaseOrderRepository,
};
pub use quotation_repository::{QuotationInput, QuotationRecord, QuotationRepository};
pub use sales_order_repository::{SalesOrderInput, SalesOrderRecord, SalesOrderRepository};
pub use sales_process_repository::{ProcessInput, SalesProcessAggregate, SalesProcessRepository};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
    limits: PaginationLimits,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> &PaginationLimits {
        &self.limits
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Point read by id, the seam the process linker and aggregator use to
/// reach into each document repository.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    type Record: Send;

    async fn get_by_id(&self, id: i64) -> Result<Self::Record, ServiceError>;
}

/// Priced line shared by quotations, sales orders, purchase orders and invoices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct LineItemInput {
    #[validate(length(min = 1, message = "Item description is required"))]
    pub description: String,
    #[validate(custom = "non_negative")]
    pub quantity: Decimal,
    #[validate(custom = "non_negative")]
    pub unit_price: Decimal,
    /// Defaults to `quantity * unit_price`.
    #[validate(custom = "non_negative")]
    pub line_total: Option<Decimal>,
}

impl LineItemInput {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            line_total: None,
        }
    }

    pub fn total(&self) -> Decimal {
        self.line_total
            .unwrap_or_else(|| self.quantity * self.unit_price)
    }
}

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// One-based item position for the `index`-th line.
pub(crate) fn position(index: usize) -> i32 {
    i32::try_from(index + 1).unwrap_or(i32::MAX)
}

/// An explicit document number wins unless it is blank.
pub(crate) fn explicit_number(number: &Option<String>) -> Option<String> {
    number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

pub(crate) fn ensure_no_dependents(
    kind: DocumentKind,
    id: i64,
    dependent: DocumentKind,
    count: u64,
) -> Result<(), ServiceError> {
    if count > 0 {
        return Err(ServiceError::RelatedRecordsExist {
            kind,
            id,
            dependent,
            count,
        });
    }
    Ok(())
}

/// Every repository, wired against one shared store handle.
#[derive(Clone)]
pub struct Repositories {
    pub contacts: Arc<ContactRepository>,
    pub quotations: Arc<QuotationRepository>,
    pub sales_orders: Arc<SalesOrderRepository>,
    pub purchase_orders: Arc<PurchaseOrderRepository>,
    pub deliveries: Arc<DeliveryRepository>,
    pub invoices: Arc<InvoiceRepository>,
    pub linker: Arc<ProcessLinker>,
    pub processes: Arc<SalesProcessRepository>,
}

impl Repositories {
    pub fn new(db: Arc<DatabaseConnection>, limits: PaginationLimits) -> Self {
        let contacts = Arc::new(ContactRepository::new(db.clone()));
        let quotations = Arc::new(QuotationRepository::new(db.clone(), limits));
        let sales_orders = Arc::new(SalesOrderRepository::new(db.clone(), limits));
        let purchase_orders = Arc::new(PurchaseOrderRepository::new(db.clone(), limits));
        let deliveries = Arc::new(DeliveryRepository::new(db.clone(), limits));
        let invoices = Arc::new(InvoiceRepository::new(db.clone(), limits));

        let readers = DocumentReaders {
            quotations: quotations.clone(),
            sales_orders: sales_orders.clone(),
            purchase_orders: purchase_orders.clone(),
            deliveries: deliveries.clone(),
            invoices: invoices.clone(),
        };
        let linker = Arc::new(ProcessLinker::new(db.clone(), readers.clone()));
        let processes = Arc::new(SalesProcessRepository::new(
            db,
            limits,
            linker.clone(),
            readers,
        ));

        Self {
            contacts,
            quotations,
            sales_orders,
            purchase_orders,
            deliveries,
            invoices,
            linker,
            processes,
        }
    }

    /// Connects through `provider` (once) and wires every repository to it.
    pub async fn from_provider(
        provider: &DatabaseProvider,
        limits: PaginationLimits,
    ) -> Result<Self, ServiceError> {
        let db = provider.connection().await?;
        Ok(Self::new(db, limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_defaults_to_quantity_times_price() {
        let item = LineItemInput::new("Widget", dec!(3), dec!(12.50));
        assert_eq!(item.total(), dec!(37.50));

        let discounted = LineItemInput {
            line_total: Some(dec!(30)),
            ..item
        };
        assert_eq!(discounted.total(), dec!(30));
    }

    #[test]
    fn negative_amounts_fail_validation() {
        let item = LineItemInput::new("Widget", dec!(-1), dec!(10));
        assert!(item.validate().is_err());
        assert!(LineItemInput::new("Widget", dec!(0), dec!(0)).validate().is_ok());
    }

    #[test]
    fn blank_description_fails_validation() {
        assert!(LineItemInput::new("", dec!(1), dec!(1)).validate().is_err());
    }

    #[test]
    fn blank_numbers_are_ignored() {
        assert_eq!(explicit_number(&None), None);
        assert_eq!(explicit_number(&Some("   ".into())), None);
        assert_eq!(
            explicit_number(&Some(" QUO-2026-0007 ".into())),
            Some("QUO-2026-0007".to_string())
        );
    }

    #[test]
    fn dependents_block() {
        assert!(ensure_no_dependents(DocumentKind::Invoice, 1, DocumentKind::Payment, 0).is_ok());
        assert!(ensure_no_dependents(DocumentKind::Invoice, 1, DocumentKind::Payment, 3).is_err());
    }
}
