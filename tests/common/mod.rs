#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sales_process_core::db::{DatabaseProvider, DbConfig};
use sales_process_core::repositories::{
    ContactInput, DeliveryInput, DeliveryItemInput, InvoiceInput, LineItemInput, ProcessInput,
    PurchaseOrderInput, QuotationInput, Repositories, SalesOrderInput,
};
use sales_process_core::PaginationLimits;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tempfile::TempDir;

/// Migrated SQLite store in a temp directory, with every repository wired to
/// it and one contact to hang documents on.
pub struct TestStore {
    pub repos: Repositories,
    pub db: Arc<DatabaseConnection>,
    pub contact_id: i64,
    _dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = sqlite_url(&dir);
        let provider = DatabaseProvider::new(DbConfig {
            url,
            max_connections: 4,
            min_connections: 1,
            ..Default::default()
        })
        .with_auto_migrate(true);
        let db = provider.connection().await.expect("connect and migrate");
        let repos = Repositories::new(db.clone(), PaginationLimits::default());

        let contact = repos
            .contacts
            .create(ContactInput {
                name: "Harbour Joinery".into(),
                email: Some("orders@harbour.test".into()),
                company: Some("Harbour Joinery Ltd".into()),
            })
            .await
            .expect("seed contact");

        Self {
            repos,
            db,
            contact_id: contact.id,
            _dir: dir,
        }
    }

    /// Runs raw SQL, used to install failure triggers.
    pub async fn execute(&self, sql: &str) {
        self.db.execute_unprepared(sql).await.expect("raw sql");
    }

    pub fn quotation(&self, items: Vec<LineItemInput>) -> QuotationInput {
        let (subtotal, grand_total) = totals(&items);
        QuotationInput {
            contact_id: self.contact_id,
            issue_date: days_ago(2),
            valid_until: days_from_now(28),
            subtotal,
            grand_total,
            items,
            ..Default::default()
        }
    }

    pub fn sales_order(&self, quotation_id: Option<i64>) -> SalesOrderInput {
        let items = vec![LineItemInput::new("Oak cabinet", dec!(2), dec!(500))];
        let (subtotal, grand_total) = totals(&items);
        SalesOrderInput {
            contact_id: self.contact_id,
            quotation_id,
            order_date: days_ago(1),
            subtotal,
            grand_total,
            items,
            ..Default::default()
        }
    }

    pub fn purchase_order(&self, sales_order_id: Option<i64>) -> PurchaseOrderInput {
        let items = vec![LineItemInput::new("Oak boards", dec!(40), dec!(12.5))];
        let (subtotal, grand_total) = totals(&items);
        PurchaseOrderInput {
            contact_id: self.contact_id,
            sales_order_id,
            order_date: days_ago(1),
            expected_delivery: days_from_now(14),
            subtotal,
            grand_total,
            items,
            ..Default::default()
        }
    }

    pub fn delivery(
        &self,
        purchase_order_id: Option<i64>,
        sales_order_id: Option<i64>,
    ) -> DeliveryInput {
        DeliveryInput {
            contact_id: self.contact_id,
            purchase_order_id,
            sales_order_id,
            delivery_date: Utc::now(),
            shipping_address: Some("4 Quay Street".into()),
            items: vec![DeliveryItemInput::new("Oak cabinet", dec!(2))],
            ..Default::default()
        }
    }

    /// Invoice for 1100.00 (1000 net plus 100 tax) with nothing paid.
    pub fn invoice(&self, sales_order_id: Option<i64>) -> InvoiceInput {
        InvoiceInput {
            contact_id: self.contact_id,
            sales_order_id,
            issue_date: days_ago(1),
            due_date: days_from_now(30),
            subtotal: dec!(1000),
            tax_amount: dec!(100),
            grand_total: dec!(1100),
            amount_paid: Decimal::ZERO,
            items: vec![LineItemInput::new("Oak cabinet", dec!(2), dec!(500))],
            ..Default::default()
        }
    }

    pub fn process(&self, title: &str) -> ProcessInput {
        ProcessInput {
            title: title.into(),
            contact_id: self.contact_id,
            ..Default::default()
        }
    }
}

pub fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("sales.db").display())
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

fn totals(items: &[LineItemInput]) -> (Decimal, Decimal) {
    let subtotal: Decimal = items.iter().map(LineItemInput::total).sum();
    (subtotal, subtotal)
}
