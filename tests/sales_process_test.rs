mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sales_process_core::db::{DatabaseProvider, DbConfig};
use sales_process_core::repositories::{LineItemInput, LinkOutcome};
use sales_process_core::status::ProcessStatus;
use sales_process_core::{DocumentKind, PaginationParams, ServiceError};

use common::TestStore;

#[tokio::test]
async fn linking_a_delivery_twice_keeps_one_row() {
    let store = TestStore::new().await;
    let process = store
        .repos
        .processes
        .create(store.process("Kitchen refit"))
        .await
        .expect("process");
    let delivery = store
        .repos
        .deliveries
        .create(store.delivery(None, None))
        .await
        .expect("delivery");

    let first = store
        .repos
        .linker
        .link_delivery(process.id, delivery.delivery.id)
        .await
        .expect("first link");
    let second = store
        .repos
        .linker
        .link_delivery(process.id, delivery.delivery.id)
        .await
        .expect("second link");

    assert_eq!(first, LinkOutcome::Created);
    assert_eq!(second, LinkOutcome::AlreadyLinked);
    assert_eq!(
        store.repos.linker.delivery_ids(process.id).await.unwrap(),
        vec![delivery.delivery.id]
    );
}

#[tokio::test]
async fn linking_checks_process_and_document() {
    let store = TestStore::new().await;
    let process = store
        .repos
        .processes
        .create(store.process("Office fit-out"))
        .await
        .expect("process");
    let invoice = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");

    let err = store
        .repos
        .linker
        .link_invoice(9999, invoice.invoice.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::NotFound {
            kind: DocumentKind::SalesProcess,
            ..
        }
    );

    let err = store
        .repos
        .linker
        .link_invoice(process.id, 9999)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::NotFound {
            kind: DocumentKind::Invoice,
            id: 9999
        }
    );
    assert!(store
        .repos
        .linker
        .invoice_ids(process.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn single_document_slot_is_repointed() {
    let store = TestStore::new().await;
    let process = store
        .repos
        .processes
        .create(store.process("Showroom"))
        .await
        .expect("process");
    let first = store
        .repos
        .sales_orders
        .create(store.sales_order(None))
        .await
        .expect("first order");
    let second = store
        .repos
        .sales_orders
        .create(store.sales_order(None))
        .await
        .expect("second order");
    let linker = &store.repos.linker;

    assert_eq!(
        linker
            .link_sales_order(process.id, first.sales_order.id)
            .await
            .unwrap(),
        LinkOutcome::Created
    );
    assert_eq!(
        linker
            .link_sales_order(process.id, first.sales_order.id)
            .await
            .unwrap(),
        LinkOutcome::AlreadyLinked
    );
    assert_eq!(
        linker
            .link_sales_order(process.id, second.sales_order.id)
            .await
            .unwrap(),
        LinkOutcome::Replaced {
            previous: first.sales_order.id
        }
    );
    assert!(linker
        .is_linked_sales_order(process.id, second.sales_order.id)
        .await
        .unwrap());
    assert!(!linker
        .is_linked_sales_order(process.id, first.sales_order.id)
        .await
        .unwrap());
}

#[tokio::test]
async fn aggregate_loads_the_whole_chain() {
    let store = TestStore::new().await;
    let repos = &store.repos;
    let process = repos
        .processes
        .create(store.process("Boardroom table"))
        .await
        .expect("process");

    let quotation = repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new(
            "Boardroom table",
            dec!(1),
            dec!(2400),
        )]))
        .await
        .expect("quotation");
    let order = repos
        .sales_orders
        .create(store.sales_order(Some(quotation.quotation.id)))
        .await
        .expect("sales order");
    let po = repos
        .purchase_orders
        .create(store.purchase_order(Some(order.sales_order.id)))
        .await
        .expect("purchase order");
    let first_delivery = repos
        .deliveries
        .create(store.delivery(Some(po.purchase_order.id), Some(order.sales_order.id)))
        .await
        .expect("first delivery");
    let second_delivery = repos
        .deliveries
        .create(store.delivery(Some(po.purchase_order.id), Some(order.sales_order.id)))
        .await
        .expect("second delivery");
    let invoice = repos
        .invoices
        .create(store.invoice(Some(order.sales_order.id)))
        .await
        .expect("invoice");

    let linker = &repos.linker;
    linker
        .link_quotation(process.id, quotation.quotation.id)
        .await
        .unwrap();
    linker
        .link_sales_order(process.id, order.sales_order.id)
        .await
        .unwrap();
    linker
        .link_purchase_order(process.id, po.purchase_order.id)
        .await
        .unwrap();
    linker
        .link_delivery(process.id, first_delivery.delivery.id)
        .await
        .unwrap();
    linker
        .link_delivery(process.id, second_delivery.delivery.id)
        .await
        .unwrap();
    linker
        .link_invoice(process.id, invoice.invoice.id)
        .await
        .unwrap();

    let aggregate = repos.processes.get_by_id(process.id).await.expect("aggregate");
    assert_eq!(aggregate.process.status, ProcessStatus::Open);
    assert_eq!(
        aggregate.contact.as_ref().map(|c| c.id),
        Some(store.contact_id)
    );
    assert_eq!(
        aggregate.quotation.as_ref().map(|q| q.quotation.id),
        Some(quotation.quotation.id)
    );
    assert_eq!(
        aggregate.sales_order.as_ref().map(|o| o.sales_order.id),
        Some(order.sales_order.id)
    );
    assert_eq!(
        aggregate
            .purchase_order
            .as_ref()
            .map(|p| p.purchase_order.id),
        Some(po.purchase_order.id)
    );
    let delivery_ids: Vec<i64> = aggregate.deliveries.iter().map(|d| d.delivery.id).collect();
    assert_eq!(
        delivery_ids,
        vec![first_delivery.delivery.id, second_delivery.delivery.id]
    );
    assert_eq!(aggregate.invoices.len(), 1);
    assert_eq!(aggregate.invoices[0].items.len(), 1);
}

#[tokio::test]
async fn aggregate_skips_a_deleted_delivery() {
    let store = TestStore::new().await;
    let process = store
        .repos
        .processes
        .create(store.process("Reception desk"))
        .await
        .expect("process");
    let kept = store
        .repos
        .deliveries
        .create(store.delivery(None, None))
        .await
        .expect("kept delivery");
    let removed = store
        .repos
        .deliveries
        .create(store.delivery(None, None))
        .await
        .expect("removed delivery");
    store
        .repos
        .linker
        .link_delivery(process.id, kept.delivery.id)
        .await
        .unwrap();
    store
        .repos
        .linker
        .link_delivery(process.id, removed.delivery.id)
        .await
        .unwrap();

    store
        .repos
        .deliveries
        .delete(removed.delivery.id)
        .await
        .expect("delete delivery");

    let aggregate = store
        .repos
        .processes
        .get_by_id(process.id)
        .await
        .expect("aggregate with dangling link");
    assert_eq!(aggregate.deliveries.len(), 1);
    assert_eq!(aggregate.deliveries[0].delivery.id, kept.delivery.id);
    assert_eq!(
        store.repos.linker.delivery_ids(process.id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn deleting_a_process_keeps_its_documents() {
    let store = TestStore::new().await;
    let process = store
        .repos
        .processes
        .create(store.process("Warehouse shelving"))
        .await
        .expect("process");
    let delivery = store
        .repos
        .deliveries
        .create(store.delivery(None, None))
        .await
        .expect("delivery");
    let invoice = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");
    store
        .repos
        .linker
        .link_delivery(process.id, delivery.delivery.id)
        .await
        .unwrap();
    store
        .repos
        .linker
        .link_invoice(process.id, invoice.invoice.id)
        .await
        .unwrap();

    store
        .repos
        .processes
        .delete(process.id)
        .await
        .expect("delete process");

    let err = store.repos.processes.get_by_id(process.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(store
        .repos
        .linker
        .delivery_ids(process.id)
        .await
        .unwrap()
        .is_empty());
    store
        .repos
        .deliveries
        .get_by_id(delivery.delivery.id)
        .await
        .expect("delivery survives");
    store
        .repos
        .invoices
        .get_by_id(invoice.invoice.id)
        .await
        .expect("invoice survives");

    let err = store.repos.processes.delete(process.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::NotFound {
            kind: DocumentKind::SalesProcess,
            ..
        }
    );
}

#[tokio::test]
async fn processes_list_by_status_and_contact() {
    let store = TestStore::new().await;
    let open = store
        .repos
        .processes
        .create(store.process("Open job"))
        .await
        .expect("open");
    let started = store
        .repos
        .processes
        .create(store.process("Started job"))
        .await
        .expect("started");
    store
        .repos
        .processes
        .update_status(started.id, ProcessStatus::InProgress)
        .await
        .expect("start");

    let in_progress = store
        .repos
        .processes
        .list_by_status(ProcessStatus::InProgress, PaginationParams::new(1, 10))
        .await
        .expect("by status");
    assert_eq!(in_progress.total_items, 1);
    assert_eq!(in_progress.items[0].process.id, started.id);

    let for_contact = store
        .repos
        .processes
        .list_by_contact(store.contact_id, PaginationParams::new(1, 10))
        .await
        .expect("by contact");
    assert_eq!(for_contact.total_items, 2);
    assert_eq!(for_contact.items[0].process.id, started.id);
    assert_eq!(for_contact.items[1].process.id, open.id);

    let err = store
        .repos
        .processes
        .update_status(started.id, ProcessStatus::Open)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn provider_connects_once_under_concurrent_callers() {
    let dir = tempfile::tempdir().expect("temp dir");
    let provider = Arc::new(
        DatabaseProvider::new(DbConfig::new(common::sqlite_url(&dir))).with_auto_migrate(true),
    );
    assert!(!provider.is_initialized());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let provider = provider.clone();
        tasks.push(tokio::spawn(async move { provider.connection().await }));
    }
    let mut pools = Vec::new();
    for task in tasks {
        pools.push(task.await.expect("join").expect("connection"));
    }

    assert!(provider.is_initialized());
    assert!(pools.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}
