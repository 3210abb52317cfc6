mod common;

use assert_matches::assert_matches;
use chrono::{Datelike, Utc};
use rust_decimal_macros::dec;
use sales_process_core::db::TxScope;
use sales_process_core::entities::contact::{self, Entity as Contact};
use sales_process_core::repositories::{LineItemInput, PaymentInput};
use sales_process_core::status::{InvoiceStatus, QuotationStatus, SalesOrderStatus};
use sales_process_core::{CancelSignal, DocumentKind, PaginationParams, ServiceError};

use common::{days_ago, TestStore};
use sea_orm::{ActiveModelTrait, EntityTrait, NotSet, PaginatorTrait, Set};

async fn insert_contact(scope: &TxScope<'_>, name: &str) {
    contact::ActiveModel {
        id: NotSet,
        name: Set(name.to_owned()),
        email: Set(None),
        company: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(scope.txn())
    .await
    .expect("insert inside scope");
}

#[tokio::test]
async fn generated_numbers_are_sequential_per_kind() {
    let store = TestStore::new().await;
    let year = Utc::now().year();

    let first = store
        .repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]))
        .await
        .expect("first quotation");
    let second = store
        .repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new("Chair", dec!(4), dec!(75))]))
        .await
        .expect("second quotation");
    let order = store
        .repos
        .sales_orders
        .create(store.sales_order(None))
        .await
        .expect("sales order");

    assert_eq!(first.quotation.quotation_number, format!("QUO-{}-0001", year));
    assert_eq!(second.quotation.quotation_number, format!("QUO-{}-0002", year));
    assert_eq!(order.sales_order.order_number, format!("SO-{}-0001", year));
    assert_eq!(first.quotation.status, QuotationStatus::Draft);
}

#[tokio::test]
async fn concurrent_creates_get_distinct_numbers() {
    let store = TestStore::new().await;
    store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("seed invoice");

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let invoices = store.repos.invoices.clone();
        let input = store.invoice(None);
        tasks.push(tokio::spawn(async move { invoices.create(input).await }));
    }

    let mut numbers = Vec::new();
    for task in tasks {
        let record = task.await.expect("join").expect("create invoice");
        numbers.push(record.invoice.invoice_number);
    }
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 4);
}

#[tokio::test]
async fn duplicate_explicit_number_conflicts() {
    let store = TestStore::new().await;
    let mut input = store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]);
    input.quotation_number = Some("Q-CUSTOM-1".into());

    store
        .repos
        .quotations
        .create(input.clone())
        .await
        .expect("first create");
    let err = store.repos.quotations.create(input).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn update_replaces_items_with_fresh_identities() {
    let store = TestStore::new().await;
    let created = store
        .repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]))
        .await
        .expect("create");
    let old_item_id = created.items[0].id;

    let replacement = store.quotation(vec![
        LineItemInput::new("Standing desk", dec!(1), dec!(450)),
        LineItemInput::new("Monitor arm", dec!(2), dec!(60)),
    ]);
    let updated = store
        .repos
        .quotations
        .update(created.quotation.id, replacement)
        .await
        .expect("update");

    assert_eq!(updated.items.len(), 2);
    assert!(updated.items.iter().all(|item| item.id != old_item_id));
    assert!(updated
        .items
        .iter()
        .all(|item| item.quotation_id == created.quotation.id));
    assert_eq!(updated.items[0].description, "Standing desk");
    assert_eq!(updated.items[1].line_total, dec!(120));
    assert_eq!(
        updated.quotation.quotation_number,
        created.quotation.quotation_number
    );

    let reloaded = store
        .repos
        .quotations
        .get_by_id(created.quotation.id)
        .await
        .expect("reload");
    assert_eq!(reloaded.items.len(), 2);
}

#[tokio::test]
async fn failed_item_insert_rolls_back_the_parent() {
    let store = TestStore::new().await;
    store
        .execute(
            "CREATE TRIGGER reject_item BEFORE INSERT ON quotation_items \
             WHEN NEW.description = 'explode' \
             BEGIN SELECT RAISE(ABORT, 'item rejected'); END;",
        )
        .await;

    let input = store.quotation(vec![
        LineItemInput::new("Desk", dec!(1), dec!(300)),
        LineItemInput::new("explode", dec!(1), dec!(1)),
    ]);
    let err = store.repos.quotations.create(input).await.unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError { .. });

    let page = store
        .repos
        .quotations
        .get_all(PaginationParams::new(1, 10))
        .await
        .expect("list");
    assert_eq!(page.total_items, 0);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn cancelled_signal_writes_nothing() {
    let store = TestStore::new().await;
    let signal = CancelSignal::none();
    signal.cancel();

    let input = store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]);
    let err = store
        .repos
        .quotations
        .create_with_signal(input, &signal)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Cancelled);

    let expired = CancelSignal::with_deadline(tokio::time::Instant::now());
    let err = store
        .repos
        .sales_orders
        .create_with_signal(store.sales_order(None), &expired)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Timeout);

    let quotations = store
        .repos
        .quotations
        .get_all(PaginationParams::new(1, 10))
        .await
        .expect("list quotations");
    let orders = store
        .repos
        .sales_orders
        .get_all(PaginationParams::new(1, 10))
        .await
        .expect("list orders");
    assert_eq!(quotations.total_items, 0);
    assert_eq!(orders.total_items, 0);
}

#[tokio::test]
async fn signal_fired_mid_transaction_rolls_back() {
    let store = TestStore::new().await;
    let signal = CancelSignal::none();

    let scope = TxScope::begin(&store.db, &signal, "test.cancel_before_commit")
        .await
        .expect("begin");
    insert_contact(&scope, "Late Cancel Ltd").await;
    signal.cancel();
    let err = scope.finish(Ok(())).await.unwrap_err();
    assert_matches!(err, ServiceError::Cancelled);
    assert_eq!(Contact::find().count(store.db.as_ref()).await.unwrap(), 1);

    let signal = CancelSignal::none();
    let scope = TxScope::begin(&store.db, &signal, "test.cancel_at_checkpoint")
        .await
        .expect("begin");
    let mut outcome = Ok(());
    for (pass, name) in ["First Row Ltd", "Second Row Ltd", "Third Row Ltd"]
        .into_iter()
        .enumerate()
    {
        if let Err(err) = scope.checkpoint() {
            outcome = Err(err);
            break;
        }
        insert_contact(&scope, name).await;
        if pass == 1 {
            signal.cancel();
        }
    }
    let err = scope.finish(outcome).await.unwrap_err();
    assert_matches!(err, ServiceError::Cancelled);
    assert_eq!(Contact::find().count(store.db.as_ref()).await.unwrap(), 1);

    let signal = CancelSignal::none();
    let scope = TxScope::begin(&store.db, &signal, "test.commit")
        .await
        .expect("begin");
    insert_contact(&scope, "Committed Ltd").await;
    scope.finish(Ok(())).await.expect("commit");
    assert_eq!(Contact::find().count(store.db.as_ref()).await.unwrap(), 2);
}

#[tokio::test]
async fn pagination_envelope_and_bounds() {
    let store = TestStore::new().await;
    for _ in 0..5 {
        store
            .repos
            .sales_orders
            .create(store.sales_order(None))
            .await
            .expect("create");
    }

    let page = store
        .repos
        .sales_orders
        .get_all(PaginationParams::new(2, 2))
        .await
        .expect("page two");
    assert_eq!(page.total_items, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.items.len(), 2);

    let err = store
        .repos
        .sales_orders
        .get_all(PaginationParams::new(0, 10))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPagination(_));

    let err = store
        .repos
        .sales_orders
        .get_all(PaginationParams::new(1, 1000))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPagination(_));

    let err = store
        .repos
        .invoices
        .get_all(PaginationParams::new(u64::MAX, 100))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPagination(_));

    let far = store
        .repos
        .sales_orders
        .get_all(PaginationParams::new(1_000_000, 100))
        .await
        .expect("far page is empty, not an error");
    assert!(far.items.is_empty());
    assert_eq!(far.total_items, 5);
}

#[tokio::test]
async fn quotation_with_sales_order_cannot_be_deleted() {
    let store = TestStore::new().await;
    let quotation = store
        .repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]))
        .await
        .expect("quotation");
    store
        .repos
        .sales_orders
        .create(store.sales_order(Some(quotation.quotation.id)))
        .await
        .expect("sales order");

    let err = store
        .repos
        .quotations
        .delete(quotation.quotation.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::RelatedRecordsExist {
            kind: DocumentKind::Quotation,
            dependent: DocumentKind::SalesOrder,
            count: 1,
            ..
        }
    );
    let still_there = store
        .repos
        .quotations
        .get_by_id(quotation.quotation.id)
        .await
        .expect("quotation kept");
    assert_eq!(still_there.items.len(), 1);
}

#[tokio::test]
async fn sales_order_guards_check_purchase_orders_first() {
    let store = TestStore::new().await;
    let order = store
        .repos
        .sales_orders
        .create(store.sales_order(None))
        .await
        .expect("sales order");
    let order_id = order.sales_order.id;
    let po = store
        .repos
        .purchase_orders
        .create(store.purchase_order(Some(order_id)))
        .await
        .expect("purchase order");
    store
        .repos
        .invoices
        .create(store.invoice(Some(order_id)))
        .await
        .expect("invoice");

    let err = store.repos.sales_orders.delete(order_id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::RelatedRecordsExist {
            dependent: DocumentKind::PurchaseOrder,
            ..
        }
    );

    store
        .repos
        .purchase_orders
        .delete(po.purchase_order.id)
        .await
        .expect("delete purchase order");
    let err = store.repos.sales_orders.delete(order_id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::RelatedRecordsExist {
            dependent: DocumentKind::Invoice,
            ..
        }
    );
}

#[tokio::test]
async fn purchase_order_with_delivery_cannot_be_deleted() {
    let store = TestStore::new().await;
    let po = store
        .repos
        .purchase_orders
        .create(store.purchase_order(None))
        .await
        .expect("purchase order");
    let delivery = store
        .repos
        .deliveries
        .create(store.delivery(Some(po.purchase_order.id), None))
        .await
        .expect("delivery");

    let err = store
        .repos
        .purchase_orders
        .delete(po.purchase_order.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::RelatedRecordsExist {
            dependent: DocumentKind::Delivery,
            ..
        }
    );

    store
        .repos
        .deliveries
        .delete(delivery.delivery.id)
        .await
        .expect("deliveries are never guarded");
    store
        .repos
        .purchase_orders
        .delete(po.purchase_order.id)
        .await
        .expect("purchase order now deletable");
}

#[tokio::test]
async fn deleting_a_missing_document_is_not_found() {
    let store = TestStore::new().await;
    let err = store.repos.deliveries.delete(4242).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::NotFound {
            kind: DocumentKind::Delivery,
            id: 4242
        }
    );
}

#[tokio::test]
async fn invalid_status_transition_is_rejected() {
    let store = TestStore::new().await;
    let order = store
        .repos
        .sales_orders
        .create(store.sales_order(None))
        .await
        .expect("sales order");
    let id = order.sales_order.id;

    let err = store
        .repos
        .sales_orders
        .update_status(id, SalesOrderStatus::Delivered)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition {
            kind: DocumentKind::SalesOrder,
            ..
        }
    );

    let confirmed = store
        .repos
        .sales_orders
        .update_status(id, SalesOrderStatus::Confirmed)
        .await
        .expect("draft to confirmed");
    assert_eq!(confirmed.status, SalesOrderStatus::Confirmed);
}

#[tokio::test]
async fn expired_quotations_are_reported() {
    let store = TestStore::new().await;
    let mut lapsed = store.quotation(vec![LineItemInput::new("Desk", dec!(1), dec!(300))]);
    lapsed.issue_date = days_ago(40);
    lapsed.valid_until = days_ago(10);
    let lapsed = store.repos.quotations.create(lapsed).await.expect("lapsed");
    store
        .repos
        .quotations
        .create(store.quotation(vec![LineItemInput::new("Chair", dec!(1), dec!(80))]))
        .await
        .expect("current");

    let expired = store
        .repos
        .quotations
        .get_expired(PaginationParams::new(1, 10))
        .await
        .expect("expired");
    assert_eq!(expired.total_items, 1);
    assert_eq!(expired.items[0].quotation.id, lapsed.quotation.id);
}

#[tokio::test]
async fn payment_position_drives_invoice_status() {
    let store = TestStore::new().await;
    let created = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");
    let id = created.invoice.id;
    assert_eq!(created.invoice.status, InvoiceStatus::Draft);

    let unpaid = store
        .repos
        .invoices
        .update(id, store.invoice(None))
        .await
        .expect("nothing paid");
    assert_eq!(unpaid.invoice.status, InvoiceStatus::Draft);

    let mut half = store.invoice(None);
    half.amount_paid = dec!(550);
    let partial = store.repos.invoices.update(id, half).await.expect("half paid");
    assert_eq!(partial.invoice.status, InvoiceStatus::Partial);

    let mut full = store.invoice(None);
    full.amount_paid = dec!(1100);
    full.status = Some(InvoiceStatus::Partial);
    let paid = store.repos.invoices.update(id, full).await.expect("fully paid");
    assert_eq!(paid.invoice.status, InvoiceStatus::Paid);

    let stored = store.repos.invoices.get_by_id(id).await.expect("reload");
    assert_eq!(stored.invoice.status, InvoiceStatus::Paid);
    assert_eq!(stored.invoice.amount_paid, dec!(1100));
}

#[tokio::test]
async fn explicit_invoice_status_wins_over_derivation() {
    let store = TestStore::new().await;
    let created = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");

    let mut input = store.invoice(None);
    input.amount_paid = dec!(550);
    input.status = Some(InvoiceStatus::Sent);
    let updated = store
        .repos
        .invoices
        .update(created.invoice.id, input)
        .await
        .expect("update");
    assert_eq!(updated.invoice.status, InvoiceStatus::Sent);
}

#[tokio::test]
async fn recording_payments_settles_the_invoice() {
    let store = TestStore::new().await;
    let created = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");
    let id = created.invoice.id;

    let payment = |amount| PaymentInput {
        amount,
        payment_date: Utc::now(),
        method: "bank_transfer".into(),
        reference: None,
    };
    let after_first = store
        .repos
        .invoices
        .record_payment(id, payment(dec!(600)))
        .await
        .expect("first payment");
    assert_eq!(after_first.invoice.status, InvoiceStatus::Partial);
    assert_eq!(after_first.payments.len(), 1);

    let after_second = store
        .repos
        .invoices
        .record_payment(id, payment(dec!(500)))
        .await
        .expect("second payment");
    assert_eq!(after_second.invoice.status, InvoiceStatus::Paid);
    assert_eq!(after_second.invoice.amount_paid, dec!(1100));
    assert_eq!(store.repos.invoices.get_payments(id).await.unwrap().len(), 2);

    let err = store
        .repos
        .invoices
        .record_payment(id, payment(dec!(0)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn invoice_with_payments_cannot_be_deleted() {
    let store = TestStore::new().await;
    let created = store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("invoice");
    let id = created.invoice.id;
    store
        .repos
        .invoices
        .record_payment(
            id,
            PaymentInput {
                amount: dec!(100),
                payment_date: Utc::now(),
                method: "card".into(),
                reference: Some("AUTH-77".into()),
            },
        )
        .await
        .expect("payment");
    let before = store.repos.invoices.get_by_id(id).await.expect("before");

    let err = store.repos.invoices.delete(id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::RelatedRecordsExist {
            kind: DocumentKind::Invoice,
            dependent: DocumentKind::Payment,
            count: 1,
            ..
        }
    );

    let after = store.repos.invoices.get_by_id(id).await.expect("after");
    assert_eq!(after.invoice, before.invoice);
    assert_eq!(after.items, before.items);
    assert_eq!(after.payments, before.payments);
}

#[tokio::test]
async fn overdue_listing_persists_the_status() {
    let store = TestStore::new().await;
    let mut input = store.invoice(None);
    input.issue_date = days_ago(40);
    input.due_date = days_ago(10);
    input.status = Some(InvoiceStatus::Sent);
    let late = store.repos.invoices.create(input).await.expect("late invoice");
    store
        .repos
        .invoices
        .create(store.invoice(None))
        .await
        .expect("current invoice");

    let overdue = store
        .repos
        .invoices
        .get_overdue(PaginationParams::new(1, 10))
        .await
        .expect("overdue");
    assert_eq!(overdue.total_items, 1);
    assert_eq!(overdue.items[0].invoice.id, late.invoice.id);
    assert_eq!(overdue.items[0].invoice.status, InvoiceStatus::Overdue);

    let stored = store
        .repos
        .invoices
        .get_by_id(late.invoice.id)
        .await
        .expect("reload");
    assert_eq!(stored.invoice.status, InvoiceStatus::Overdue);
}

#[tokio::test]
async fn overdue_listing_survives_a_failed_status_write() {
    let store = TestStore::new().await;
    let mut input = store.invoice(None);
    input.issue_date = days_ago(40);
    input.due_date = days_ago(10);
    input.status = Some(InvoiceStatus::Sent);
    let late = store.repos.invoices.create(input).await.expect("late invoice");

    store
        .execute(
            "CREATE TRIGGER block_overdue BEFORE UPDATE OF status ON invoices \
             WHEN NEW.status = 'overdue' \
             BEGIN SELECT RAISE(ABORT, 'status write refused'); END;",
        )
        .await;

    let overdue = store
        .repos
        .invoices
        .get_overdue(PaginationParams::new(1, 10))
        .await
        .expect("overdue listing still succeeds");
    assert_eq!(overdue.items.len(), 1);
    assert_eq!(overdue.items[0].invoice.status, InvoiceStatus::Overdue);

    let stored = store
        .repos
        .invoices
        .get_by_id(late.invoice.id)
        .await
        .expect("reload");
    assert_eq!(stored.invoice.status, InvoiceStatus::Sent);
}
