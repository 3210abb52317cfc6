//! Property-based tests for the status machines and document numbering.

use proptest::prelude::*;
use rust_decimal::Decimal;
use sales_process_core::common::{total_pages, DocumentKind};
use sales_process_core::repositories::numbering::{format_number, prefix};
use sales_process_core::status::{
    DeliveryStatus, DocumentStatus, InvoiceStatus, ProcessStatus, PurchaseOrderStatus,
    QuotationStatus, SalesOrderStatus,
};
use sea_orm::Iterable;

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn invoice_status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Draft),
        Just(InvoiceStatus::Sent),
        Just(InvoiceStatus::Partial),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::Overdue),
        Just(InvoiceStatus::Cancelled),
    ]
}

fn document_kind_strategy() -> impl Strategy<Value = DocumentKind> {
    prop_oneof![
        Just(DocumentKind::Quotation),
        Just(DocumentKind::SalesOrder),
        Just(DocumentKind::PurchaseOrder),
        Just(DocumentKind::Delivery),
        Just(DocumentKind::Invoice),
    ]
}

fn terminal_states_are_final<S: DocumentStatus + Iterable>() {
    for from in S::iter() {
        if from.is_terminal() {
            for to in S::iter() {
                assert!(
                    !from.can_transition_to(to),
                    "{} must not leave terminal {}",
                    S::KIND,
                    from
                );
            }
        }
    }
}

fn no_self_transitions<S: DocumentStatus + Iterable>() {
    for status in S::iter() {
        assert!(!status.can_transition_to(status), "{} loops on {}", S::KIND, status);
    }
}

#[test]
fn every_machine_has_final_terminal_states() {
    terminal_states_are_final::<QuotationStatus>();
    terminal_states_are_final::<SalesOrderStatus>();
    terminal_states_are_final::<PurchaseOrderStatus>();
    terminal_states_are_final::<DeliveryStatus>();
    terminal_states_are_final::<InvoiceStatus>();
    terminal_states_are_final::<ProcessStatus>();
}

#[test]
fn no_machine_transitions_to_itself() {
    no_self_transitions::<QuotationStatus>();
    no_self_transitions::<SalesOrderStatus>();
    no_self_transitions::<PurchaseOrderStatus>();
    no_self_transitions::<DeliveryStatus>();
    no_self_transitions::<InvoiceStatus>();
    no_self_transitions::<ProcessStatus>();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn derived_status_follows_payment_position(
        current in invoice_status_strategy(),
        paid in amount_strategy(),
        total in amount_strategy(),
    ) {
        let derived = InvoiceStatus::derive(current, paid, total);
        if current == InvoiceStatus::Cancelled || paid.is_zero() {
            prop_assert_eq!(derived, current);
        } else if paid >= total {
            prop_assert_eq!(derived, InvoiceStatus::Paid);
        } else {
            prop_assert_eq!(derived, InvoiceStatus::Partial);
        }
    }

    #[test]
    fn derivation_is_idempotent(
        current in invoice_status_strategy(),
        paid in amount_strategy(),
        total in amount_strategy(),
    ) {
        let once = InvoiceStatus::derive(current, paid, total);
        prop_assert_eq!(InvoiceStatus::derive(once, paid, total), once);
    }

    #[test]
    fn generated_numbers_keep_their_shape(
        kind in document_kind_strategy(),
        year in 2000i32..2100,
        value in 1i64..100_000,
    ) {
        let number = format_number(prefix(kind), year, value);
        let parts: Vec<&str> = number.split('-').collect();
        prop_assert_eq!(parts.len(), 3);
        prop_assert_eq!(parts[0], prefix(kind));
        prop_assert_eq!(parts[1].parse::<i32>().unwrap(), year);
        prop_assert!(parts[2].len() >= 4);
        prop_assert_eq!(parts[2].parse::<i64>().unwrap(), value);
    }

    #[test]
    fn pages_cover_every_item(total in 0u64..100_000, page_size in 1u64..=100) {
        let pages = total_pages(total, page_size);
        prop_assert!(pages * page_size >= total);
        if total > 0 {
            prop_assert!((pages - 1) * page_size < total);
        } else {
            prop_assert_eq!(pages, 0);
        }
    }
}
