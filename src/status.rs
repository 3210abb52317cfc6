//! Per-document status machines.
//!
//! Each document type persists its status as a lowercase string. Explicit
//! status writes go through [`ensure_transition`]; statuses the system derives
//! for invoices (partial, paid, overdue) are written directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::DocumentKind;
use crate::errors::ServiceError;

/// Shared behaviour of every document status enum.
pub trait DocumentStatus: Copy + PartialEq + std::fmt::Display {
    const KIND: DocumentKind;

    /// Status assigned when a document is created without one.
    fn initial() -> Self;

    /// Whether an explicit write may move a document from `self` to `next`.
    fn can_transition_to(&self, next: Self) -> bool;

    fn is_terminal(&self) -> bool;
}

/// Rejects illegal explicit transitions. Same-state writes always pass.
pub fn ensure_transition<S: DocumentStatus>(from: S, to: S) -> Result<(), ServiceError> {
    if from == to || from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            kind: S::KIND,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotationStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for QuotationStatus {
    const KIND: DocumentKind = DocumentKind::Quotation;

    fn initial() -> Self {
        Self::Draft
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use QuotationStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Draft, Cancelled) | (Sent, Accepted) | (Sent, Rejected) | (Sent, Cancelled)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Cancelled)
    }
}

impl QuotationStatus {
    /// Statuses a quotation can still expire in.
    pub fn open_statuses() -> [Self; 2] {
        [Self::Draft, Self::Sent]
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SalesOrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for SalesOrderStatus {
    const KIND: DocumentKind = DocumentKind::SalesOrder;

    fn initial() -> Self {
        Self::Draft
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use SalesOrderStatus::*;
        match self {
            Draft => matches!(next, Confirmed | Cancelled),
            Confirmed => matches!(next, InProgress | Delivered | Cancelled),
            InProgress => matches!(next, Delivered | Cancelled),
            Delivered => matches!(next, Completed),
            Completed | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for PurchaseOrderStatus {
    const KIND: DocumentKind = DocumentKind::PurchaseOrder;

    fn initial() -> Self {
        Self::Draft
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use PurchaseOrderStatus::*;
        match self {
            Draft => matches!(next, Sent | Cancelled),
            Sent => matches!(next, Confirmed | Cancelled),
            Confirmed => matches!(next, Received | Cancelled),
            Received | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Received | Self::Cancelled)
    }
}

impl PurchaseOrderStatus {
    /// Statuses past which a late purchase order is no longer overdue.
    pub fn closed_statuses() -> [Self; 2] {
        [Self::Received, Self::Cancelled]
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for DeliveryStatus {
    const KIND: DocumentKind = DocumentKind::Delivery;

    fn initial() -> Self {
        Self::Pending
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use DeliveryStatus::*;
        match self {
            Pending => matches!(next, Shipped | Cancelled),
            Shipped => matches!(next, InTransit | Delivered | Cancelled),
            InTransit => matches!(next, Delivered | Cancelled),
            Delivered | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for InvoiceStatus {
    const KIND: DocumentKind = DocumentKind::Invoice;

    fn initial() -> Self {
        Self::Draft
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use InvoiceStatus::*;
        match self {
            Draft => matches!(next, Sent | Partial | Paid | Cancelled),
            Sent => matches!(next, Partial | Paid | Overdue | Cancelled),
            Partial => matches!(next, Paid | Overdue | Cancelled),
            Overdue => matches!(next, Partial | Paid | Cancelled),
            Paid | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

impl InvoiceStatus {
    /// Statuses that never become overdue.
    pub fn settled_statuses() -> [Self; 2] {
        [Self::Paid, Self::Cancelled]
    }

    /// Status implied by the payment position. Cancelled invoices and
    /// invoices with nothing paid keep `current`.
    pub fn derive(current: Self, amount_paid: Decimal, grand_total: Decimal) -> Self {
        if current == Self::Cancelled || amount_paid <= Decimal::ZERO {
            return current;
        }
        if amount_paid >= grand_total {
            Self::Paid
        } else {
            Self::Partial
        }
    }

    pub fn is_overdue(&self, due_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        due_date < now && !Self::settled_statuses().contains(self)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DocumentStatus for ProcessStatus {
    const KIND: DocumentKind = DocumentKind::SalesProcess;

    fn initial() -> Self {
        Self::Open
    }

    fn can_transition_to(&self, next: Self) -> bool {
        use ProcessStatus::*;
        match self {
            Open => matches!(next, InProgress | Completed | Cancelled),
            InProgress => matches!(next, Completed | Cancelled),
            Completed | Cancelled => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(InvoiceStatus::Draft, dec!(0), InvoiceStatus::Draft)]
    #[case(InvoiceStatus::Sent, dec!(0), InvoiceStatus::Sent)]
    #[case(InvoiceStatus::Draft, dec!(550), InvoiceStatus::Partial)]
    #[case(InvoiceStatus::Sent, dec!(1100), InvoiceStatus::Paid)]
    #[case(InvoiceStatus::Overdue, dec!(1200), InvoiceStatus::Paid)]
    #[case(InvoiceStatus::Cancelled, dec!(1100), InvoiceStatus::Cancelled)]
    fn derive_follows_payment_position(
        #[case] current: InvoiceStatus,
        #[case] paid: Decimal,
        #[case] expected: InvoiceStatus,
    ) {
        assert_eq!(InvoiceStatus::derive(current, paid, dec!(1100.00)), expected);
    }

    #[test]
    fn overdue_requires_past_due_and_unsettled() {
        let now = Utc::now();
        let past = now - Duration::days(3);
        let future = now + Duration::days(3);
        assert!(InvoiceStatus::Sent.is_overdue(past, now));
        assert!(InvoiceStatus::Partial.is_overdue(past, now));
        assert!(!InvoiceStatus::Paid.is_overdue(past, now));
        assert!(!InvoiceStatus::Cancelled.is_overdue(past, now));
        assert!(!InvoiceStatus::Sent.is_overdue(future, now));
    }

    #[test]
    fn same_state_is_always_legal() {
        assert!(ensure_transition(InvoiceStatus::Paid, InvoiceStatus::Paid).is_ok());
        assert!(ensure_transition(QuotationStatus::Rejected, QuotationStatus::Rejected).is_ok());
    }

    #[test]
    fn terminal_states_reject_moves() {
        assert_matches!(
            ensure_transition(QuotationStatus::Accepted, QuotationStatus::Draft),
            Err(ServiceError::InvalidTransition { kind: DocumentKind::Quotation, .. })
        );
        assert!(ensure_transition(PurchaseOrderStatus::Received, PurchaseOrderStatus::Sent).is_err());
        assert!(ensure_transition(DeliveryStatus::Cancelled, DeliveryStatus::Pending).is_err());
        assert!(ensure_transition(ProcessStatus::Completed, ProcessStatus::Open).is_err());
        for status in [
            QuotationStatus::Accepted,
            QuotationStatus::Rejected,
            QuotationStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
        }
    }

    #[rstest]
    #[case(QuotationStatus::Draft, QuotationStatus::Sent, true)]
    #[case(QuotationStatus::Sent, QuotationStatus::Accepted, true)]
    #[case(QuotationStatus::Draft, QuotationStatus::Accepted, false)]
    #[case(QuotationStatus::Sent, QuotationStatus::Draft, false)]
    fn quotation_transitions(
        #[case] from: QuotationStatus,
        #[case] to: QuotationStatus,
        #[case] legal: bool,
    ) {
        assert_eq!(ensure_transition(from, to).is_ok(), legal);
    }

    #[test]
    fn purchase_order_walks_forward_only() {
        use PurchaseOrderStatus::*;
        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Received));
        assert!(!Confirmed.can_transition_to(Draft));
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(SalesOrderStatus::InProgress.to_string(), "in_progress");
        assert_eq!(DeliveryStatus::InTransit.to_string(), "in_transit");
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::Overdue).unwrap(),
            "\"overdue\""
        );
    }

    #[test]
    fn initial_statuses() {
        assert_eq!(QuotationStatus::initial(), QuotationStatus::Draft);
        assert_eq!(DeliveryStatus::initial(), DeliveryStatus::Pending);
        assert_eq!(ProcessStatus::initial(), ProcessStatus::Open);
    }
}
