/// Common types shared by every repository
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// The record types the repositories deal with, used to tag errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[strum(serialize = "contact")]
    Contact,
    #[strum(serialize = "quotation")]
    Quotation,
    #[strum(serialize = "sales order")]
    SalesOrder,
    #[strum(serialize = "purchase order")]
    PurchaseOrder,
    #[strum(serialize = "delivery")]
    Delivery,
    #[strum(serialize = "invoice")]
    Invoice,
    #[strum(serialize = "payment")]
    Payment,
    #[strum(serialize = "sales process")]
    SalesProcess,
}

/// Page-size bounds applied to every paginated query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// One-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: u64,
    pub page_size: u64,
}

impl PaginationParams {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }

    pub fn validate(&self, limits: &PaginationLimits) -> Result<(), ServiceError> {
        if self.page < 1 {
            return Err(ServiceError::InvalidPagination(format!(
                "page must be at least 1, got {}",
                self.page
            )));
        }
        if self.page_size < 1 || self.page_size > limits.max_page_size {
            return Err(ServiceError::InvalidPagination(format!(
                "page size must be between 1 and {}, got {}",
                limits.max_page_size, self.page_size
            )));
        }
        let offset = (self.page - 1).checked_mul(self.page_size);
        if !matches!(offset, Some(rows) if rows <= i64::MAX as u64) {
            return Err(ServiceError::InvalidPagination(format!(
                "page {} is beyond the addressable range",
                self.page
            )));
        }
        Ok(())
    }
}

pub fn total_pages(total_items: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

/// Paginated envelope returned by every list query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    #[serde(rename = "total")]
    pub total_items: u64,
    #[serde(rename = "page")]
    pub current_page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total_items: u64, params: PaginationParams) -> Self {
        Self {
            items,
            total_items,
            current_page: params.page,
            page_size: params.page_size,
            total_pages: total_pages(total_items, params.page_size),
        }
    }

    /// Swaps in items that were built asynchronously from this page's rows.
    pub fn with_items<U>(self, items: Vec<U>) -> Paginated<U> {
        Paginated {
            items,
            total_items: self.total_items,
            current_page: self.current_page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

/// Inclusive date window for period queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ServiceError> {
        if end < start {
            return Err(ServiceError::ValidationError(format!(
                "date range end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, 0)]
    #[case(25, 10, 3)]
    #[case(30, 10, 3)]
    #[case(1, 1, 1)]
    #[case(101, 100, 2)]
    fn total_pages_rounds_up(#[case] total: u64, #[case] size: u64, #[case] expected: u64) {
        assert_eq!(total_pages(total, size), expected);
    }

    proptest! {
        #[test]
        fn total_pages_is_ceiling(total in 0u64..1_000_000, size in 1u64..10_000) {
            let pages = total_pages(total, size);
            prop_assert!(pages * size >= total);
            if total > 0 {
                prop_assert!((pages - 1) * size < total);
            } else {
                prop_assert_eq!(pages, 0);
            }
        }
    }

    #[test]
    fn rejects_page_zero() {
        let limits = PaginationLimits::default();
        assert_matches!(
            PaginationParams::new(0, 10).validate(&limits),
            Err(ServiceError::InvalidPagination(_))
        );
    }

    #[test]
    fn rejects_page_size_out_of_bounds() {
        let limits = PaginationLimits {
            default_page_size: 10,
            max_page_size: 50,
        };
        assert!(PaginationParams::new(1, 0).validate(&limits).is_err());
        assert!(PaginationParams::new(1, 51).validate(&limits).is_err());
        assert!(PaginationParams::new(3, 50).validate(&limits).is_ok());
    }

    #[rstest]
    #[case(u64::MAX, 100)]
    #[case(u64::MAX / 2, 10)]
    #[case(i64::MAX as u64, 2)]
    fn rejects_pages_past_the_row_offset_range(#[case] page: u64, #[case] size: u64) {
        assert_matches!(
            PaginationParams::new(page, size).validate(&PaginationLimits::default()),
            Err(ServiceError::InvalidPagination(_))
        );
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let page = Paginated::new(vec![1, 2], 25, PaginationParams::new(1, 10));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["total"], 25);
        assert_eq!(json["page"], 1);
        assert_eq!(json["pageSize"], 10);
        assert_eq!(json["totalPages"], 3);
    }

    #[test]
    fn date_range_must_be_ordered() {
        let now = Utc::now();
        assert!(DateRange::new(now, now + Duration::days(1)).is_ok());
        assert!(DateRange::new(now, now - Duration::days(1)).is_err());
    }
}
