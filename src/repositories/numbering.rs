//! Document numbers of the form `PREFIX-YEAR-NNNN`.
//!
//! Numbers come from the `document_sequences` table. The counter row is
//! bumped with a single `UPDATE ... SET last_value = last_value + 1` inside
//! the caller's transaction, so two concurrent creates can never draw the
//! same value; the row lock is held until that transaction ends. The first
//! number of a year inserts the row under a savepoint and falls back to the
//! update path if another writer inserted it first.

use chrono::{DateTime, Datelike, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, NotSet,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use tracing::debug;

use crate::common::DocumentKind;
use crate::entities::document_sequence::{self, Entity as DocumentSequence};
use crate::errors::{DbResultExt, ServiceError};

pub fn prefix(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Quotation => "QUO",
        DocumentKind::SalesOrder => "SO",
        DocumentKind::PurchaseOrder => "PO",
        DocumentKind::Delivery => "DEL",
        DocumentKind::Invoice => "INV",
        DocumentKind::Contact => "CON",
        DocumentKind::Payment => "PAY",
        DocumentKind::SalesProcess => "PRC",
    }
}

pub fn format_number(prefix: &str, year: i32, value: i64) -> String {
    format!("{}-{}-{:04}", prefix, year, value)
}

/// Draws the next number for `kind` in the year of `at`.
pub async fn next_number(
    txn: &DatabaseTransaction,
    kind: DocumentKind,
    at: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let prefix = prefix(kind);
    let year = at.year();

    let value = match bump(txn, prefix, year).await? {
        Some(value) => value,
        None => match start_year(txn, prefix, year).await? {
            Some(value) => value,
            // Lost the insert race; the row exists now.
            None => bump(txn, prefix, year).await?.ok_or_else(|| {
                ServiceError::Conflict(format!("sequence {}-{} vanished", prefix, year))
            })?,
        },
    };

    let number = format_number(prefix, year, value);
    debug!(%number, "Allocated document number");
    Ok(number)
}

async fn bump<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    year: i32,
) -> Result<Option<i64>, ServiceError> {
    let updated = DocumentSequence::update_many()
        .col_expr(
            document_sequence::Column::LastValue,
            Expr::col(document_sequence::Column::LastValue).add(1),
        )
        .filter(document_sequence::Column::Prefix.eq(prefix))
        .filter(document_sequence::Column::Year.eq(year))
        .exec(conn)
        .await
        .db_context("advancing document sequence")?;

    if updated.rows_affected == 0 {
        return Ok(None);
    }

    let row = DocumentSequence::find()
        .filter(document_sequence::Column::Prefix.eq(prefix))
        .filter(document_sequence::Column::Year.eq(year))
        .one(conn)
        .await
        .db_context("reading document sequence")?;
    Ok(row.map(|r| r.last_value))
}

/// Returns `None` when a concurrent writer created the row first.
async fn start_year(
    txn: &DatabaseTransaction,
    prefix: &str,
    year: i32,
) -> Result<Option<i64>, ServiceError> {
    let savepoint = txn.begin().await.map_err(|source| ServiceError::TransactionFailed {
        stage: "savepoint",
        source,
    })?;

    let inserted = document_sequence::ActiveModel {
        id: NotSet,
        prefix: Set(prefix.to_owned()),
        year: Set(year),
        last_value: Set(1),
    }
    .insert(&savepoint)
    .await;

    match inserted {
        Ok(row) => {
            savepoint
                .commit()
                .await
                .map_err(|source| ServiceError::TransactionFailed {
                    stage: "savepoint",
                    source,
                })?;
            Ok(Some(row.last_value))
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            savepoint
                .rollback()
                .await
                .db_context("releasing sequence savepoint")?;
            Ok(None)
        }
        Err(err) => Err(ServiceError::db_error("starting document sequence", err)),
    }
}
