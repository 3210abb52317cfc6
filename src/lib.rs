//! Sales process core
//!
//! Persistence for the quote-to-cash documents of an ERP sales module:
//! quotations, sales orders, purchase orders, deliveries and invoices, plus
//! the sales process aggregate that links them together.
//!
//! Each document type has a repository in [`repositories`] with paginated
//! queries, transactional writes and delete guards. [`status`] holds the
//! per-document state machines. The [`repositories::ProcessLinker`] records
//! which documents belong to a process and the
//! [`repositories::SalesProcessRepository`] loads a process together with
//! everything it links to.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cancellation;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod repositories;
pub mod status;

pub use cancellation::CancelSignal;
pub use common::{DateRange, DocumentKind, Paginated, PaginationLimits, PaginationParams};
pub use db::DatabaseProvider;
pub use errors::ServiceError;
pub use repositories::Repositories;
