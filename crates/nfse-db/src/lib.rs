//! Database repositories for the NFS-e ingestion core
//!
//! This crate contains the invoice repository (sqlx/Postgres) together with
//! the `InvoiceStore` trait the duplicate detector and the ingestion
//! orchestrator consume. The pipeline is constructed with an injected
//! `Arc<dyn InvoiceStore>`, so tests run against in-memory fakes without a
//! database.

pub mod db;

pub use db::invoices::{InvoiceRepository, InvoiceStore};
