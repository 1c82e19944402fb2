//! NFS-e Ingestion Library
//!
//! Turns batched, compressed, Base64-encoded XML bundles from a municipal
//! NFS-e API into uniquely-identified, persisted invoice records:
//!
//! - `extractor` — unpacks a Base64 ZIP container into raw documents
//! - `encoding` — normalizes legacy single-byte charsets to UTF-8
//! - `parser` — unmarshals invoice XML into a typed candidate with a
//!   content fingerprint
//! - `dedup` — multi-strategy duplicate detection (single and batched)
//! - `fetch` — the municipal API's JSON batch envelope
//! - `pipeline` — composes the above into single-document and batch
//!   ingestion, writing blobs and metadata for unique candidates
//!
//! This crate is a library invoked by the fetch/store orchestration layer;
//! it owns no CLI or wire protocol.

pub mod dedup;
pub mod encoding;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod parser;
pub mod pipeline;

pub use dedup::DuplicateDetector;
pub use error::{IngestError, IngestResult};
pub use fetch::{FetchPage, FetchRecord};
pub use pipeline::IngestionPipeline;
