//! Ingestion error types
//!
//! Recoverable document-level errors (`EmptyDocument`, `Parse`) skip the
//! offending document and surface in the batch report; infrastructure
//! errors (`Store`, `Storage`) abort the affected phase and propagate.

use nfse_core::AppError;
use nfse_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Empty document")]
    EmptyDocument,

    #[error("Schema unmarshal failed: {0}")]
    Parse(String),

    #[error("Container extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid batch envelope: {0}")]
    Envelope(String),

    #[error("Store error: {0}")]
    Store(#[from] AppError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type IngestResult<T> = Result<T, IngestError>;
