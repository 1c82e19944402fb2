//! Municipal API batch envelope
//!
//! One fetch call returns a JSON page: pagination counters plus a list of
//! entries, each carrying an invoice number, an issue date string, a
//! numeric competence (`YYYYMM`), and a Base64-encoded ZIP archive with
//! the raw XML invoice files. The fetch layer walks pages with
//! `has_next_page`/`next_page`; this core only consumes the payloads.

use serde::{Deserialize, Serialize};

use nfse_core::models::RawDocument;

use crate::error::{IngestError, IngestResult};
use crate::extractor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPage {
    #[serde(rename = "RecordCount")]
    pub record_count: u64,
    #[serde(rename = "RecordsPerPage")]
    pub records_per_page: u64,
    #[serde(rename = "PageCount")]
    pub page_count: u64,
    #[serde(rename = "CurrentPage")]
    pub current_page: u64,
    #[serde(rename = "Records", default)]
    pub records: Vec<FetchRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    #[serde(rename = "Numero")]
    pub numero: String,
    #[serde(rename = "DataEmissao")]
    pub data_emissao: String,
    /// Numeric competence in `YYYYMM` form.
    #[serde(rename = "Competencia")]
    pub competencia: u32,
    /// Base64-encoded ZIP archive of raw XML invoice files.
    #[serde(rename = "Arquivo")]
    pub arquivo: String,
}

impl FetchPage {
    /// Parse one page from the API's JSON body.
    pub fn from_json(body: &str) -> IngestResult<Self> {
        serde_json::from_str(body).map_err(|e| IngestError::Envelope(e.to_string()))
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.page_count
    }

    /// Page number to request next, if any.
    pub fn next_page(&self) -> Option<u64> {
        self.has_next_page().then(|| self.current_page + 1)
    }
}

impl FetchRecord {
    /// Unpack this record's container into raw documents.
    pub fn extract_documents(&self) -> IngestResult<Vec<RawDocument>> {
        extractor::extract_documents(&self.arquivo)
    }
}
