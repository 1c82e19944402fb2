//! Ingestion orchestrator: normalize → parse → dedup-check → store.
//!
//! Composes the encoding normalizer, structural parser, duplicate detector,
//! path builder, and the injected store/blob collaborators into the
//! single-document and batch pipelines. Blob success is a precondition for
//! the metadata write, never the reverse: a record is never inserted
//! without its blob. The pipeline is sequential per invocation and holds
//! no resources across stages; independent batches for different tenants
//! may run concurrently.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use nfse_core::constants::XML_CONTENT_TYPE;
use nfse_core::models::{
    BatchItemOutcome, BatchReport, DuplicateVerdict, IngestOutcome, InvoiceRecord, ParsedInvoice,
    RawDocument,
};
use nfse_core::AppError;
use nfse_db::InvoiceStore;
use nfse_storage::{keys, Storage};

use crate::dedup::DuplicateDetector;
use crate::encoding;
use crate::error::{IngestError, IngestResult};
use crate::parser;

fn sanitize_filename(filename: &str) -> String {
    const MAX: usize = 255;
    let base = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "documento.xml".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim().is_empty() {
        "documento.xml".to_string()
    } else {
        s
    }
}

/// The ingestion pipeline, constructed with injected collaborators.
pub struct IngestionPipeline {
    store: Arc<dyn InvoiceStore>,
    storage: Arc<dyn Storage>,
    detector: DuplicateDetector,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn InvoiceStore>, storage: Arc<dyn Storage>) -> Self {
        let detector = DuplicateDetector::new(store.clone());
        Self {
            store,
            storage,
            detector,
        }
    }

    fn normalize_and_parse(raw: &RawDocument) -> IngestResult<ParsedInvoice> {
        let normalized = encoding::normalize(&raw.content);
        let xml = String::from_utf8_lossy(&normalized);
        parser::parse_invoice(&xml)
    }

    /// Ingest one document: parse, check duplicates, and for a unique
    /// candidate write the blob then the metadata row. Duplicates produce
    /// no side effects.
    #[tracing::instrument(skip(self, raw), fields(filename = %raw.filename))]
    pub async fn ingest_document(
        &self,
        tenant_id: Uuid,
        raw: &RawDocument,
    ) -> IngestResult<IngestOutcome> {
        let parsed = Self::normalize_and_parse(raw)?;

        let verdict = self.detector.check(tenant_id, &parsed).await?;
        if verdict.is_duplicate {
            tracing::debug!(
                numero = %parsed.numero,
                reason = %verdict.reason,
                "Skipping duplicate document"
            );
            return Ok(IngestOutcome::Duplicate(verdict));
        }

        let filename = sanitize_filename(&raw.filename);
        let storage_key = keys::storage_key_for(&parsed, &filename);

        self.storage
            .upload_with_key(&storage_key, parsed.xml.clone().into_bytes(), XML_CONTENT_TYPE)
            .await?;

        let record = InvoiceRecord::from_parsed(tenant_id, parsed, storage_key.clone());
        let id = record.id;

        match self.store.insert(&record).await {
            Ok(()) => Ok(IngestOutcome::Stored { id, storage_key }),
            // Another caller won the check-then-insert race; the constraint
            // is the real guarantee, so this is a duplicate, not a failure.
            Err(AppError::Duplicate(msg)) => {
                tracing::debug!(numero = %record.numero, "Insert lost to uniqueness constraint");
                Ok(IngestOutcome::Duplicate(DuplicateVerdict::constraint(msg)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ingest a batch: parse all documents (collecting per-index errors),
    /// run one batched duplicate check over the parsed subset, then write
    /// blobs and insert the new records in one batched operation.
    ///
    /// A duplicate-check infrastructure failure aborts the invocation. A
    /// failure in the blob or insert phase marks every document of that
    /// phase failed; earlier phases keep their outcomes.
    #[tracing::instrument(skip(self, raws), fields(batch_size = raws.len()))]
    pub async fn ingest_batch(
        &self,
        tenant_id: Uuid,
        raws: &[RawDocument],
    ) -> IngestResult<BatchReport> {
        let start = Instant::now();
        let mut outcomes: Vec<Option<BatchItemOutcome>> = vec![None; raws.len()];

        // Parse phase: collect per-index errors, keep going.
        let mut indices: Vec<usize> = Vec::with_capacity(raws.len());
        let mut candidates: Vec<ParsedInvoice> = Vec::with_capacity(raws.len());
        for (index, raw) in raws.iter().enumerate() {
            match Self::normalize_and_parse(raw) {
                Ok(parsed) => {
                    indices.push(index);
                    candidates.push(parsed);
                }
                Err(e) => {
                    tracing::warn!(index, filename = %raw.filename, error = %e, "Skipping unparseable document");
                    outcomes[index] = Some(BatchItemOutcome::Failed {
                        error: e.to_string(),
                    });
                }
            }
        }

        // Batched duplicate check; a store failure here is fatal for the
        // whole invocation, before any side effects.
        let verdicts = self.detector.check_batch(tenant_id, &candidates).await?;

        let mut new_docs: Vec<(usize, ParsedInvoice)> = Vec::new();
        for ((index, candidate), verdict) in
            indices.into_iter().zip(candidates).zip(verdicts)
        {
            if verdict.is_duplicate {
                outcomes[index] = Some(BatchItemOutcome::Duplicate {
                    strategy: verdict.strategy,
                    reason: verdict.reason,
                });
            } else {
                new_docs.push((index, candidate));
            }
        }

        // Blob phase: sequential writes in parse order. Blob success is a
        // precondition for the metadata insert, so one failure fails the
        // whole phase and the insert is not attempted.
        let mut records: Vec<(usize, InvoiceRecord)> = Vec::with_capacity(new_docs.len());
        let mut blob_error: Option<IngestError> = None;
        for (index, parsed) in new_docs {
            let filename = sanitize_filename(&raws[index].filename);
            let storage_key = keys::storage_key_for(&parsed, &filename);

            match self
                .storage
                .upload_with_key(&storage_key, parsed.xml.clone().into_bytes(), XML_CONTENT_TYPE)
                .await
            {
                Ok(_) => {
                    records.push((
                        index,
                        InvoiceRecord::from_parsed(tenant_id, parsed, storage_key),
                    ));
                }
                Err(e) => {
                    tracing::error!(index, key = %storage_key, error = %e, "Blob write failed, aborting batch store phase");
                    blob_error = Some(e.into());
                    break;
                }
            }
        }

        if let Some(e) = blob_error {
            let message = format!("blob write phase failed: {}", e);
            for (index, _) in &records {
                outcomes[*index] = Some(BatchItemOutcome::Failed {
                    error: message.clone(),
                });
            }
            for outcome in outcomes.iter_mut() {
                if outcome.is_none() {
                    *outcome = Some(BatchItemOutcome::Failed {
                        error: message.clone(),
                    });
                }
            }
            return Ok(Self::finish(outcomes, start));
        }

        // Metadata phase: one batched insert. On failure the blobs already
        // written are orphaned; they are logged so a reconciliation sweep
        // can pick them up.
        if !records.is_empty() {
            let rows: Vec<InvoiceRecord> = records.iter().map(|(_, r)| r.clone()).collect();
            match self.store.insert_many(&rows).await {
                Ok(inserted) => {
                    tracing::info!(inserted, "Batch metadata insert complete");
                    for (index, record) in records {
                        outcomes[index] = Some(BatchItemOutcome::Stored {
                            id: record.id,
                            storage_key: record.storage_key,
                        });
                    }
                }
                Err(e) => {
                    let orphaned: Vec<&str> =
                        records.iter().map(|(_, r)| r.storage_key.as_str()).collect();
                    tracing::error!(
                        error = %e,
                        orphaned_blobs = ?orphaned,
                        "Batch metadata insert failed after blob writes"
                    );
                    let message = format!("metadata insert failed: {}", e);
                    for (index, _) in records {
                        outcomes[index] = Some(BatchItemOutcome::Failed {
                            error: message.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self::finish(outcomes, start))
    }

    fn finish(outcomes: Vec<Option<BatchItemOutcome>>, start: Instant) -> BatchReport {
        let resolved = outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or(BatchItemOutcome::Failed {
                    error: "document was not processed".to_string(),
                })
            })
            .collect();
        BatchReport::from_outcomes(resolved, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("nfse_250000062.xml"), "nfse_250000062.xml");
        assert_eq!(sanitize_filename("notas/nfse_1.xml"), "nfse_1.xml");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(""), "documento.xml");
        assert_eq!(sanitize_filename("nota fiscal.xml"), "nota_fiscal.xml");
    }
}
