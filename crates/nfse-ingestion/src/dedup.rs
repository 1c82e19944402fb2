//! Multi-strategy duplicate detection
//!
//! Strategies run in a fixed trust hierarchy, first match wins:
//!
//! 1. **Verification code** within the tenant — the government-issued code
//!    is the most authoritative identifier; only non-empty stored values
//!    match.
//! 2. **Composite key** (number, provider tax id, issue date truncated to
//!    calendar day) — catches re-submissions where the code is absent or
//!    differs. Day granularity is a deliberate, coarse tie-break carried
//!    over from the source system.
//! 3. **Content fingerprint** — last-resort byte-identity check over the
//!    stable fields.
//!
//! Batch mode issues a single disjunctive query for the whole candidate
//! set and resolves each candidate against three in-memory lookup maps in
//! the same priority order: one round trip instead of one per candidate.
//! A candidate matching an earlier unique candidate of the same batch is
//! also flagged, so batch and one-at-a-time runs reach the same verdicts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use nfse_core::models::{DuplicateVerdict, InvoiceRecord, MatchStrategy, ParsedInvoice};
use nfse_core::AppError;
use nfse_db::InvoiceStore;

pub struct DuplicateDetector {
    store: Arc<dyn InvoiceStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// Check one candidate against the tenant's existing records.
    #[tracing::instrument(skip(self, candidate), fields(numero = %candidate.numero))]
    pub async fn check(
        &self,
        tenant_id: Uuid,
        candidate: &ParsedInvoice,
    ) -> Result<DuplicateVerdict, AppError> {
        if !candidate.codigo_verificacao.is_empty() {
            if let Some(existing) = self
                .store
                .find_active_by_codigo(tenant_id, &candidate.codigo_verificacao)
                .await?
            {
                return Ok(Self::code_verdict(existing));
            }
        }

        if let Some(existing) = self
            .store
            .find_active_by_composite(
                tenant_id,
                &candidate.numero,
                &candidate.prestador_cnpj,
                candidate.emissao_day(),
            )
            .await?
        {
            return Ok(Self::composite_verdict(existing));
        }

        if let Some(existing) = self
            .store
            .find_active_by_fingerprint(tenant_id, &candidate.fingerprint)
            .await?
        {
            return Ok(Self::fingerprint_verdict(existing));
        }

        Ok(DuplicateVerdict::unique())
    }

    /// Check a set of candidates with one store round trip.
    #[tracing::instrument(skip(self, candidates), fields(batch_size = candidates.len()))]
    pub async fn check_batch(
        &self,
        tenant_id: Uuid,
        candidates: &[ParsedInvoice],
    ) -> Result<Vec<DuplicateVerdict>, AppError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let codigos: Vec<String> = candidates
            .iter()
            .filter(|c| !c.codigo_verificacao.is_empty())
            .map(|c| c.codigo_verificacao.clone())
            .collect();
        let numeros: Vec<String> = candidates.iter().map(|c| c.numero.clone()).collect();
        let fingerprints: Vec<String> =
            candidates.iter().map(|c| c.fingerprint.clone()).collect();

        let existing = self
            .store
            .find_matching(tenant_id, &codigos, &numeros, &fingerprints)
            .await?;

        let mut by_code: HashMap<&str, &InvoiceRecord> = HashMap::new();
        let mut by_composite: HashMap<(&str, &str, NaiveDate), &InvoiceRecord> = HashMap::new();
        let mut by_fingerprint: HashMap<&str, &InvoiceRecord> = HashMap::new();

        for record in &existing {
            if !record.codigo_verificacao.is_empty() {
                by_code.entry(record.codigo_verificacao.as_str()).or_insert(record);
            }
            by_composite
                .entry((
                    record.numero.as_str(),
                    record.prestador_cnpj.as_str(),
                    record.emissao_day(),
                ))
                .or_insert(record);
            by_fingerprint
                .entry(record.fingerprint.as_str())
                .or_insert(record);
        }

        // Keys of candidates already accepted as unique within this batch;
        // a later candidate matching one of them must come out a duplicate,
        // exactly as it would through the single-document pipeline.
        let mut seen_codes: HashSet<&str> = HashSet::new();
        let mut seen_composites: HashSet<(&str, &str, NaiveDate)> = HashSet::new();
        let mut seen_fingerprints: HashSet<&str> = HashSet::new();

        let mut verdicts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let composite_key = (
                candidate.numero.as_str(),
                candidate.prestador_cnpj.as_str(),
                candidate.emissao_day(),
            );

            let code_hit = (!candidate.codigo_verificacao.is_empty())
                .then(|| by_code.get(candidate.codigo_verificacao.as_str()).copied())
                .flatten();

            let verdict = if let Some(existing) = code_hit {
                Self::code_verdict(existing.clone())
            } else if !candidate.codigo_verificacao.is_empty()
                && seen_codes.contains(candidate.codigo_verificacao.as_str())
            {
                DuplicateVerdict::within_batch(
                    MatchStrategy::VerificationCode,
                    format!(
                        "verification code {} matches an earlier document in this batch",
                        candidate.codigo_verificacao
                    ),
                )
            } else if let Some(&existing) = by_composite.get(&composite_key) {
                Self::composite_verdict(existing.clone())
            } else if seen_composites.contains(&composite_key) {
                DuplicateVerdict::within_batch(
                    MatchStrategy::CompositeKey,
                    format!(
                        "invoice {} from provider {} issued on {} matches an earlier document in this batch",
                        candidate.numero,
                        candidate.prestador_cnpj,
                        candidate.emissao_day()
                    ),
                )
            } else if let Some(&existing) = by_fingerprint.get(candidate.fingerprint.as_str()) {
                Self::fingerprint_verdict(existing.clone())
            } else if seen_fingerprints.contains(candidate.fingerprint.as_str()) {
                DuplicateVerdict::within_batch(
                    MatchStrategy::Fingerprint,
                    format!(
                        "content fingerprint {} matches an earlier document in this batch",
                        candidate.fingerprint
                    ),
                )
            } else {
                if !candidate.codigo_verificacao.is_empty() {
                    seen_codes.insert(candidate.codigo_verificacao.as_str());
                }
                seen_composites.insert(composite_key);
                seen_fingerprints.insert(candidate.fingerprint.as_str());
                DuplicateVerdict::unique()
            };
            verdicts.push(verdict);
        }

        Ok(verdicts)
    }

    fn code_verdict(existing: InvoiceRecord) -> DuplicateVerdict {
        let reason = format!(
            "verification code {} already ingested",
            existing.codigo_verificacao
        );
        DuplicateVerdict::duplicate(existing, MatchStrategy::VerificationCode, reason)
    }

    fn composite_verdict(existing: InvoiceRecord) -> DuplicateVerdict {
        let reason = format!(
            "invoice {} from provider {} issued on {} already ingested",
            existing.numero,
            existing.prestador_cnpj,
            existing.emissao_day()
        );
        DuplicateVerdict::duplicate(existing, MatchStrategy::CompositeKey, reason)
    }

    fn fingerprint_verdict(existing: InvoiceRecord) -> DuplicateVerdict {
        let reason = format!("content fingerprint {} already ingested", existing.fingerprint);
        DuplicateVerdict::duplicate(existing, MatchStrategy::Fingerprint, reason)
    }
}
