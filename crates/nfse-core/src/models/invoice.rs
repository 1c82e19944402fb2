use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// One file pulled out of a fetched batch, before any parsing.
///
/// Ephemeral: produced by extraction, consumed by the parser, discarded
/// after ingestion.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub filename: String,
    pub content: Vec<u8>,
}

impl RawDocument {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }
}

/// Processing status of a persisted invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "processing_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processed,
    Failed,
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processed => write!(f, "processed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Normalized, typed view of one invoice document.
///
/// Created per raw document by the structural parser; consumed immediately
/// by duplicate checking and, if unique, by persistence. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedInvoice {
    /// Invoice number assigned by the municipality.
    pub numero: String,
    /// Government-issued verification code; the most authoritative unique id.
    pub codigo_verificacao: String,
    /// Provider (service issuer) tax id.
    pub prestador_cnpj: String,
    /// Provider municipal registration.
    pub inscricao_municipal: String,
    /// Taker tax id: company id when present, otherwise individual id.
    pub tomador_doc: String,
    /// Service code from the municipal service list.
    pub item_lista_servico: String,
    pub valor_servicos: Decimal,
    pub base_calculo: Decimal,
    pub aliquota: Decimal,
    pub data_emissao: NaiveDateTime,
    /// Issue date exactly as the source supplied it, before parsing.
    /// The content fingerprint is derived from this string so that
    /// date-parsing ambiguity cannot change the fingerprint.
    pub data_emissao_raw: String,
    /// Competence period as supplied by the source (free-form).
    pub competencia: String,
    pub data_emissao_rps: NaiveDate,
    pub cancelada: bool,
    pub substituida: bool,
    /// SHA-256 over `codigo_verificacao|numero|prestador_cnpj|data_emissao_raw`.
    pub fingerprint: String,
    /// Full normalized XML text.
    pub xml: String,
}

impl ParsedInvoice {
    /// Issue date truncated to the calendar day, as used by the composite
    /// duplicate key.
    pub fn emissao_day(&self) -> NaiveDate {
        self.data_emissao.date()
    }
}

/// The durable invoice record.
///
/// Created once per unique candidate and never overwritten in place: a
/// later cancellation or substitution notice for the same invoice arrives
/// as a separate document whose flags mark the new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub numero: String,
    pub codigo_verificacao: String,
    pub prestador_cnpj: String,
    pub inscricao_municipal: String,
    pub tomador_doc: String,
    pub item_lista_servico: String,
    pub valor_servicos: Decimal,
    pub base_calculo: Decimal,
    pub aliquota: Decimal,
    pub data_emissao: NaiveDateTime,
    pub competencia: String,
    pub data_emissao_rps: NaiveDate,
    pub cancelada: bool,
    pub substituida: bool,
    pub fingerprint: String,
    pub xml: String,
    pub storage_key: String,
    pub status: ProcessingStatus,
    pub processed_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Build the durable record for a unique candidate.
    pub fn from_parsed(tenant_id: Uuid, parsed: ParsedInvoice, storage_key: String) -> Self {
        InvoiceRecord {
            id: Uuid::new_v4(),
            tenant_id,
            numero: parsed.numero,
            codigo_verificacao: parsed.codigo_verificacao,
            prestador_cnpj: parsed.prestador_cnpj,
            inscricao_municipal: parsed.inscricao_municipal,
            tomador_doc: parsed.tomador_doc,
            item_lista_servico: parsed.item_lista_servico,
            valor_servicos: parsed.valor_servicos,
            base_calculo: parsed.base_calculo,
            aliquota: parsed.aliquota,
            data_emissao: parsed.data_emissao,
            competencia: parsed.competencia,
            data_emissao_rps: parsed.data_emissao_rps,
            cancelada: parsed.cancelada,
            substituida: parsed.substituida,
            fingerprint: parsed.fingerprint,
            xml: parsed.xml,
            storage_key,
            status: ProcessingStatus::Processed,
            processed_at: Utc::now(),
        }
    }

    /// Issue date truncated to the calendar day (composite duplicate key).
    pub fn emissao_day(&self) -> NaiveDate {
        self.data_emissao.date()
    }

    /// Whether this record participates in uniqueness checks. Cancelled and
    /// substituted records are tombstones; a re-issued invoice may legally
    /// reuse their identifiers.
    pub fn is_active(&self) -> bool {
        !self.cancelada && !self.substituida
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample_parsed() -> ParsedInvoice {
        ParsedInvoice {
            numero: "250000062".to_string(),
            codigo_verificacao: "ABCD-1234".to_string(),
            prestador_cnpj: "34194865000158".to_string(),
            inscricao_municipal: "12345".to_string(),
            tomador_doc: "11222333000181".to_string(),
            item_lista_servico: "01.07".to_string(),
            valor_servicos: dec("1500.00"),
            base_calculo: dec("1500.00"),
            aliquota: dec("0.02"),
            data_emissao: NaiveDate::from_ymd_opt(2025, 8, 12)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
            data_emissao_raw: "2025-08-12 14:30:00".to_string(),
            competencia: "08/2025".to_string(),
            data_emissao_rps: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
            cancelada: false,
            substituida: false,
            fingerprint: "deadbeef".to_string(),
            xml: "<Nfse/>".to_string(),
        }
    }

    #[test]
    fn test_record_from_parsed() {
        let tenant_id = Uuid::new_v4();
        let parsed = sample_parsed();
        let record = InvoiceRecord::from_parsed(
            tenant_id,
            parsed.clone(),
            "nfse/2025/082025/34194865000158/nfse_250000062.xml".to_string(),
        );

        assert_eq!(record.tenant_id, tenant_id);
        assert_eq!(record.numero, parsed.numero);
        assert_eq!(record.codigo_verificacao, parsed.codigo_verificacao);
        assert_eq!(record.status, ProcessingStatus::Processed);
        assert!(record.is_active());
    }

    #[test]
    fn test_emissao_day_truncates_time() {
        let parsed = sample_parsed();
        assert_eq!(
            parsed.emissao_day(),
            NaiveDate::from_ymd_opt(2025, 8, 12).unwrap()
        );
    }

    #[test]
    fn test_cancelled_record_is_not_active() {
        let mut parsed = sample_parsed();
        parsed.cancelada = true;
        let record = InvoiceRecord::from_parsed(Uuid::new_v4(), parsed, "k".to_string());
        assert!(!record.is_active());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProcessingStatus::Processed.to_string(), "processed");
        assert_eq!(ProcessingStatus::Failed.to_string(), "failed");
    }
}
