//! Structural parser for NFS-e XML documents
//!
//! Unmarshals one normalized invoice document against the fixed ABRASF-style
//! schema and produces a typed `ParsedInvoice` with a derived content
//! fingerprint.
//!
//! The parser is deliberately lenient on leaf fields: a malformed numeric
//! value defaults to zero and a malformed date to the epoch, so a single
//! bad field never fails the whole document. Schema unmarshal failure and
//! empty input abort only the affected document.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use nfse_core::constants::{ISSUE_DATE_FORMAT, RPS_DATE_FORMAT};
use nfse_core::models::ParsedInvoice;

use crate::error::{IngestError, IngestResult};

// Raw schema shapes. Every leaf is optional; the conversion below decides
// defaults and precedence.

#[derive(Debug, Deserialize)]
struct NfseXml {
    #[serde(rename = "Numero")]
    numero: Option<String>,
    #[serde(rename = "CodigoVerificacao")]
    codigo_verificacao: Option<String>,
    #[serde(rename = "DataEmissao")]
    data_emissao: Option<String>,
    #[serde(rename = "Competencia")]
    competencia: Option<String>,
    #[serde(rename = "IdentificacaoRps")]
    identificacao_rps: Option<IdentificacaoRpsXml>,
    #[serde(rename = "PrestadorServico")]
    prestador: Option<PrestadorXml>,
    #[serde(rename = "TomadorServico")]
    tomador: Option<TomadorXml>,
    #[serde(rename = "Servico")]
    servico: Option<ServicoXml>,
    #[serde(rename = "NfseCancelamento")]
    cancelamento: Option<CancelamentoXml>,
    #[serde(rename = "SubstituicaoNfse")]
    substituicao: Option<SubstituicaoXml>,
}

#[derive(Debug, Deserialize)]
struct IdentificacaoRpsXml {
    #[serde(rename = "Numero")]
    #[allow(dead_code)]
    numero: Option<String>,
    #[serde(rename = "DataEmissaoRps")]
    data_emissao_rps: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrestadorXml {
    #[serde(rename = "IdentificacaoPrestador")]
    identificacao: Option<IdentificacaoPrestadorXml>,
}

#[derive(Debug, Deserialize)]
struct IdentificacaoPrestadorXml {
    #[serde(rename = "Cnpj")]
    cnpj: Option<String>,
    #[serde(rename = "InscricaoMunicipal")]
    inscricao_municipal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomadorXml {
    #[serde(rename = "IdentificacaoTomador")]
    identificacao: Option<IdentificacaoTomadorXml>,
}

#[derive(Debug, Deserialize)]
struct IdentificacaoTomadorXml {
    #[serde(rename = "CpfCnpj")]
    cpf_cnpj: Option<CpfCnpjXml>,
}

#[derive(Debug, Deserialize)]
struct CpfCnpjXml {
    #[serde(rename = "Cnpj")]
    cnpj: Option<String>,
    #[serde(rename = "Cpf")]
    cpf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServicoXml {
    #[serde(rename = "Valores")]
    valores: Option<ValoresXml>,
    #[serde(rename = "ItemListaServico")]
    item_lista_servico: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValoresXml {
    #[serde(rename = "ValorServicos")]
    valor_servicos: Option<String>,
    #[serde(rename = "BaseCalculo")]
    base_calculo: Option<String>,
    #[serde(rename = "Aliquota")]
    aliquota: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelamentoXml {
    #[serde(rename = "Confirmacao")]
    confirmacao: Option<ConfirmacaoXml>,
}

#[derive(Debug, Deserialize)]
struct ConfirmacaoXml {
    #[serde(rename = "Sucesso")]
    sucesso: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubstituicaoXml {
    #[serde(rename = "NfseSubstituidora")]
    nfse_substituidora: Option<String>,
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Lenient decimal parse: malformed values default to zero.
fn parse_decimal(value: &str) -> Decimal {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    // Some endpoints use a comma decimal separator.
    let canonical = trimmed.replace(',', ".");
    canonical.parse().unwrap_or_else(|_| {
        tracing::warn!(value = %trimmed, "Malformed decimal field, defaulting to zero");
        Decimal::ZERO
    })
}

/// Lenient datetime parse against the fixed API layout; defaults to epoch.
fn parse_datetime(value: &str) -> NaiveDateTime {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, ISSUE_DATE_FORMAT).unwrap_or_else(|_| {
        if !trimmed.is_empty() {
            tracing::warn!(value = %trimmed, "Malformed issue date, defaulting to epoch");
        }
        NaiveDateTime::default()
    })
}

/// Lenient date parse; defaults to epoch day.
fn parse_date(value: &str) -> NaiveDate {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, RPS_DATE_FORMAT).unwrap_or_else(|_| {
        if !trimmed.is_empty() {
            tracing::warn!(value = %trimmed, "Malformed RPS date, defaulting to epoch");
        }
        NaiveDate::default()
    })
}

/// Content fingerprint over the stable identity fields.
///
/// The *raw* issue-date string goes into the hash, not the parsed value,
/// so date-parsing ambiguity cannot change the fingerprint.
pub fn fingerprint(
    codigo_verificacao: &str,
    numero: &str,
    prestador_cnpj: &str,
    data_emissao_raw: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(codigo_verificacao.as_bytes());
    hasher.update(b"|");
    hasher.update(numero.as_bytes());
    hasher.update(b"|");
    hasher.update(prestador_cnpj.as_bytes());
    hasher.update(b"|");
    hasher.update(data_emissao_raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse one normalized invoice document into a typed candidate.
pub fn parse_invoice(xml: &str) -> IngestResult<ParsedInvoice> {
    if xml.trim().is_empty() {
        return Err(IngestError::EmptyDocument);
    }

    let doc: NfseXml = quick_xml::de::from_str(xml).map_err(|e| IngestError::Parse(e.to_string()))?;

    let numero = text(doc.numero);
    let codigo_verificacao = text(doc.codigo_verificacao);
    let data_emissao_raw = text(doc.data_emissao);
    let competencia = text(doc.competencia);

    let (prestador_cnpj, inscricao_municipal) = match doc.prestador.and_then(|p| p.identificacao) {
        Some(id) => (text(id.cnpj), text(id.inscricao_municipal)),
        None => (String::new(), String::new()),
    };

    // Company id takes priority over individual id.
    let tomador_doc = doc
        .tomador
        .and_then(|t| t.identificacao)
        .and_then(|id| id.cpf_cnpj)
        .map(|cc| {
            let cnpj = text(cc.cnpj);
            if !cnpj.is_empty() {
                cnpj
            } else {
                text(cc.cpf)
            }
        })
        .unwrap_or_default();

    let (valor_servicos, base_calculo, aliquota, item_lista_servico) = match doc.servico {
        Some(servico) => {
            let item = text(servico.item_lista_servico);
            match servico.valores {
                Some(v) => (
                    parse_decimal(&text(v.valor_servicos)),
                    parse_decimal(&text(v.base_calculo)),
                    parse_decimal(&text(v.aliquota)),
                    item,
                ),
                None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, item),
            }
        }
        None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, String::new()),
    };

    let cancelada = doc
        .cancelamento
        .and_then(|c| c.confirmacao)
        .map(|c| {
            let sucesso = text(c.sucesso);
            sucesso.eq_ignore_ascii_case("true") || sucesso == "1"
        })
        .unwrap_or(false);

    let substituida = doc
        .substituicao
        .map(|s| !text(s.nfse_substituidora).is_empty())
        .unwrap_or(false);

    let data_emissao_rps = doc
        .identificacao_rps
        .and_then(|r| r.data_emissao_rps)
        .map(|d| parse_date(&d))
        .unwrap_or_default();

    let fingerprint = fingerprint(
        &codigo_verificacao,
        &numero,
        &prestador_cnpj,
        &data_emissao_raw,
    );

    Ok(ParsedInvoice {
        numero,
        codigo_verificacao,
        prestador_cnpj,
        inscricao_municipal,
        tomador_doc,
        item_lista_servico,
        valor_servicos,
        base_calculo,
        aliquota,
        data_emissao: parse_datetime(&data_emissao_raw),
        data_emissao_raw,
        competencia,
        data_emissao_rps,
        cancelada,
        substituida,
        fingerprint,
        xml: xml.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Nfse>
  <Numero>250000062</Numero>
  <CodigoVerificacao>ABCD-1234</CodigoVerificacao>
  <DataEmissao>2025-08-12 14:30:00</DataEmissao>
  <Competencia>08/2025</Competencia>
  <IdentificacaoRps>
    <Numero>987</Numero>
    <DataEmissaoRps>2025-08-10</DataEmissaoRps>
  </IdentificacaoRps>
  <PrestadorServico>
    <IdentificacaoPrestador>
      <Cnpj>34194865000158</Cnpj>
      <InscricaoMunicipal>12345</InscricaoMunicipal>
    </IdentificacaoPrestador>
  </PrestadorServico>
  <TomadorServico>
    <IdentificacaoTomador>
      <CpfCnpj>
        <Cnpj>11222333000181</Cnpj>
        <Cpf>39053344705</Cpf>
      </CpfCnpj>
    </IdentificacaoTomador>
  </TomadorServico>
  <Servico>
    <Valores>
      <ValorServicos>1500.00</ValorServicos>
      <BaseCalculo>1500.00</BaseCalculo>
      <Aliquota>0.02</Aliquota>
    </Valores>
    <ItemListaServico>01.07</ItemListaServico>
  </Servico>
</Nfse>"#;

    #[test]
    fn test_parse_full_document() {
        let parsed = parse_invoice(SAMPLE).unwrap();

        assert_eq!(parsed.numero, "250000062");
        assert_eq!(parsed.codigo_verificacao, "ABCD-1234");
        assert_eq!(parsed.prestador_cnpj, "34194865000158");
        assert_eq!(parsed.inscricao_municipal, "12345");
        assert_eq!(parsed.item_lista_servico, "01.07");
        assert_eq!(parsed.valor_servicos, "1500.00".parse().unwrap());
        assert_eq!(parsed.aliquota, "0.02".parse().unwrap());
        assert_eq!(parsed.competencia, "08/2025");
        assert_eq!(parsed.data_emissao.date().year(), 2025);
        assert_eq!(
            parsed.data_emissao_rps,
            NaiveDate::from_ymd_opt(2025, 8, 10).unwrap()
        );
        assert!(!parsed.cancelada);
        assert!(!parsed.substituida);
        assert_eq!(parsed.xml, SAMPLE);
    }

    #[test]
    fn test_taker_company_id_takes_priority() {
        let parsed = parse_invoice(SAMPLE).unwrap();
        assert_eq!(parsed.tomador_doc, "11222333000181");
    }

    #[test]
    fn test_taker_falls_back_to_individual_id() {
        let xml = SAMPLE.replace("<Cnpj>11222333000181</Cnpj>", "<Cnpj></Cnpj>");
        let parsed = parse_invoice(&xml).unwrap();
        assert_eq!(parsed.tomador_doc, "39053344705");
    }

    #[test]
    fn test_malformed_decimal_defaults_to_zero() {
        let xml = SAMPLE.replace(
            "<ValorServicos>1500.00</ValorServicos>",
            "<ValorServicos>R$ mil e quinhentos</ValorServicos>",
        );
        let parsed = parse_invoice(&xml).unwrap();
        assert_eq!(parsed.valor_servicos, Decimal::ZERO);
        // Other values are unaffected
        assert_eq!(parsed.base_calculo, "1500.00".parse().unwrap());
    }

    #[test]
    fn test_comma_decimal_separator() {
        let xml = SAMPLE.replace(
            "<ValorServicos>1500.00</ValorServicos>",
            "<ValorServicos>1500,00</ValorServicos>",
        );
        let parsed = parse_invoice(&xml).unwrap();
        assert_eq!(parsed.valor_servicos, "1500.00".parse().unwrap());
    }

    #[test]
    fn test_malformed_date_defaults_to_epoch() {
        let xml = SAMPLE.replace(
            "<DataEmissao>2025-08-12 14:30:00</DataEmissao>",
            "<DataEmissao>12/08/2025</DataEmissao>",
        );
        let parsed = parse_invoice(&xml).unwrap();
        assert_eq!(parsed.data_emissao, NaiveDateTime::default());
        // The raw string still flows into the fingerprint
        assert_eq!(parsed.data_emissao_raw, "12/08/2025");
    }

    #[test]
    fn test_cancellation_flag_requires_explicit_success() {
        let cancelled = SAMPLE.replace(
            "</Nfse>",
            "<NfseCancelamento><Confirmacao><Sucesso>true</Sucesso></Confirmacao></NfseCancelamento></Nfse>",
        );
        assert!(parse_invoice(&cancelled).unwrap().cancelada);

        let not_confirmed = SAMPLE.replace(
            "</Nfse>",
            "<NfseCancelamento><Confirmacao><Sucesso>false</Sucesso></Confirmacao></NfseCancelamento></Nfse>",
        );
        assert!(!parse_invoice(&not_confirmed).unwrap().cancelada);
    }

    #[test]
    fn test_substitution_flag_requires_reference() {
        let substituted = SAMPLE.replace(
            "</Nfse>",
            "<SubstituicaoNfse><NfseSubstituidora>250000100</NfseSubstituidora></SubstituicaoNfse></Nfse>",
        );
        assert!(parse_invoice(&substituted).unwrap().substituida);

        let empty_reference = SAMPLE.replace(
            "</Nfse>",
            "<SubstituicaoNfse><NfseSubstituidora></NfseSubstituidora></SubstituicaoNfse></Nfse>",
        );
        assert!(!parse_invoice(&empty_reference).unwrap().substituida);
    }

    #[test]
    fn test_fingerprint_uses_raw_date() {
        // Two documents with the same raw fields hash identically even when
        // the date fails to parse.
        let a = fingerprint("ABCD-1234", "250000062", "34194865000158", "12/08/2025");
        let b = fingerprint("ABCD-1234", "250000062", "34194865000158", "12/08/2025");
        assert_eq!(a, b);

        let c = fingerprint("ABCD-1234", "250000062", "34194865000158", "2025-08-12");
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_is_stable_for_document() {
        let first = parse_invoice(SAMPLE).unwrap();
        let second = parse_invoice(SAMPLE).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.fingerprint.len(), 64);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(parse_invoice(""), Err(IngestError::EmptyDocument)));
        assert!(matches!(
            parse_invoice("   \n"),
            Err(IngestError::EmptyDocument)
        ));
    }

    #[test]
    fn test_unparseable_document_is_a_parse_error() {
        let result = parse_invoice("this is not xml at all <<<>");
        assert!(matches!(result, Err(IngestError::Parse(_))));
    }

    #[test]
    fn test_missing_sections_default() {
        let parsed = parse_invoice("<Nfse><Numero>1</Numero></Nfse>").unwrap();
        assert_eq!(parsed.numero, "1");
        assert_eq!(parsed.prestador_cnpj, "");
        assert_eq!(parsed.tomador_doc, "");
        assert_eq!(parsed.valor_servicos, Decimal::ZERO);
        assert!(!parsed.cancelada);
    }
}
