//! Shared key derivation for invoice blobs.
//!
//! Key format: `nfse/{year}/{competenceMMYYYY}/{digits-only-tax-id}/{filename}`.
//!
//! Derivation is pure and deterministic: identical invoices always produce
//! identical keys, which makes blob locations content-addressed at the
//! filename level. All backends must use this format for consistency.

use chrono::{Datelike, NaiveDate};
use nfse_core::constants::STORAGE_PREFIX;
use nfse_core::models::ParsedInvoice;

/// Strip every non-digit character from a tax id.
pub fn digits_only(tax_id: &str) -> String {
    tax_id.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a free-form competence string to `MMYYYY`.
///
/// The municipal API supplies the competence in several shapes: `MM/YYYY`,
/// `DD/MM/YYYY`, `MMYYYY`, sometimes with stray separators. A
/// `/`-separated day/month/year form re-derives month and year from its
/// second and third segments; otherwise separators are stripped and the
/// remaining digits are used as-is. Anything that is not exactly six
/// characters afterwards falls back to month and year of the issue date.
pub fn normalize_competence(raw: &str, emissao: NaiveDate) -> String {
    let trimmed = raw.trim();

    let slash_parts: Vec<&str> = trimmed.split('/').collect();
    if slash_parts.len() == 3 {
        let month = slash_parts[1].trim();
        let year = slash_parts[2].trim();
        let padded = if month.len() == 1 {
            format!("0{}", month)
        } else {
            month.to_string()
        };
        let candidate = format!("{}{}", padded, year);
        if candidate.len() == 6 && candidate.chars().all(|c| c.is_ascii_digit()) {
            return candidate;
        }
    }

    let stripped: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if stripped.len() == 6 {
        return stripped;
    }

    format!("{:02}{:04}", emissao.month(), emissao.year())
}

/// Derive the storage key for one invoice blob.
pub fn invoice_storage_key(
    emissao: NaiveDate,
    competencia: &str,
    tax_id: &str,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        STORAGE_PREFIX,
        emissao.year(),
        normalize_competence(competencia, emissao),
        digits_only(tax_id),
        filename
    )
}

/// Derive the storage key for a parsed invoice, keyed by the provider tax id.
pub fn storage_key_for(parsed: &ParsedInvoice, filename: &str) -> String {
    invoice_storage_key(
        parsed.emissao_day(),
        &parsed.competencia,
        &parsed.prestador_cnpj,
        filename,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("34.194.865/0001-58"), "34194865000158");
        assert_eq!(digits_only("34194865000158"), "34194865000158");
        assert_eq!(digits_only(""), "");
    }

    #[test]
    fn test_normalize_competence_month_year() {
        assert_eq!(normalize_competence("08/2025", day(2025, 8, 12)), "082025");
    }

    #[test]
    fn test_normalize_competence_day_month_year() {
        assert_eq!(
            normalize_competence("12/08/2025", day(2025, 8, 12)),
            "082025"
        );
        // Single-digit month is left-padded
        assert_eq!(normalize_competence("1/8/2025", day(2025, 8, 12)), "082025");
    }

    #[test]
    fn test_normalize_competence_already_normalized() {
        assert_eq!(normalize_competence("082025", day(2025, 8, 12)), "082025");
    }

    #[test]
    fn test_normalize_competence_falls_back_to_issue_date() {
        // Too short after stripping
        assert_eq!(normalize_competence("8/25", day(2025, 8, 12)), "082025");
        // Empty
        assert_eq!(normalize_competence("", day(2025, 3, 1)), "032025");
        // Garbage
        assert_eq!(normalize_competence("n/a", day(2024, 12, 31)), "122024");
    }

    #[test]
    fn test_storage_key_worked_example() {
        let key = invoice_storage_key(
            day(2025, 8, 12),
            "08/2025",
            "34.194.865/0001-58",
            "nfse_250000062.xml",
        );
        assert_eq!(key, "nfse/2025/082025/34194865000158/nfse_250000062.xml");
    }

    #[test]
    fn test_storage_key_is_deterministic() {
        let a = invoice_storage_key(day(2025, 8, 12), "08/2025", "34194865000158", "a.xml");
        let b = invoice_storage_key(day(2025, 8, 12), "08/2025", "34194865000158", "a.xml");
        assert_eq!(a, b);
    }
}
