//! Legacy charset normalization
//!
//! Municipal endpoints still emit documents declared as ISO-8859-1 or
//! windows-1252. Before structural parsing, such documents are decoded
//! byte-for-byte to UTF-8 and their XML declaration rewritten to match.
//! Already-canonical content passes through untouched, so normalization is
//! idempotent. A document that fails to decode is returned unchanged
//! rather than aborting the pipeline; the parser reports it downstream.

use std::sync::OnceLock;

use encoding_rs::Encoding;
use regex::bytes::Regex;

use nfse_core::constants::CANONICAL_ENCODING;

/// The charset declaration sits inside the XML declaration, always within
/// the first bytes of the document.
const DECLARATION_WINDOW: usize = 256;

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).expect("valid regex")
    })
}

/// Read the declared charset label from the XML declaration, if any.
pub fn declared_charset(content: &[u8]) -> Option<String> {
    let window = &content[..content.len().min(DECLARATION_WINDOW)];
    declaration_re()
        .captures(window)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

fn is_legacy_single_byte(label: &str) -> bool {
    let lower = label.to_ascii_lowercase();
    lower.starts_with("iso-8859")
        || lower.starts_with("iso8859")
        || lower.starts_with("windows-125")
        || lower.starts_with("cp125")
        || lower == "latin1"
}

/// Normalize a raw document to UTF-8.
///
/// If the declared charset is a known legacy single-byte encoding, the
/// bytes are decoded to UTF-8 and the declaration rewritten to `UTF-8`.
/// Otherwise the input is returned unchanged.
pub fn normalize(content: &[u8]) -> Vec<u8> {
    let label = match declared_charset(content) {
        Some(label) => label,
        None => return content.to_vec(),
    };

    if label.eq_ignore_ascii_case(CANONICAL_ENCODING) || !is_legacy_single_byte(&label) {
        return content.to_vec();
    }

    let encoding = match Encoding::for_label(label.as_bytes()) {
        Some(enc) => enc,
        None => {
            tracing::warn!(charset = %label, "Unknown declared charset, leaving document as-is");
            return content.to_vec();
        }
    };

    let (decoded, _, had_errors) = encoding.decode(content);
    if had_errors {
        tracing::warn!(
            charset = %label,
            "Charset decode produced replacement characters, leaving document as-is"
        );
        return content.to_vec();
    }

    let rewritten = decoded.replacen(&label, CANONICAL_ENCODING, 1);

    tracing::debug!(
        from = %label,
        to = CANONICAL_ENCODING,
        size = content.len(),
        "Normalized document charset"
    );

    rewritten.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latin1_document() -> Vec<u8> {
        let mut bytes =
            br#"<?xml version="1.0" encoding="ISO-8859-1"?><Nfse><RazaoSocial>"#.to_vec();
        // "Construções" with 0xE7/0xF5 as single ISO-8859-1 bytes
        bytes.extend_from_slice(b"Constru\xE7\xF5es");
        bytes.extend_from_slice(b"</RazaoSocial></Nfse>");
        bytes
    }

    #[test]
    fn test_declared_charset() {
        assert_eq!(
            declared_charset(br#"<?xml version="1.0" encoding="ISO-8859-1"?><Nfse/>"#),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(declared_charset(b"<Nfse/>"), None);
    }

    #[test]
    fn test_legacy_charset_is_decoded_and_declaration_rewritten() {
        let normalized = normalize(&latin1_document());
        let text = String::from_utf8(normalized).unwrap();

        assert!(text.contains(r#"encoding="UTF-8""#));
        assert!(text.contains("Construções"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize(&latin1_document());
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_utf8_document_passes_through() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?><Nfse><RazaoSocial>Construções</RazaoSocial></Nfse>"#;
        assert_eq!(normalize(doc.as_bytes()), doc.as_bytes());
    }

    #[test]
    fn test_no_declaration_passes_through() {
        let doc = b"<Nfse><Numero>1</Numero></Nfse>";
        assert_eq!(normalize(doc), doc.to_vec());
    }

    #[test]
    fn test_unknown_charset_passes_through() {
        let doc = br#"<?xml version="1.0" encoding="EBCDIC-BR"?><Nfse/>"#;
        assert_eq!(normalize(doc), doc.to_vec());
    }
}
