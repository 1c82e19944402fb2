//! Batch container extraction
//!
//! The municipal API delivers each batch entry as a Base64-encoded ZIP
//! archive holding one or more raw XML invoice files. An unreadable
//! individual entry is logged and skipped; an undecodable or unopenable
//! container is a hard failure for that batch item.

use std::io::{Cursor, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zip::ZipArchive;

use nfse_core::models::RawDocument;

use crate::error::{IngestError, IngestResult};

/// Upper bound on the buffer reserved up front per archive entry. The
/// declared entry size is attacker-controlled; anything larger grows
/// through `read_to_end` instead.
const MAX_ENTRY_PREALLOC: u64 = 4 * 1024 * 1024;

fn prealloc_size(declared: u64) -> usize {
    declared.min(MAX_ENTRY_PREALLOC) as usize
}

/// Strip path components from an archive entry name (a hostile container
/// must not steer blob keys outside the invoice prefix).
fn sanitize_entry_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Unpack a Base64-encoded ZIP container into raw documents.
pub fn extract_documents(encoded: &str) -> IngestResult<Vec<RawDocument>> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| IngestError::Extraction(format!("Base64 decode failed: {}", e)))?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| IngestError::Extraction(format!("Failed to open ZIP container: {}", e)))?;

    let mut documents = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping unreadable archive entry");
                continue;
            }
        };

        if entry.is_dir() {
            continue;
        }

        let filename = sanitize_entry_name(entry.name(), &format!("documento_{}.xml", index));

        let mut content = Vec::with_capacity(prealloc_size(entry.size()));
        if let Err(e) = entry.read_to_end(&mut content) {
            tracing::warn!(index, filename = %filename, error = %e, "Skipping unreadable archive entry");
            continue;
        }

        documents.push(RawDocument::new(filename, content));
    }

    tracing::debug!(count = documents.len(), "Extracted documents from container");

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    fn build_container(entries: &[(&str, &[u8])]) -> String {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        BASE64.encode(buffer)
    }

    #[test]
    fn test_extract_multiple_documents() {
        let encoded = build_container(&[
            ("nfse_1.xml", b"<Nfse><Numero>1</Numero></Nfse>"),
            ("nfse_2.xml", b"<Nfse><Numero>2</Numero></Nfse>"),
        ]);

        let docs = extract_documents(&encoded).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "nfse_1.xml");
        assert_eq!(docs[1].content, b"<Nfse><Numero>2</Numero></Nfse>");
    }

    #[test]
    fn test_entry_names_are_sanitized() {
        let encoded = build_container(&[("../../etc/nfse_1.xml", b"<Nfse/>")]);
        let docs = extract_documents(&encoded).unwrap();
        assert_eq!(docs[0].filename, "nfse_1.xml");
    }

    #[test]
    fn test_directories_are_skipped() {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.add_directory("notas/", options).unwrap();
            zip.start_file("notas/nfse_1.xml", options).unwrap();
            zip.write_all(b"<Nfse/>").unwrap();
            zip.finish().unwrap();
        }
        let docs = extract_documents(&BASE64.encode(buffer)).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "nfse_1.xml");
    }

    #[test]
    fn test_invalid_base64_is_a_hard_failure() {
        let result = extract_documents("not-valid-base64!!!");
        assert!(matches!(result, Err(IngestError::Extraction(_))));
    }

    #[test]
    fn test_non_zip_payload_is_a_hard_failure() {
        let encoded = BASE64.encode(b"plain text, not an archive");
        let result = extract_documents(&encoded);
        assert!(matches!(result, Err(IngestError::Extraction(_))));
    }

    #[test]
    fn test_prealloc_is_capped_at_limit() {
        assert_eq!(prealloc_size(128), 128);
        assert_eq!(prealloc_size(MAX_ENTRY_PREALLOC), MAX_ENTRY_PREALLOC as usize);
        // A hostile container can declare any size; the reserve must not
        // follow it.
        assert_eq!(prealloc_size(u64::MAX), MAX_ENTRY_PREALLOC as usize);
    }

    #[test]
    fn test_empty_container_yields_no_documents() {
        let encoded = build_container(&[]);
        assert!(extract_documents(&encoded).unwrap().is_empty());
    }
}
