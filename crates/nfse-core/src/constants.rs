//! Shared constants for the NFS-e ingestion core.

/// Prefix for every invoice storage key.
pub const STORAGE_PREFIX: &str = "nfse";

/// Content type used when persisting invoice XML blobs.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Canonical character encoding for normalized documents.
pub const CANONICAL_ENCODING: &str = "UTF-8";

/// Timestamp layout used by the municipal API for issue dates.
pub const ISSUE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date layout used by the municipal API for RPS issue dates.
pub const RPS_DATE_FORMAT: &str = "%Y-%m-%d";
