//! NFS-e Storage Library
//!
//! Blob-store abstraction and implementations for the ingestion core.
//! It includes the Storage trait, S3 and local filesystem backends, and
//! the storage-key derivation for invoice documents.
//!
//! # Storage key format
//!
//! Invoice blobs live under deterministic, content-derived keys:
//!
//! `nfse/{year}/{competenceMMYYYY}/{digits-only-tax-id}/{filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key derivation is
//! centralized in the `keys` module so all backends stay consistent and
//! identical documents always land at identical locations.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{digits_only, invoice_storage_key, normalize_competence};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use nfse_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
