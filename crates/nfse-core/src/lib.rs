//! NFS-e Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! collaborator contracts shared across all NFS-e ingestion components.

pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::IngestConfig;
pub use credentials::{CredentialProvider, DecryptedCredential, StaticCredentialProvider};
pub use error::AppError;
pub use storage_types::StorageBackend;
