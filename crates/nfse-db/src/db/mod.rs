//! Database repositories for data access
//
// Invoice repository (persisted documents, duplicate-key lookups)
pub mod invoices;
