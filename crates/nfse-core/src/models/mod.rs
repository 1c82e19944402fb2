pub mod dedup;
pub mod invoice;
pub mod report;

pub use dedup::{DuplicateVerdict, MatchStrategy};
pub use invoice::{InvoiceRecord, ParsedInvoice, ProcessingStatus, RawDocument};
pub use report::{BatchItemOutcome, BatchReport, IngestOutcome};
