// Funding Summary - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod description;    // Allocation text → hours + rate
pub mod pattern;        // Term/non-term pattern labels
pub mod aggregate;      // Per-child, per-month grouping
pub mod ingest;         // CSV / Excel input tables
pub mod reconciliation; // Claims + registry joins
pub mod report;         // Summary workbook + deadline flags
pub mod session;        // Scratch state between upload and finalize
pub mod pipeline;       // Two-phase workflow
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{FundingError, Result};
pub use description::{parse_allocation_description, ParsedDescription};
pub use pattern::{infer_term_pattern, TermPattern, TERM_HOLIDAY_DIFFERENCES};
pub use aggregate::{
    AggregationStats, Aggregator, AllocationRecord, ChildSummary, FundingWindow, Month,
    MonthBucket,
};
pub use ingest::{
    funding_records, ClaimRow, FundingRow, RegistryRow, SourcedRow, Table,
};
pub use reconciliation::{
    apply_matches, ChildRegistry, ClaimRecord, ClaimsIndex, CorrectionRequest, ManualMatch,
    ReconciliationOutcome, Reconciler, ReportRow,
};
pub use report::{write_csv, write_xlsx, DeadlineFlag, ReportTable};
pub use session::{InMemoryScratchStore, ScratchStore};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
