// 🚨 Error Model - data-quality failures vs. I/O failures
//
// Reconciliation gaps (unconfirmed claims, unknown registry names) are NOT
// errors: they travel back to the caller as structured data. Everything in
// this enum aborts the batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FundingError {
    /// Allocation text does not match `<hours> hours x €<rate>`
    #[error("malformed allocation description: {description:?}")]
    MalformedDescription { description: String },

    #[error("invalid date {value:?} (expected DD/MM/YYYY)")]
    InvalidDate { value: String },

    #[error("invalid allocation value {value:?}")]
    InvalidAmount { value: String },

    /// Wraps a row-level failure with the spreadsheet row that caused it
    #[error("{source_name} row {row}: {source}")]
    Row {
        source_name: String,
        row: usize,
        #[source]
        source: Box<FundingError>,
    },

    /// Summing allocation values went past what a Decimal can hold
    #[error("allocation values for {scope} overflow the total")]
    ValueOverflow { scope: String },

    #[error("{source_name} is missing required column {column:?}")]
    MissingColumn { source_name: String, column: String },

    #[error("{0} contains no worksheet")]
    EmptyWorkbook(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("no pending session for token {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("failed to read workbook: {0}")]
    XlsxRead(#[from] calamine::Error),

    #[error("failed to write workbook: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
}

impl FundingError {
    /// Attach the source file and 1-based row number to a row-level failure
    pub fn at_row(self, source_name: &str, row: usize) -> Self {
        FundingError::Row {
            source_name: source_name.to_string(),
            row,
            source: Box::new(self),
        }
    }

    /// True for errors caused by the uploaded data rather than the system
    pub fn is_data_quality(&self) -> bool {
        match self {
            FundingError::MalformedDescription { .. }
            | FundingError::InvalidDate { .. }
            | FundingError::InvalidAmount { .. }
            | FundingError::ValueOverflow { .. }
            | FundingError::MissingColumn { .. }
            | FundingError::EmptyWorkbook(_)
            | FundingError::UnsupportedFormat(_)
            | FundingError::Csv(_)
            | FundingError::XlsxRead(_) => true,
            FundingError::Row { source, .. } => source.is_data_quality(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FundingError>;
