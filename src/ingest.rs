// 📥 Ingest - spreadsheets → typed rows
//
// Funding, claims and registry exports arrive as CSV or Excel. Both are
// normalised into a `Table` of string records keyed by the header row, then
// deserialised into the row structs below with serde, exactly as a CSV with
// headers would be.

use crate::aggregate::AllocationRecord;
use crate::description::parse_allocation_description;
use crate::error::{FundingError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Date format used by every input export
pub const INPUT_DATE_FORMAT: &str = "%d/%m/%Y";

// ============================================================================
// ROW TYPES (headers exactly as exported)
// ============================================================================

/// One row of the funding allocation export
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FundingRow {
    #[serde(rename = "Child")]
    pub child: String,

    #[serde(rename = "Allocation Date")]
    pub allocation_date: String,

    #[serde(rename = "Allocation Description")]
    pub allocation_description: String,

    #[serde(rename = "Allocation Value")]
    pub allocation_value: String,
}

/// One row of the claims-confirmation export
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimRow {
    #[serde(rename = "Child")]
    pub child: String,

    #[serde(rename = "All Claims Confirmed by Parent?")]
    pub confirmed_by_parent: String,

    #[serde(rename = "Date of Birth")]
    pub date_of_birth: String,

    /// Claim identifier
    #[serde(rename = "CHICK")]
    pub chick: String,

    #[serde(rename = "Claim Until")]
    pub claim_until: String,
}

impl ClaimRow {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_by_parent.trim() == "Yes"
    }
}

/// One row of the children registry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryRow {
    #[serde(rename = "Full Name")]
    pub full_name: String,

    #[serde(rename = "Child ID")]
    pub child_id: String,
}

/// Columns a row type needs before deserialising
pub trait TableRow: DeserializeOwned {
    const COLUMNS: &'static [&'static str];
}

impl TableRow for FundingRow {
    const COLUMNS: &'static [&'static str] = &[
        "Child",
        "Allocation Date",
        "Allocation Description",
        "Allocation Value",
    ];
}

impl TableRow for ClaimRow {
    const COLUMNS: &'static [&'static str] = &[
        "Child",
        "All Claims Confirmed by Parent?",
        "Date of Birth",
        "CHICK",
        "Claim Until",
    ];
}

impl TableRow for RegistryRow {
    const COLUMNS: &'static [&'static str] = &["Full Name", "Child ID"];
}

/// A deserialised row with its 1-based spreadsheet row number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedRow<T> {
    pub row: usize,
    pub record: T,
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    source_name: String,
    headers: StringRecord,
    rows: Vec<(usize, StringRecord)>,
}

impl Table {
    /// Parse CSV bytes; the first line is the header row
    pub fn from_csv_bytes(source_name: &str, bytes: &[u8]) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();

        let mut last_row = 1;
        for result in reader.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|pos| record_line(bytes, pos));
                match line {
                    Some(row) => FundingError::from(e).at_row(source_name, row),
                    None => FundingError::from(e),
                }
            })?;
            let row = record
                .position()
                .map(|pos| record_line(bytes, pos))
                .unwrap_or(last_row + 1);
            last_row = row;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            rows.push((row, record));
        }

        Ok(Table {
            source_name: source_name.to_string(),
            headers,
            rows,
        })
    }

    /// Parse the first worksheet of an Excel/ODS workbook
    pub fn from_xlsx_bytes(source_name: &str, bytes: &[u8]) -> Result<Table> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| FundingError::EmptyWorkbook(source_name.to_string()))??;

        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut sheet_rows = range.rows().enumerate();

        let headers = match sheet_rows.next() {
            Some((_, cells)) => cells.iter().map(cell_to_string).collect::<StringRecord>(),
            None => StringRecord::new(),
        };

        let mut rows = Vec::new();
        for (index, cells) in sheet_rows {
            let record: StringRecord = cells.iter().map(cell_to_string).collect();
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            rows.push((first_row + index + 1, record));
        }

        Ok(Table {
            source_name: source_name.to_string(),
            headers,
            rows,
        })
    }

    /// Dispatch on the file extension of `source_name`
    pub fn from_bytes(source_name: &str, bytes: &[u8]) -> Result<Table> {
        let extension = Path::new(source_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Table::from_csv_bytes(source_name, bytes),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Table::from_xlsx_bytes(source_name, bytes),
            _ => Err(FundingError::UnsupportedFormat(source_name.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Table> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.csv");
        let table = Table::from_bytes(name, &bytes)?;
        info!(source = name, rows = table.len(), "loaded table");
        Ok(table)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deserialise every row into `T`, failing on the first bad row
    pub fn deserialize<T: TableRow>(&self) -> Result<Vec<SourcedRow<T>>> {
        for column in T::COLUMNS {
            if !self.headers.iter().any(|header| header == *column) {
                return Err(FundingError::MissingColumn {
                    source_name: self.source_name.clone(),
                    column: column.to_string(),
                });
            }
        }

        self.rows
            .iter()
            .map(|(row, record)| {
                record
                    .deserialize::<T>(Some(&self.headers))
                    .map(|parsed| SourcedRow {
                        row: *row,
                        record: parsed,
                    })
                    .map_err(|e| FundingError::from(e).at_row(&self.source_name, *row))
            })
            .collect()
    }
}

/// Physical 1-based line a CSV record starts on.
///
/// The reader stamps a record with the position right after the previous
/// terminator, before the blank lines (or the `\n` of a CRLF) it then skips.
fn record_line(bytes: &[u8], position: &csv::Position) -> usize {
    let start = (position.byte() as usize).min(bytes.len());
    let skipped = bytes[start..]
        .iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .filter(|b| **b == b'\n')
        .count();
    position.line() as usize + skipped
}

/// Render a workbook cell the way it would appear in a CSV export
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|date| date.format(INPUT_DATE_FORMAT).to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(|date| date.format(INPUT_DATE_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

// ============================================================================
// FIELD PARSING
// ============================================================================

pub fn parse_input_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), INPUT_DATE_FORMAT).map_err(|_| {
        FundingError::InvalidDate {
            value: value.to_string(),
        }
    })
}

/// Parse a monetary value such as `72.00`, `€72.00` or `€1,072.00`
pub fn parse_amount(value: &str) -> Result<Decimal> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '€' && *c != ',' && !c.is_whitespace())
        .collect();

    Decimal::from_str(&cleaned).map_err(|_| FundingError::InvalidAmount {
        value: value.to_string(),
    })
}

/// Parse funding rows into allocation records, aborting on the first bad row
pub fn funding_records(table: &Table) -> Result<Vec<AllocationRecord>> {
    let rows = table.deserialize::<FundingRow>()?;
    let mut records = Vec::with_capacity(rows.len());

    for SourcedRow { row, record } in rows {
        let at_row = |e: FundingError| e.at_row(table.source_name(), row);

        let date = parse_input_date(&record.allocation_date).map_err(at_row)?;
        let parsed = parse_allocation_description(&record.allocation_description).map_err(at_row)?;
        let value = parse_amount(&record.allocation_value).map_err(at_row)?;

        debug!(
            row,
            child = %record.child,
            hours = parsed.weekly_hours,
            %value,
            "parsed allocation"
        );

        records.push(AllocationRecord {
            child_name: record.child,
            date,
            weekly_hours: parsed.weekly_hours,
            hourly_rate: parsed.hourly_rate,
            value,
        });
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
