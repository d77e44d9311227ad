// 📊 Report - summary workbook with claim deadline warnings
//
// Layout: Name | Date of Birth | CHICK | Claim Until | Term/Non-Term/Changes |
//         Allocation Value | Aug .. Jul | (Child ID)
//
// The Claim Until cell is filled by how soon the claim runs out:
//   ≤ 7 days red, ≤ 14 days amber, ≤ 30 days yellow.

use crate::aggregate::Month;
use crate::error::{FundingError, Result};
use crate::ingest::INPUT_DATE_FORMAT;
use crate::reconciliation::ReportRow;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const CLAIM_UNTIL_COLUMN: u16 = 3;
const CURRENCY_FORMAT: &str = "€0.00";
const SECONDS_PER_DAY: i64 = 86_400;

// ============================================================================
// DEADLINE FLAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadlineFlag {
    Urgent,
    Warning,
    Caution,
}

impl DeadlineFlag {
    /// Whole days from `now` until midnight at the start of `claim_until`,
    /// rounded down. A claim ending today is already negative after midnight.
    pub fn days_until(claim_until: NaiveDate, now: NaiveDateTime) -> i64 {
        let deadline = claim_until.and_time(chrono::NaiveTime::MIN);
        (deadline - now).num_seconds().div_euclid(SECONDS_PER_DAY)
    }

    pub fn from_days(days: i64) -> Option<DeadlineFlag> {
        match days {
            d if d <= 7 => Some(DeadlineFlag::Urgent),
            d if d <= 14 => Some(DeadlineFlag::Warning),
            d if d <= 30 => Some(DeadlineFlag::Caution),
            _ => None,
        }
    }

    pub fn classify(claim_until: NaiveDate, now: NaiveDateTime) -> Option<DeadlineFlag> {
        Self::from_days(Self::days_until(claim_until, now))
    }

    /// Flag for a raw Claim Until cell; unparseable dates get no flag
    pub fn for_cell(claim_until: &str, now: NaiveDateTime) -> Option<DeadlineFlag> {
        if claim_until.trim().is_empty() {
            return None;
        }
        match NaiveDate::parse_from_str(claim_until.trim(), INPUT_DATE_FORMAT) {
            Ok(date) => Self::classify(date, now),
            Err(e) => {
                debug!(value = claim_until, error = %e, "claim-until date not flagged");
                None
            }
        }
    }

    pub fn rgb(&self) -> u32 {
        match self {
            DeadlineFlag::Urgent => 0xFF0000,
            DeadlineFlag::Warning => 0xFFBF00,
            DeadlineFlag::Caution => 0xFFFF00,
        }
    }
}

// ============================================================================
// REPORT TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
    /// Set when a registry was supplied; adds the Child ID column
    pub include_child_id: bool,
}

impl ReportTable {
    pub fn new(rows: Vec<ReportRow>, include_child_id: bool) -> Self {
        ReportTable {
            rows,
            include_child_id,
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec![
            "Name",
            "Date of Birth",
            "CHICK",
            "Claim Until",
            "Term/Non-Term/Changes",
            "Allocation Value",
        ];
        headers.extend(Month::FUNDING_YEAR.iter().map(|month| month.label()));
        if self.include_child_id {
            headers.push("Child ID");
        }
        headers
    }

    pub fn grand_total(&self) -> Result<Decimal> {
        self.rows
            .iter()
            .try_fold(Decimal::ZERO, |total, row| total.checked_add(row.total_value))
            .ok_or_else(|| FundingError::ValueOverflow {
                scope: "the report".to_string(),
            })
    }
}

pub fn format_euro(value: Decimal) -> String {
    format!("€{:.2}", value.round_dp(2))
}

// ============================================================================
// WRITERS
// ============================================================================

/// Render the report as an .xlsx workbook
pub fn write_xlsx(table: &ReportTable, now: NaiveDateTime) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Funding Summary")?;

    let header_format = Format::new().set_bold();
    let money_format = Format::new().set_num_format(CURRENCY_FORMAT);

    for (col, header) in table.headers().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    let mut flagged = 0;
    for (index, row) in table.rows.iter().enumerate() {
        let r = (index + 1) as u32;

        worksheet.write_string(r, 0, &row.name)?;
        worksheet.write_string(r, 1, &row.date_of_birth)?;
        worksheet.write_string(r, 2, &row.claim_id)?;

        match DeadlineFlag::for_cell(&row.claim_until, now) {
            Some(flag) => {
                let fill = Format::new()
                    .set_pattern(FormatPattern::Solid)
                    .set_background_color(Color::RGB(flag.rgb()));
                worksheet.write_string_with_format(r, CLAIM_UNTIL_COLUMN, &row.claim_until, &fill)?;
                flagged += 1;
            }
            None => {
                worksheet.write_string(r, CLAIM_UNTIL_COLUMN, &row.claim_until)?;
            }
        }

        worksheet.write_string(r, 4, &row.term_pattern_label)?;
        worksheet.write_number_with_format(r, 5, to_f64(row.total_value), &money_format)?;

        for (offset, month) in Month::FUNDING_YEAR.iter().enumerate() {
            // No allocation that month: leave the cell empty
            if let Some(value) = row.month_value(*month) {
                worksheet.write_number_with_format(r, 6 + offset as u16, to_f64(value), &money_format)?;
            }
        }

        if table.include_child_id {
            if let Some(id) = &row.child_id {
                worksheet.write_string(r, 18, id)?;
            }
        }
    }

    worksheet.set_column_width(0, 28)?;
    worksheet.set_column_width(4, 22)?;

    let bytes = workbook.save_to_buffer()?;
    info!(rows = table.rows.len(), flagged, "rendered summary workbook");
    Ok(bytes)
}

pub fn write_xlsx_file(table: &ReportTable, now: NaiveDateTime, path: &Path) -> Result<()> {
    let bytes = write_xlsx(table, now)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Plain CSV rendition of the same table; monetary cells as `€0.00`
pub fn write_csv(table: &ReportTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.headers())?;

    for row in &table.rows {
        let mut record = vec![
            row.name.clone(),
            row.date_of_birth.clone(),
            row.claim_id.clone(),
            row.claim_until.clone(),
            row.term_pattern_label.clone(),
            format_euro(row.total_value),
        ];
        record.extend(
            Month::FUNDING_YEAR
                .iter()
                .map(|month| row.month_value(*month).map(format_euro).unwrap_or_default()),
        );
        if table.include_child_id {
            record.push(row.child_id.clone().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
