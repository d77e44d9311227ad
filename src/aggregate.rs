// 📅 Aggregator - allocation rows → per-child funding year
//
// Two grouping passes:
//   1. (child, month)  → value sum + hours/rates/dates seen that month
//   2. child           → total, distinct hours for the term pattern,
//                        per-month values for the 12 report columns
//
// A month with no allocation stays absent from `per_month_value`. That is a
// different state from an allocation worth €0.00.

use crate::error::{FundingError, Result};
use crate::pattern::infer_term_pattern;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// MONTHS OF THE FUNDING YEAR
// ============================================================================

/// Calendar month, ordered as the funding year runs (August first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
}

impl Month {
    /// Report column order
    pub const FUNDING_YEAR: [Month; 12] = [
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
    ];

    pub fn from_date(date: NaiveDate) -> Month {
        match date.month() {
            1 => Month::Jan,
            2 => Month::Feb,
            3 => Month::Mar,
            4 => Month::Apr,
            5 => Month::May,
            6 => Month::Jun,
            7 => Month::Jul,
            8 => Month::Aug,
            9 => Month::Sep,
            10 => Month::Oct,
            11 => Month::Nov,
            _ => Month::Dec,
        }
    }

    /// Three-letter label used as the column header
    pub fn label(&self) -> &'static str {
        match self {
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// FUNDING WINDOW
// ============================================================================

/// Inclusive date range; records outside it are dropped before grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FundingWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        FundingWindow { start, end }
    }

    /// 1 August `start_year` through 31 July of the following year
    pub fn for_year(start_year: i32) -> Option<Self> {
        Some(FundingWindow {
            start: NaiveDate::from_ymd_opt(start_year, 8, 1)?,
            end: NaiveDate::from_ymd_opt(start_year + 1, 7, 31)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for FundingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%d/%m/%Y"),
            self.end.format("%d/%m/%Y")
        )
    }
}

// ============================================================================
// RECORDS AND GROUPS
// ============================================================================

/// One parsed funding allocation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub child_name: String,
    pub date: NaiveDate,
    pub weekly_hours: i64,
    pub hourly_rate: Decimal,
    pub value: Decimal,
}

/// All allocations for one child in one month
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub value: Decimal,
    pub weekly_hours: Vec<i64>,
    pub rates: Vec<Decimal>,
    pub dates: Vec<NaiveDate>,
}

impl MonthBucket {
    fn push(&mut self, record: &AllocationRecord) -> Result<()> {
        self.value = self.value.checked_add(record.value).ok_or_else(|| {
            FundingError::ValueOverflow {
                scope: record.child_name.clone(),
            }
        })?;
        self.weekly_hours.push(record.weekly_hours);
        self.rates.push(record.hourly_rate);
        self.dates.push(record.date);
        Ok(())
    }
}

/// Funding year for one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub name: String,
    pub term_pattern_label: String,
    /// Distinct weekly hours across the whole year, ascending
    pub weekly_hours: Vec<i64>,
    pub total_value: Decimal,
    /// Missing key = no allocation that month
    pub per_month_value: BTreeMap<Month, Decimal>,
}

impl ChildSummary {
    pub fn month_value(&self, month: Month) -> Option<Decimal> {
        self.per_month_value.get(&month).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    pub records_read: usize,
    pub records_kept: usize,
    pub outside_window: usize,
    pub children: usize,
}

impl AggregationStats {
    pub fn summary(&self) -> String {
        format!(
            "{} allocations read, {} kept, {} outside the funding window, {} children",
            self.records_read, self.records_kept, self.outside_window, self.children
        )
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub type MonthBuckets = BTreeMap<(String, Month), MonthBucket>;

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    window: Option<FundingWindow>,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator { window: None }
    }

    pub fn with_window(mut self, window: FundingWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn window(&self) -> Option<FundingWindow> {
        self.window
    }

    /// Group in-window records by (child, month)
    pub fn buckets(&self, records: &[AllocationRecord]) -> Result<(MonthBuckets, AggregationStats)> {
        let mut buckets = MonthBuckets::new();
        let mut stats = AggregationStats {
            records_read: records.len(),
            ..Default::default()
        };

        for record in records {
            if let Some(window) = &self.window {
                if !window.contains(record.date) {
                    debug!(
                        child = %record.child_name,
                        date = %record.date,
                        "allocation outside funding window skipped"
                    );
                    stats.outside_window += 1;
                    continue;
                }
            }

            stats.records_kept += 1;
            buckets
                .entry((record.child_name.clone(), Month::from_date(record.date)))
                .or_default()
                .push(record)?;
        }

        stats.children = buckets
            .keys()
            .map(|(child, _)| child.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Ok((buckets, stats))
    }

    /// Build one summary per child, sorted by name
    pub fn aggregate(&self, records: &[AllocationRecord]) -> Result<Vec<ChildSummary>> {
        Ok(self.aggregate_with_stats(records)?.0)
    }

    pub fn aggregate_with_stats(
        &self,
        records: &[AllocationRecord],
    ) -> Result<(Vec<ChildSummary>, AggregationStats)> {
        let (buckets, stats) = self.buckets(records)?;

        let mut by_child: BTreeMap<&str, Vec<(Month, &MonthBucket)>> = BTreeMap::new();
        for ((child, month), bucket) in &buckets {
            by_child
                .entry(child.as_str())
                .or_default()
                .push((*month, bucket));
        }

        let summaries: Vec<ChildSummary> = by_child
            .into_iter()
            .map(|(name, months)| summarize_child(name, &months))
            .collect::<Result<_>>()?;

        info!(
            records_read = stats.records_read,
            records_kept = stats.records_kept,
            outside_window = stats.outside_window,
            children = stats.children,
            "aggregated funding allocations"
        );

        Ok((summaries, stats))
    }
}

fn summarize_child(name: &str, months: &[(Month, &MonthBucket)]) -> Result<ChildSummary> {
    let weekly_hours: Vec<i64> = months
        .iter()
        .flat_map(|(_, bucket)| bucket.weekly_hours.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let per_month_value: BTreeMap<Month, Decimal> = months
        .iter()
        .map(|(month, bucket)| (*month, bucket.value))
        .collect();

    let total_value = per_month_value
        .values()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(*value))
        .ok_or_else(|| FundingError::ValueOverflow {
            scope: name.to_string(),
        })?;

    Ok(ChildSummary {
        name: name.to_string(),
        term_pattern_label: infer_term_pattern(weekly_hours.iter().copied()),
        weekly_hours,
        total_value,
        per_month_value,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(child: &str, date: (i32, u32, u32), hours: i64, value: Decimal) -> AllocationRecord {
        AllocationRecord {
            child_name: child.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            weekly_hours: hours,
            hourly_rate: dec!(4.80),
            value,
        }
    }

    #[test]
    fn test_month_order_follows_funding_year() {
        assert!(Month::Aug < Month::Dec);
        assert!(Month::Dec < Month::Jan);
        assert!(Month::Jan < Month::Jul);
        assert_eq!(Month::FUNDING_YEAR[0], Month::Aug);
        assert_eq!(Month::FUNDING_YEAR[11], Month::Jul);
    }

    #[test]
    fn test_month_from_date() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        assert_eq!(Month::from_date(date), Month::Feb);
        assert_eq!(Month::from_date(date).label(), "Feb");
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let window = FundingWindow::for_year(2024).unwrap();

        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()));
        assert!(window.contains(NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2024, 7, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()));
    }

    #[test]
    fn test_records_outside_window_are_dropped() {
        let records = vec![
            record("Alice", (2024, 7, 31), 15, dec!(100)),
            record("Alice", (2024, 8, 1), 15, dec!(72)),
            record("Alice", (2025, 7, 31), 15, dec!(50)),
            record("Alice", (2025, 8, 1), 15, dec!(100)),
        ];

        let aggregator = Aggregator::new().with_window(FundingWindow::for_year(2024).unwrap());
        let (summaries, stats) = aggregator.aggregate_with_stats(&records).unwrap();

        assert_eq!(stats.records_read, 4);
        assert_eq!(stats.records_kept, 2);
        assert_eq!(stats.outside_window, 2);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_value, dec!(122));
        assert_eq!(summaries[0].month_value(Month::Aug), Some(dec!(72)));
        assert_eq!(summaries[0].month_value(Month::Jul), Some(dec!(50)));
    }

    #[test]
    fn test_child_without_in_window_records_is_omitted() {
        let records = vec![
            record("Alice", (2024, 9, 2), 15, dec!(72)),
            record("Bob", (2023, 9, 2), 15, dec!(72)),
        ];

        let aggregator = Aggregator::new().with_window(FundingWindow::for_year(2024).unwrap());
        let summaries = aggregator.aggregate(&records).unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "Alice");
    }

    #[test]
    fn test_same_month_records_are_summed() {
        let records = vec![
            record("Alice", (2024, 9, 2), 15, dec!(72.00)),
            record("Alice", (2024, 9, 9), 15, dec!(72.00)),
            record("Alice", (2024, 9, 16), 6, dec!(28.80)),
        ];

        let aggregator = Aggregator::new();
        let (buckets, _) = aggregator.buckets(&records).unwrap();
        let bucket = &buckets[&("Alice".to_string(), Month::Sep)];

        assert_eq!(bucket.value, dec!(172.80));
        assert_eq!(bucket.weekly_hours, vec![15, 15, 6]);
        assert_eq!(bucket.rates.len(), 3);
        assert_eq!(bucket.dates.len(), 3);
    }

    #[test]
    fn test_month_values_sum_to_total() {
        let records = vec![
            record("Alice", (2024, 8, 5), 15, dec!(72.00)),
            record("Alice", (2024, 10, 7), 15, dec!(10.55)),
            record("Alice", (2024, 10, 14), 15, dec!(0.45)),
            record("Alice", (2025, 3, 3), 6, dec!(28.80)),
            record("Alice", (2025, 6, 2), 6, dec!(0)),
        ];

        let summaries = Aggregator::new().aggregate(&records).unwrap();
        let summary = &summaries[0];
        let month_sum: Decimal = summary.per_month_value.values().copied().sum();

        assert_eq!(month_sum, summary.total_value);
        assert_eq!(summary.total_value, dec!(111.80));
    }

    #[test]
    fn test_zero_value_month_differs_from_blank_month() {
        let records = vec![
            record("Alice", (2024, 8, 5), 15, dec!(72.00)),
            record("Alice", (2024, 9, 2), 15, dec!(0)),
        ];

        let summary = &Aggregator::new().aggregate(&records).unwrap()[0];

        assert_eq!(summary.month_value(Month::Sep), Some(Decimal::ZERO));
        assert_eq!(summary.month_value(Month::Oct), None);
    }

    #[test]
    fn test_pattern_uses_distinct_hours_across_year() {
        let records = vec![
            record("Alice", (2024, 9, 2), 15, dec!(72)),
            record("Alice", (2024, 9, 9), 15, dec!(72)),
            record("Alice", (2024, 12, 2), 6, dec!(28.80)),
        ];

        let summary = &Aggregator::new().aggregate(&records).unwrap()[0];

        assert_eq!(summary.weekly_hours, vec![6, 15]);
        assert_eq!(summary.term_pattern_label, "6/15");
    }

    #[test]
    fn test_summaries_sorted_by_name() {
        let records = vec![
            record("Zoe", (2024, 9, 2), 15, dec!(72)),
            record("Alice", (2024, 9, 2), 15, dec!(72)),
            record("Mia", (2024, 9, 2), 15, dec!(72)),
        ];

        let names: Vec<String> = Aggregator::new()
            .aggregate(&records)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert_eq!(names, vec!["Alice", "Mia", "Zoe"]);
    }

    #[test]
    fn test_value_overflow_is_an_error() {
        let records = vec![
            record("Alice", (2024, 9, 2), 15, Decimal::MAX),
            record("Alice", (2024, 9, 9), 15, Decimal::MAX),
        ];

        let err = Aggregator::new().aggregate(&records).unwrap_err();

        assert!(matches!(err, FundingError::ValueOverflow { ref scope } if scope == "Alice"));
        assert!(err.is_data_quality());
    }

    #[test]
    fn test_yearly_total_overflow_is_an_error() {
        // Each month fits on its own; the year does not
        let records = vec![
            record("Alice", (2024, 9, 2), 15, Decimal::MAX),
            record("Alice", (2024, 10, 7), 15, Decimal::MAX),
        ];

        assert!(Aggregator::new().aggregate(&records).is_err());
    }
}
