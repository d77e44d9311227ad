// 🔄 Pipeline - upload → report, in one synchronous pass
//
//   funding table ──► allocation records ──► child summaries ─┐
//   claims table  ──► confirmed claims ───────────────────────┼─► report rows
//   registry      ──► child ids (optional) ───────────────────┘
//
// If any reported child has no registry entry the outcome carries a
// correction request; `finalize` applies the manual matches afterwards.

use crate::aggregate::{AggregationStats, Aggregator, ChildSummary, FundingWindow};
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{funding_records, ClaimRow, RegistryRow, Table};
use crate::reconciliation::{
    apply_matches, ChildRegistry, ClaimsIndex, CorrectionRequest, ManualMatch, Reconciler,
};
use crate::report::ReportTable;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Complete(ReportTable),
    NeedsCorrection {
        table: ReportTable,
        request: CorrectionRequest,
    },
}

impl PipelineOutcome {
    pub fn table(&self) -> &ReportTable {
        match self {
            PipelineOutcome::Complete(table) => table,
            PipelineOutcome::NeedsCorrection { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    aggregator: Aggregator,
}

impl Pipeline {
    pub fn new(window: Option<FundingWindow>) -> Self {
        let aggregator = match window {
            Some(window) => Aggregator::new().with_window(window),
            None => Aggregator::new(),
        };
        Pipeline { aggregator }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.funding_window())
    }

    /// Parse and aggregate the funding table only
    pub fn summarize(&self, funding: &Table) -> Result<(Vec<ChildSummary>, AggregationStats)> {
        let records = funding_records(funding)?;
        self.aggregator.aggregate_with_stats(&records)
    }

    pub fn run(
        &self,
        funding: &Table,
        claims: &Table,
        registry: Option<&Table>,
    ) -> Result<PipelineOutcome> {
        let (summaries, stats) = self.summarize(funding)?;
        info!("{}", stats.summary());

        let claims = ClaimsIndex::from_sourced(&claims.deserialize::<ClaimRow>()?);
        let registry = match registry {
            Some(table) => Some(ChildRegistry::from_sourced(
                table.deserialize::<RegistryRow>()?,
            )),
            None => None,
        };

        let outcome = Reconciler::new().reconcile(&summaries, &claims, registry.as_ref());
        let table = ReportTable::new(outcome.rows, registry.is_some());

        Ok(match outcome.corrections {
            Some(request) => PipelineOutcome::NeedsCorrection { table, request },
            None => PipelineOutcome::Complete(table),
        })
    }

    /// Apply phase-two matches; names left unresolved keep a blank Child ID
    pub fn finalize(mut table: ReportTable, matches: &[ManualMatch]) -> ReportTable {
        let applied = apply_matches(&mut table.rows, matches);
        info!(applied, requested = matches.len(), "applied manual registry matches");
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Month;
    use crate::error::FundingError;
    use rust_decimal_macros::dec;

    const FUNDING: &str = "\
Child,Allocation Date,Allocation Description,Allocation Value
Alice Byrne,05/08/2024,15 hours x €4.80,72.00
Alice Byrne,06/01/2025,6 hours x €4.80,28.80
Ben Walsh,05/08/2024,30 hours x €5.00,150.00
Cara Doyle,05/08/2024,10 hours x €5.00,50.00
";

    const CLAIMS: &str = "\
Child,All Claims Confirmed by Parent?,Date of Birth,CHICK,Claim Until
Alice Byrne,Yes,01/02/2021,CH-1,31/12/2025
Ben Walsh,Yes,03/04/2021,CH-2,31/01/2026
Cara Doyle,No,05/06/2021,CH-3,31/01/2026
";

    fn table(name: &str, text: &str) -> Table {
        Table::from_csv_bytes(name, text.as_bytes()).unwrap()
    }

    #[test]
    fn test_run_without_registry_completes() {
        let pipeline = Pipeline::new(FundingWindow::for_year(2024));
        let outcome = pipeline
            .run(&table("funding.csv", FUNDING), &table("claims.csv", CLAIMS), None)
            .unwrap();

        let PipelineOutcome::Complete(report) = outcome else {
            panic!("expected a complete report");
        };

        assert!(!report.include_child_id);
        assert_eq!(report.rows.len(), 2, "Cara has no confirmed claim");
        assert_eq!(report.rows[0].name, "Alice Byrne");
        assert_eq!(report.rows[0].term_pattern_label, "6/15");
        assert_eq!(report.rows[0].month_value(Month::Jan), Some(dec!(28.80)));
        assert_eq!(report.rows[1].claim_id, "CH-2");
    }

    #[test]
    fn test_run_with_registry_requests_corrections_then_finalizes() {
        let registry = "Full Name,Child ID\nAlice Byrne,1042\nBenjamin Walsh,1043\n";
        let pipeline = Pipeline::new(FundingWindow::for_year(2024));

        let outcome = pipeline
            .run(
                &table("funding.csv", FUNDING),
                &table("claims.csv", CLAIMS),
                Some(&table("registry.csv", registry)),
            )
            .unwrap();

        let PipelineOutcome::NeedsCorrection { table: report, request } = outcome else {
            panic!("expected a correction request");
        };

        assert_eq!(request.unmatched, vec!["Ben Walsh"]);
        assert_eq!(request.possible_matches.len(), 1);
        assert_eq!(request.possible_matches[0].full_name, "Benjamin Walsh");

        let report = Pipeline::finalize(
            report,
            &[ManualMatch {
                name: "Ben Walsh".to_string(),
                id: "1043".to_string(),
            }],
        );

        assert!(report.include_child_id);
        assert_eq!(report.rows[0].child_id.as_deref(), Some("1042"));
        assert_eq!(report.rows[1].child_id.as_deref(), Some("1043"));
    }

    #[test]
    fn test_bad_description_aborts_run() {
        let funding = "\
Child,Allocation Date,Allocation Description,Allocation Value
Alice Byrne,05/08/2024,15 hours x €4.80,72.00
Ben Walsh,05/08/2024,thirty hours,150.00
";
        let pipeline = Pipeline::new(None);
        let err = pipeline
            .run(&table("funding.csv", funding), &table("claims.csv", CLAIMS), None)
            .unwrap_err();

        assert!(err.is_data_quality());
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_bad_row_outside_window_still_aborts() {
        let funding = "\
Child,Allocation Date,Allocation Description,Allocation Value
Alice Byrne,05/08/2024,15 hours x €4.80,72.00
Alice Byrne,15/03/2023,fifteen hours,72.00
";
        let pipeline = Pipeline::new(FundingWindow::for_year(2024));
        let err = pipeline
            .run(&table("funding.csv", funding), &table("claims.csv", CLAIMS), None)
            .unwrap_err();

        assert!(err.to_string().contains("funding.csv row 3"));
    }

    #[test]
    fn test_value_overflow_aborts_run() {
        let funding = "\
Child,Allocation Date,Allocation Description,Allocation Value
Alice Byrne,05/08/2024,15 hours x €4.80,79228162514264337593543950335
Alice Byrne,12/08/2024,15 hours x €4.80,79228162514264337593543950335
";
        let pipeline = Pipeline::new(FundingWindow::for_year(2024));
        let err = pipeline
            .run(&table("funding.csv", funding), &table("claims.csv", CLAIMS), None)
            .unwrap_err();

        assert!(matches!(err, FundingError::ValueOverflow { .. }));
        assert!(err.is_data_quality());
    }
}
