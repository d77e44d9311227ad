// ⚖️ Reconciliation - child summaries × claims × registry
//
// Join rules (all on the exact child-name string):
//   claims   → only rows confirmed by the parent ("Yes") are join targets;
//              a child without one is left out of the report
//   registry → optional; names with no registry entry come back as a
//              correction request for a human to resolve
//
// Neither gap is an error.

use crate::aggregate::{ChildSummary, Month};
use crate::ingest::{ClaimRow, RegistryRow, SourcedRow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::info;

// ============================================================================
// CLAIMS
// ============================================================================

/// Claim details attached to a report row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub date_of_birth: String,
    pub claim_id: String,
    pub claim_until: String,
}

/// Confirmed claims keyed by child name
#[derive(Debug, Clone, Default)]
pub struct ClaimsIndex {
    by_child: HashMap<String, ClaimRecord>,
    unconfirmed: usize,
}

impl ClaimsIndex {
    /// Keep confirmed rows only; the first confirmed row per child wins
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a ClaimRow>,
    {
        let mut index = ClaimsIndex::default();

        for row in rows {
            if !row.is_confirmed() {
                index.unconfirmed += 1;
                continue;
            }
            index
                .by_child
                .entry(row.child.clone())
                .or_insert_with(|| ClaimRecord {
                    date_of_birth: row.date_of_birth.clone(),
                    claim_id: row.chick.clone(),
                    claim_until: row.claim_until.clone(),
                });
        }

        index
    }

    pub fn from_sourced(rows: &[SourcedRow<ClaimRow>]) -> Self {
        Self::from_rows(rows.iter().map(|sourced| &sourced.record))
    }

    pub fn get(&self, child: &str) -> Option<&ClaimRecord> {
        self.by_child.get(child)
    }

    pub fn len(&self) -> usize {
        self.by_child.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_child.is_empty()
    }

    /// Rows dropped because the parent has not confirmed every claim
    pub fn unconfirmed(&self) -> usize {
        self.unconfirmed
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ChildRegistry {
    rows: Vec<RegistryRow>,
}

impl ChildRegistry {
    pub fn new(rows: Vec<RegistryRow>) -> Self {
        ChildRegistry { rows }
    }

    pub fn from_sourced(rows: Vec<SourcedRow<RegistryRow>>) -> Self {
        Self::new(rows.into_iter().map(|sourced| sourced.record).collect())
    }

    pub fn lookup(&self, full_name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.full_name == full_name)
            .map(|row| row.child_id.as_str())
    }

    pub fn rows(&self) -> &[RegistryRow] {
        &self.rows
    }
}

// ============================================================================
// REPORT ROWS & CORRECTIONS
// ============================================================================

/// One child in the final report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub name: String,
    pub date_of_birth: String,
    pub claim_id: String,
    pub claim_until: String,
    pub term_pattern_label: String,
    pub total_value: Decimal,
    pub per_month_value: BTreeMap<Month, Decimal>,
    pub child_id: Option<String>,
}

impl ReportRow {
    pub fn month_value(&self, month: Month) -> Option<Decimal> {
        self.per_month_value.get(&month).copied()
    }
}

/// Names that need a human to pick their registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub unmatched: Vec<String>,
    #[serde(rename = "possibleMatches")]
    pub possible_matches: Vec<RegistryRow>,
}

/// A manual name → child id resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualMatch {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub rows: Vec<ReportRow>,
    /// Children with allocations but no confirmed claim
    pub excluded: Vec<String>,
    pub corrections: Option<CorrectionRequest>,
}

impl ReconciliationOutcome {
    pub fn needs_correction(&self) -> bool {
        self.corrections.is_some()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} children reported, {} without a confirmed claim, {} awaiting a registry match",
            self.rows.len(),
            self.excluded.len(),
            self.corrections
                .as_ref()
                .map(|c| c.unmatched.len())
                .unwrap_or(0)
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Reconciler
    }

    pub fn reconcile(
        &self,
        summaries: &[ChildSummary],
        claims: &ClaimsIndex,
        registry: Option<&ChildRegistry>,
    ) -> ReconciliationOutcome {
        let mut rows = Vec::with_capacity(summaries.len());
        let mut excluded = Vec::new();

        for summary in summaries {
            let Some(claim) = claims.get(&summary.name) else {
                excluded.push(summary.name.clone());
                continue;
            };

            rows.push(ReportRow {
                name: summary.name.clone(),
                date_of_birth: claim.date_of_birth.clone(),
                claim_id: claim.claim_id.clone(),
                claim_until: claim.claim_until.clone(),
                term_pattern_label: summary.term_pattern_label.clone(),
                total_value: summary.total_value,
                per_month_value: summary.per_month_value.clone(),
                child_id: registry.and_then(|r| r.lookup(&summary.name)).map(str::to_string),
            });
        }

        let corrections = registry.and_then(|registry| correction_request(&rows, registry));

        let outcome = ReconciliationOutcome {
            rows,
            excluded,
            corrections,
        };

        if !outcome.excluded.is_empty() {
            info!(
                children = ?outcome.excluded,
                "children without a confirmed claim left out of the report"
            );
        }
        info!("{}", outcome.summary());

        outcome
    }
}

fn correction_request(rows: &[ReportRow], registry: &ChildRegistry) -> Option<CorrectionRequest> {
    let unmatched: BTreeSet<String> = rows
        .iter()
        .filter(|row| row.child_id.is_none())
        .map(|row| row.name.clone())
        .collect();

    if unmatched.is_empty() {
        return None;
    }

    let matched: HashSet<&str> = rows
        .iter()
        .filter(|row| row.child_id.is_some())
        .map(|row| row.name.as_str())
        .collect();

    let possible_matches = registry
        .rows()
        .iter()
        .filter(|entry| !matched.contains(entry.full_name.as_str()))
        .cloned()
        .collect();

    Some(CorrectionRequest {
        unmatched: unmatched.into_iter().collect(),
        possible_matches,
    })
}

/// Fill child ids from manual matches; returns how many rows were updated
pub fn apply_matches(rows: &mut [ReportRow], matches: &[ManualMatch]) -> usize {
    let by_name: HashMap<&str, &str> = matches
        .iter()
        .map(|m| (m.name.as_str(), m.id.as_str()))
        .collect();

    let mut applied = 0;
    for row in rows.iter_mut() {
        if let Some(id) = by_name.get(row.name.as_str()) {
            row.child_id = Some(id.to_string());
            applied += 1;
        }
    }

    applied
}

// ============================================================================
// TESTS
// ============================================================================
