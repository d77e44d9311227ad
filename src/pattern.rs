// 🔁 Term Pattern Inference
//
// A child's funded hours usually alternate between a term-time and a
// holiday-time allocation. Given every distinct weekly-hour value seen in the
// funding year, produce a short label:
//
//   {15}          → "15"            constant
//   {6, 15}       → "6/15"          term/non-term pair
//   {6, 15, 20}   → "6/15"          leftover 20 dropped
//   {10, 12, 15}  → "10-12-15"      irregular, no recognised pair
//
// Pairing is greedy over the ascending list, not a maximum matching. The
// output for ambiguous inputs depends on that order and must stay that way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Differences between a term-time and a holiday-time allocation
pub const TERM_HOLIDAY_DIFFERENCES: [i64; 3] = [9, 12, 15];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermPattern {
    /// A single weekly-hours value all year
    Constant(i64),

    /// One or more (lower, higher) pairs; unpaired values are not kept
    TermPairs(Vec<(i64, i64)>),

    /// No two values differ by a recognised amount
    Irregular(Vec<i64>),
}

impl TermPattern {
    /// Classify a set of weekly-hour values (order and duplicates don't matter)
    pub fn infer<I>(hours: I) -> Option<TermPattern>
    where
        I: IntoIterator<Item = i64>,
    {
        let distinct: Vec<i64> = hours
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        match distinct.as_slice() {
            [] => None,
            [only] => Some(TermPattern::Constant(*only)),
            _ => {
                let pairs = greedy_pairs(&distinct);
                if pairs.is_empty() {
                    Some(TermPattern::Irregular(distinct))
                } else {
                    Some(TermPattern::TermPairs(pairs))
                }
            }
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermPattern::Constant(hours) => write!(f, "{}", hours),
            TermPattern::TermPairs(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(lower, higher)| format!("{}/{}", lower, higher))
                    .collect();
                write!(f, "{}", rendered.join(", "))
            }
            TermPattern::Irregular(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", rendered.join("-"))
            }
        }
    }
}

/// Pair ascending values whose gap is a recognised term/holiday difference.
///
/// For each i in order, every later j is tried in order; a pair forms only
/// when neither side has been used yet.
fn greedy_pairs(sorted: &[i64]) -> Vec<(i64, i64)> {
    let mut used = vec![false; sorted.len()];
    let mut pairs = Vec::new();

    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            if used[i] || used[j] {
                continue;
            }
            let gap = (sorted[j] - sorted[i]).abs();
            if TERM_HOLIDAY_DIFFERENCES.contains(&gap) {
                pairs.push((sorted[i], sorted[j]));
                used[i] = true;
                used[j] = true;
            }
        }
    }

    pairs
}

/// Label for a child's weekly hours; empty input gives an empty label
pub fn infer_term_pattern<I>(hours: I) -> String
where
    I: IntoIterator<Item = i64>,
{
    TermPattern::infer(hours)
        .map(|pattern| pattern.label())
        .unwrap_or_default()
}
