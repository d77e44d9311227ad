// 🏷️ Description Parser - "<hours> hours x €<rate>"
//
// The allocation description is the only free-text field in the funding
// export, so it is matched against a strict grammar. Anything that does not
// match aborts the batch: a bad description means upstream corruption.

use crate::error::{FundingError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

lazy_static! {
    /// Format: `15 hours x €4.80`, `15.0 Hours X €4.80`, `1 hour x 4.80`
    static ref DESCRIPTION_REGEX: Regex = Regex::new(
        r"^\s*(?P<hours>\d+(?:\.\d+)?)\s+(?i:hours?)\s+(?i:x)\s+€?\s*(?P<rate>\d+(?:\.\d+)?)\s*$"
    )
    .expect("Invalid regex pattern");
}

/// Hours and hourly rate carried by one allocation description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDescription {
    pub weekly_hours: i64,
    pub hourly_rate: Decimal,
}

/// Parse an allocation description into (weekly hours, hourly rate)
///
/// Hours go through a float and are truncated, never rounded:
/// `"15.9 hours x €4.80"` yields 15.
pub fn parse_allocation_description(description: &str) -> Result<ParsedDescription> {
    let malformed = || FundingError::MalformedDescription {
        description: description.to_string(),
    };

    let caps = DESCRIPTION_REGEX.captures(description).ok_or_else(malformed)?;

    let hours: f64 = caps["hours"].parse().map_err(|_| malformed())?;
    let hourly_rate = Decimal::from_str(&caps["rate"]).map_err(|_| malformed())?;

    Ok(ParsedDescription {
        weekly_hours: hours.trunc() as i64,
        hourly_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_whole_hours() {
        let parsed = parse_allocation_description("15 hours x €4.80").unwrap();
        assert_eq!(parsed.weekly_hours, 15);
        assert_eq!(parsed.hourly_rate, dec!(4.80));
    }

    #[test]
    fn test_parse_fractional_hours_truncates() {
        let parsed = parse_allocation_description("15.0 hours x €4.80").unwrap();
        assert_eq!(parsed.weekly_hours, 15);

        let parsed = parse_allocation_description("22.9 hours x €5").unwrap();
        assert_eq!(parsed.weekly_hours, 22);
        assert_eq!(parsed.hourly_rate, dec!(5));
    }

    #[test]
    fn test_parse_tolerates_missing_euro_sign_and_padding() {
        let parsed = parse_allocation_description("  6 hours x 4.5 ").unwrap();
        assert_eq!(parsed.weekly_hours, 6);
        assert_eq!(parsed.hourly_rate, dec!(4.5));

        let parsed = parse_allocation_description("1 hour x €4.80").unwrap();
        assert_eq!(parsed.weekly_hours, 1);
    }

    #[test]
    fn test_parse_ignores_keyword_case() {
        let parsed = parse_allocation_description("15 Hours x €4.80").unwrap();
        assert_eq!(parsed.weekly_hours, 15);
        assert_eq!(parsed.hourly_rate, dec!(4.80));

        let parsed = parse_allocation_description("6 HOURS X €4.80").unwrap();
        assert_eq!(parsed.weekly_hours, 6);
    }

    #[test]
    fn test_parse_missing_separator_fails() {
        let err = parse_allocation_description("15 hours at €4.80").unwrap_err();
        assert!(matches!(err, FundingError::MalformedDescription { .. }));
    }

    #[test]
    fn test_parse_non_numeric_tokens_fail() {
        for text in ["fifteen hours x €4.80", "15 hours x €abc", "", "15 hours x €", "-3 hours x €4"] {
            let result = parse_allocation_description(text);
            assert!(result.is_err(), "{:?} should be rejected", text);
        }
    }
}
