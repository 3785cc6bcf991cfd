//! Row normalization
//!
//! Turns raw cell text into typed project fields. Malformed values never
//! abort a row: the field is left absent and a [`RowError`] is recorded.

use crate::columns;
use crate::report::RowError;
use crate::source::RawRow;
use aidboard_common::db::models::ProjectStatus;
use aidboard_common::db::upsert::{ProjectFields, ProjectLinks};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Currency symbols removed before parsing amounts
const CURRENCY_SYMBOLS: [char; 5] = ['$', '€', '£', '¥', '₹'];

/// Largest magnitude a DECIMAL(15,2) column holds
const MAX_INTEGER_DIGITS: u32 = 13;

/// Typed fields of one source row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow {
    pub number: usize,
    pub title: Option<String>,
    pub external_id: Option<String>,
    pub paas_code: Option<String>,
    pub status: ProjectStatus,
    pub fund: Option<String>,
    pub country: Option<String>,
    pub org_unit: Option<String>,
    pub themes: Vec<String>,
    pub donors: Vec<String>,
    pub approval_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_amount: Option<Decimal>,
    pub pag_value: Option<Decimal>,
    pub total_expenditure: Option<Decimal>,
    pub total_contribution: Option<Decimal>,
    pub total_psc: Option<Decimal>,
}

impl NormalizedRow {
    /// Split into write inputs; `None` when the row has no title
    pub fn into_write(self) -> Option<(ProjectFields, ProjectLinks)> {
        let title = self.title?;

        let fields = ProjectFields {
            title,
            external_id: self.external_id,
            paas_code: self.paas_code,
            status: self.status,
            fund: self.fund,
            approval_date: self.approval_date,
            start_date: self.start_date,
            end_date: self.end_date,
            budget_amount: self.budget_amount,
            pag_value: self.pag_value,
            total_expenditure: self.total_expenditure,
            total_contribution: self.total_contribution,
            total_psc: self.total_psc,
        };

        let links = ProjectLinks {
            country: self.country,
            org_unit: self.org_unit,
            themes: self.themes,
            donors: self.donors,
        };

        Some((fields, links))
    }
}

/// Normalize one raw row, collecting every field problem
pub fn normalize(row: &RawRow) -> (NormalizedRow, Vec<RowError>) {
    let number = row.number;
    let mut errors = Vec::new();

    let title = text(row.get(columns::TITLE));
    if title.is_none() {
        errors.push(RowError::error(number, "title", "", "title is required; row skipped"));
    }

    let raw_status = row.get(columns::STATUS);
    let status = if raw_status.is_empty() {
        ProjectStatus::default()
    } else {
        ProjectStatus::from_label(raw_status).unwrap_or_else(|| {
            errors.push(RowError::warning(
                number,
                "status",
                raw_status,
                format!(
                    "unrecognized status; stored as {} (valid: {})",
                    ProjectStatus::default(),
                    ProjectStatus::valid_labels()
                ),
            ));
            ProjectStatus::default()
        })
    };

    let mut date = |field: &str, header: &str| {
        let raw = row.get(header);
        parse_date(raw).unwrap_or_else(|reason| {
            errors.push(RowError::error(number, field, raw, reason));
            None
        })
    };
    let approval_date = date("approval_date", columns::APPROVAL_DATE);
    let start_date = date("start_date", columns::START_DATE);
    let mut end_date = date("end_date", columns::END_DATE);

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            errors.push(RowError::error(
                number,
                "end_date",
                row.get(columns::END_DATE),
                format!("end date is before start date {}", start.format(DATE_FORMAT)),
            ));
            end_date = None;
        }
    }

    let mut money = |field: &str, header: &str| {
        let raw = row.get(header);
        parse_money(raw).unwrap_or_else(|reason| {
            errors.push(RowError::error(number, field, raw, reason));
            None
        })
    };
    let budget_amount = money("budget_amount", columns::BUDGET_AMOUNT);
    let pag_value = money("pag_value", columns::PAG_VALUE);
    let total_expenditure = money("total_expenditure", columns::TOTAL_EXPENDITURE);
    let total_contribution = money("total_contribution", columns::TOTAL_CONTRIBUTION);
    let total_psc = money("total_psc", columns::TOTAL_PSC);

    let normalized = NormalizedRow {
        number,
        title,
        external_id: text(row.get(columns::EXTERNAL_ID)),
        paas_code: text(row.get(columns::PAAS_CODE)),
        status,
        fund: text(row.get(columns::FUND)),
        country: text(row.get(columns::COUNTRY)),
        org_unit: text(row.get(columns::ORG_UNIT)),
        themes: split_multi(row.get(columns::THEMES)),
        donors: split_multi(row.get(columns::DONORS)),
        approval_date,
        start_date,
        end_date,
        budget_amount,
        pag_value,
        total_expenditure,
        total_contribution,
        total_psc,
    };

    (normalized, errors)
}

/// Trimmed text, `None` when blank
pub fn text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse `YYYY-MM-DD`; blank is `Ok(None)`
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return Err("expected date in YYYY-MM-DD format".to_string());
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(Some)
        .map_err(|_| "not a valid calendar date".to_string())
}

/// Parse a monetary amount, rounded to cents; blank is `Ok(None)`
pub fn parse_money(raw: &str) -> Result<Option<Decimal>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err("invalid amount".to_string());
    }

    let value = Decimal::from_str(&cleaned)
        .map_err(|_| "invalid amount".to_string())?
        .round_dp(2);

    if value.abs() >= Decimal::from(10_i64.pow(MAX_INTEGER_DIGITS)) {
        return Err(format!(
            "amount out of range (at most {} digits before the decimal point)",
            MAX_INTEGER_DIGITS
        ));
    }

    Ok(Some(value))
}

/// Split a comma-separated list, dropping blanks and case-insensitive
/// repeats; the first spelling of each name is kept
pub fn split_multi(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| seen.insert(token.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use std::collections::HashMap;

    fn row(cells: &[(&str, &str)]) -> RawRow {
        let map: HashMap<String, String> = cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRow::new(3, map)
    }

    #[test]
    fn test_text() {
        assert_eq!(text("  UNDP "), Some("UNDP".to_string()));
        assert_eq!(text("   "), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-03-01").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("  ").unwrap(), None);
        assert!(parse_date("2023/01/01").is_err());
        assert!(parse_date("2023-1-5").is_err());
        assert!(parse_date("01-03-2024").is_err());
        assert_eq!(parse_date("2023-02-30").unwrap_err(), "not a valid calendar date");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("$1,234.50").unwrap(), Some(Decimal::new(123450, 2)));
        assert_eq!(parse_money("€ 1 000").unwrap(), Some(Decimal::from(1000)));
        assert_eq!(parse_money("-25.005").unwrap(), Some(Decimal::new(-2500, 2)));
        assert_eq!(parse_money("").unwrap(), None);
        assert!(parse_money("abc").is_err());
        assert!(parse_money("$").is_err());
        assert!(parse_money("12345678901234").unwrap_err().contains("out of range"));
        assert!(parse_money("9999999999999.99").is_ok());
    }

    #[test]
    fn test_split_multi() {
        assert_eq!(
            split_multi("Health, Water,, health ,Education,WATER"),
            vec!["Health", "Water", "Education"]
        );
        assert!(split_multi(" , ").is_empty());
    }

    #[test]
    fn test_normalize_full_row() {
        let raw = row(&[
            (columns::TITLE, " Clean water "),
            (columns::EXTERNAL_ID, "P-1"),
            (columns::STATUS, "implemented"),
            (columns::COUNTRY, "Kenya"),
            (columns::THEMES, "Water, Health"),
            (columns::START_DATE, "2023-01-01"),
            (columns::END_DATE, "2024-12-31"),
            (columns::PAG_VALUE, "$1,000"),
            (columns::CONTRIBUTION_EXPENDITURE_DIFF, "not imported"),
        ]);

        let (normalized, errors) = normalize(&raw);
        assert!(errors.is_empty());
        assert_eq!(normalized.number, 3);
        assert_eq!(normalized.title.as_deref(), Some("Clean water"));
        assert_eq!(normalized.status, ProjectStatus::Implemented);
        assert_eq!(normalized.themes, vec!["Water", "Health"]);
        assert_eq!(normalized.pag_value, Some(Decimal::from(1000)));
        assert_eq!(normalized.org_unit, None);
    }

    #[test]
    fn test_normalize_bad_date_continues() {
        let raw = row(&[
            (columns::TITLE, "A"),
            (columns::START_DATE, "2023/01/01"),
            (columns::PAG_VALUE, "12"),
        ]);

        let (normalized, errors) = normalize(&raw);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "Row 3 [start_date] '2023/01/01': expected date in YYYY-MM-DD format"
        );
        assert_eq!(normalized.start_date, None);
        assert_eq!(normalized.pag_value, Some(Decimal::from(12)));
    }

    #[test]
    fn test_normalize_status_rules() {
        let (blank, errors) = normalize(&row(&[(columns::TITLE, "A")]));
        assert_eq!(blank.status, ProjectStatus::Approved);
        assert!(errors.is_empty());

        let (unknown, errors) = normalize(&row(&[(columns::TITLE, "A"), (columns::STATUS, "On hold")]));
        assert_eq!(unknown.status, ProjectStatus::Approved);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(errors[0].field, "status");
    }

    #[test]
    fn test_normalize_end_before_start() {
        let raw = row(&[
            (columns::TITLE, "A"),
            (columns::START_DATE, "2024-05-01"),
            (columns::END_DATE, "2024-04-01"),
        ]);

        let (normalized, errors) = normalize(&raw);
        assert_eq!(normalized.start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(normalized.end_date, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "end_date");
    }

    #[test]
    fn test_missing_title_rejects_row() {
        let (normalized, errors) = normalize(&row(&[(columns::TITLE, "  "), (columns::COUNTRY, "Kenya")]));
        assert_eq!(errors[0].field, "title");
        assert!(normalized.into_write().is_none());
    }

    #[test]
    fn test_into_write_splits_fields_and_links() {
        let (normalized, _) = normalize(&row(&[
            (columns::TITLE, "A"),
            (columns::DONORS, "UNDP, EU"),
            (columns::ORG_UNIT, "Africa Bureau"),
        ]));

        let (fields, links) = normalized.into_write().unwrap();
        assert_eq!(fields.title, "A");
        assert_eq!(links.donors, vec!["UNDP", "EU"]);
        assert_eq!(links.org_unit.as_deref(), Some("Africa Bureau"));
    }
}
