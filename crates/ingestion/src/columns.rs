//! Source column catalogue

pub const TITLE: &str = "Project Title";
pub const EXTERNAL_ID: &str = "ProjectID";
pub const PAAS_CODE: &str = "PAAS Code";
pub const STATUS: &str = "Approval Status";
pub const FUND: &str = "Fund";
pub const COUNTRY: &str = "Country(ies)";
pub const ORG_UNIT: &str = "Lead Org Unit";
pub const THEMES: &str = "Theme(s)";
pub const DONORS: &str = "Donor(s)";
pub const START_DATE: &str = "Start Date";
pub const END_DATE: &str = "End Date";
pub const PAG_VALUE: &str = "PAG Value";
pub const TOTAL_EXPENDITURE: &str = "Total Expenditure";
pub const TOTAL_CONTRIBUTION: &str = "Total Contribution";
/// Derived in the source workbook; read for header validation, never imported
pub const CONTRIBUTION_EXPENDITURE_DIFF: &str = "Total Contribution - Total Expenditure";
pub const TOTAL_PSC: &str = "Total PSC";

pub const APPROVAL_DATE: &str = "Approval Date";
pub const BUDGET_AMOUNT: &str = "Budget Amount";

/// Headers every source must carry
pub const REQUIRED_HEADERS: [&str; 16] = [
    TITLE,
    EXTERNAL_ID,
    PAAS_CODE,
    STATUS,
    FUND,
    COUNTRY,
    ORG_UNIT,
    THEMES,
    DONORS,
    START_DATE,
    END_DATE,
    PAG_VALUE,
    TOTAL_EXPENDITURE,
    TOTAL_CONTRIBUTION,
    CONTRIBUTION_EXPENDITURE_DIFF,
    TOTAL_PSC,
];

/// Imported when present
pub const OPTIONAL_HEADERS: [&str; 2] = [APPROVAL_DATE, BUDGET_AMOUNT];

/// Required headers absent from `headers`, in catalogue order
pub fn missing_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    REQUIRED_HEADERS
        .iter()
        .filter(|required| !headers.iter().any(|h| h.as_ref() == **required))
        .map(|required| required.to_string())
        .collect()
}

/// Normalize a raw header cell: trim, drop a UTF-8 byte-order mark
pub fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}
