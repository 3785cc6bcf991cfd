//! Import report types

use aidboard_common::db::resolver::ReferenceKind;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One problem found while importing a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based data row; the header row is not counted
    pub row: usize,
    pub field: String,
    /// Raw cell text, empty when the problem is not tied to a value
    pub value: String,
    pub reason: String,
    pub severity: Severity,
}

impl RowError {
    pub fn error(row: usize, field: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            row,
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(row: usize, field: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(row, field, value, reason)
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "Row {} [{}]: {}", self.row, self.field, self.reason)
        } else {
            write!(f, "Row {} [{}] '{}': {}", self.row, self.field, self.value, self.reason)
        }
    }
}

/// Reference entities created during a run, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceCounts {
    pub countries: u64,
    pub org_units: u64,
    pub themes: u64,
    pub donors: u64,
}

impl ReferenceCounts {
    pub fn record(&mut self, kind: ReferenceKind) {
        match kind {
            ReferenceKind::Country => self.countries += 1,
            ReferenceKind::OrgUnit => self.org_units += 1,
            ReferenceKind::Theme => self.themes += 1,
            ReferenceKind::Donor => self.donors += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.countries + self.org_units + self.themes + self.donors
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Projects removed before processing when clearing was requested
    pub cleared: u64,
    pub created_references: ReferenceCounts,
    /// Errors and warnings in source order
    pub errors: Vec<RowError>,
}

impl ImportReport {
    /// Rows read from the source
    pub fn rows_processed(&self) -> u64 {
        self.created + self.updated + self.skipped
    }

    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_warning()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_warning()).count()
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Import Summary ---")?;
        if self.cleared > 0 {
            writeln!(f, "Cleared {} existing projects", self.cleared)?;
        }
        writeln!(f, "Created: {}", self.created)?;
        writeln!(f, "Updated: {}", self.updated)?;
        writeln!(f, "Skipped: {}", self.skipped)?;
        writeln!(
            f,
            "New references: {} countries, {} org units, {} themes, {} donors",
            self.created_references.countries,
            self.created_references.org_units,
            self.created_references.themes,
            self.created_references.donors
        )?;

        if !self.errors.is_empty() {
            writeln!(
                f,
                "--- Problems ({} errors, {} warnings) ---",
                self.error_count(),
                self.warning_count()
            )?;
            for error in &self.errors {
                writeln!(f, "{}", error)?;
            }
        }

        Ok(())
    }
}
