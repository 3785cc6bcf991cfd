//! Tabular sources
//!
//! A source is read completely and its headers validated before the
//! pipeline touches the database, so a bad file never follows a clear.

use crate::columns::{clean_header, missing_headers};
use crate::errors::IngestionError;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// File formats the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self, IngestionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(SourceFormat::Spreadsheet),
            _ => Err(IngestionError::UnsupportedFormat { extension }),
        }
    }
}

/// One data row, cells keyed by header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data row number
    pub number: usize,
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn new(number: usize, cells: HashMap<String, String>) -> Self {
        Self { number, cells }
    }

    /// Trimmed cell text; empty when the column or cell is absent
    pub fn get(&self, header: &str) -> &str {
        self.cells.get(header).map(|s| s.trim()).unwrap_or("")
    }
}

/// A row as read from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRecord {
    Row(RawRow),
    /// The record could not be decoded; the rest of the source is still usable
    Unreadable { number: usize, message: String },
}

impl SourceRecord {
    pub fn number(&self) -> usize {
        match self {
            SourceRecord::Row(row) => row.number,
            SourceRecord::Unreadable { number, .. } => *number,
        }
    }
}

/// A fully loaded, header-validated table
#[derive(Debug, Clone)]
pub struct TabularSource {
    headers: Vec<String>,
    records: Vec<SourceRecord>,
}

impl TabularSource {
    /// Open `path` as CSV or spreadsheet. `sheet` selects a worksheet by
    /// name or zero-based index and is ignored for CSV.
    pub fn open(path: &Path, sheet: Option<&str>) -> Result<Self, IngestionError> {
        if !path.exists() {
            return Err(IngestionError::SourceNotFound(path.display().to_string()));
        }

        let source = match SourceFormat::from_path(path)? {
            SourceFormat::Csv => {
                let file = std::fs::File::open(path).map_err(|e| IngestionError::SourceUnreadable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Self::from_csv_reader(file).map_err(|e| with_path(e, path))?
            }
            SourceFormat::Spreadsheet => Self::from_spreadsheet(path, sheet)?,
        };

        info!(
            path = %path.display(),
            rows = source.records.len(),
            "Source loaded"
        );
        Ok(source)
    }

    /// Read CSV from any reader. Short records read as blank cells.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, IngestionError> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| IngestionError::SourceUnreadable {
                path: "<csv>".to_string(),
                message: e.to_string(),
            })?
            .iter()
            .map(clean_header)
            .collect();

        check_headers(&headers)?;

        let mut records = Vec::new();
        for (index, result) in rdr.records().enumerate() {
            let number = index + 1;
            match result {
                Ok(record) => {
                    let cells = record.iter().map(str::to_string).collect();
                    records.push(SourceRecord::Row(build_row(number, &headers, cells)));
                }
                Err(e) if e.is_io_error() => {
                    return Err(IngestionError::SourceUnreadable {
                        path: "<csv>".to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    debug!(row = number, error = %e, "Undecodable CSV record");
                    records.push(SourceRecord::Unreadable {
                        number,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(Self { headers, records })
    }

    /// Build a source from already-split rows; the first row is the header
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Result<Self, IngestionError> {
        if rows.is_empty() {
            return Err(IngestionError::MissingHeaders(missing_headers::<String>(&[])));
        }

        let headers: Vec<String> = rows.remove(0).iter().map(|h| clean_header(h)).collect();
        check_headers(&headers)?;

        let records = rows
            .into_iter()
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(index, cells)| SourceRecord::Row(build_row(index + 1, &headers, cells)))
            .collect();

        Ok(Self { headers, records })
    }

    fn from_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<Self, IngestionError> {
        let unreadable = |message: String| IngestionError::SourceUnreadable {
            path: path.display().to_string(),
            message,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(e.to_string()))?;
        let names = workbook.sheet_names().to_vec();
        let name = select_sheet(&names, sheet)?;

        debug!(path = %path.display(), sheet = %name, "Reading worksheet");

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| unreadable(e.to_string()))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        Self::from_rows(rows).map_err(|e| with_path(e, path))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn check_headers(headers: &[String]) -> Result<(), IngestionError> {
    let missing = missing_headers(headers);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestionError::MissingHeaders(missing))
    }
}

fn build_row(number: usize, headers: &[String], cells: Vec<String>) -> RawRow {
    let mut map = HashMap::with_capacity(headers.len());
    let mut cells = cells.into_iter();
    for header in headers {
        let value = cells.next().unwrap_or_default();
        // Duplicate header names: the first column wins
        map.entry(header.clone()).or_insert(value);
    }
    RawRow::new(number, map)
}

fn with_path(error: IngestionError, path: &Path) -> IngestionError {
    match error {
        IngestionError::SourceUnreadable { message, .. } => IngestionError::SourceUnreadable {
            path: path.display().to_string(),
            message,
        },
        other => other,
    }
}

/// Resolve a sheet selector: exact name first, then zero-based index
fn select_sheet(names: &[String], selector: Option<&str>) -> Result<String, IngestionError> {
    let not_found = |sheet: &str| IngestionError::SheetNotFound {
        sheet: sheet.to_string(),
        available: names.join(", "),
    };

    match selector.map(str::trim) {
        None | Some("") => names.first().cloned().ok_or_else(|| not_found("0")),
        Some(wanted) => {
            if let Some(name) = names.iter().find(|n| n.as_str() == wanted) {
                return Ok(name.clone());
            }
            if wanted.chars().all(|c| c.is_ascii_digit()) {
                if let Some(name) = wanted.parse::<usize>().ok().and_then(|i| names.get(i)) {
                    return Ok(name.clone());
                }
            }
            Err(not_found(wanted))
        }
    }
}

/// Render a spreadsheet cell as the text a CSV export would hold
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_date() {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    }
}

fn render_float(value: f64) -> String {
    // Whole numbers come back from spreadsheets as floats; drop the ".0"
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
