//! Command-line arguments for the `import` binary

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "import",
    version,
    about = "Import development-aid projects from a CSV or spreadsheet export"
)]
pub struct ImportArgs {
    /// Source file (.csv, .xlsx, .xls, .xlsm, .ods)
    pub path: PathBuf,

    /// Delete all existing projects before importing
    #[arg(long)]
    pub clear: bool,

    /// Worksheet name or zero-based index; defaults to the first sheet
    #[arg(long)]
    pub sheet: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file; environment variables still override it
    #[arg(long, short = 'c')]
    pub config: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = ImportArgs::try_parse_from(["import", "projects.xlsx"]).unwrap();
        assert_eq!(args.path, PathBuf::from("projects.xlsx"));
        assert!(!args.clear);
        assert!(!args.json);
        assert!(args.sheet.is_none());
    }

    #[test]
    fn test_parse_all_flags() {
        let args = ImportArgs::try_parse_from([
            "import",
            "data.csv",
            "--clear",
            "--json",
            "--sheet",
            "Projects",
            "-c",
            "config/production",
        ])
        .unwrap();
        assert!(args.clear);
        assert!(args.json);
        assert_eq!(args.sheet.as_deref(), Some("Projects"));
        assert_eq!(args.config.as_deref(), Some("config/production"));
    }

    #[test]
    fn test_path_required() {
        assert!(ImportArgs::try_parse_from(["import"]).is_err());
    }
}
