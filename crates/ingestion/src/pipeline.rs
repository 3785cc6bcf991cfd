//! Import pipeline
//!
//! Rows are processed strictly in source order. Each surviving row runs in
//! its own transaction: reference resolution, the project upsert and the
//! membership replacement commit together or not at all. A failing row is
//! recorded and skipped; only source-level problems end a run early.

use crate::errors::IngestionError;
use crate::normalizer::normalize;
use crate::report::{ImportReport, RowError};
use crate::source::{RawRow, SourceRecord, TabularSource};
use aidboard_common::db::upsert::{
    delete_all_projects, write_project, ProjectFields, ProjectLinks, WriteAction, WriteMode,
    WriteOutcome,
};
use aidboard_common::db::DbPool;
use aidboard_common::metrics;
use sea_orm::TransactionTrait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Run-level switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Delete every project (not reference entities) before importing
    pub clear_existing: bool,
}

/// Bulk importer bound to a database pool
#[derive(Clone)]
pub struct ImportPipeline {
    pool: DbPool,
}

impl ImportPipeline {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open and validate `path`, then import it
    #[instrument(skip(self, options), fields(path = %path.display()))]
    pub async fn import_path(
        &self,
        path: &Path,
        sheet: Option<&str>,
        options: ImportOptions,
    ) -> Result<ImportReport, IngestionError> {
        let owned_path: PathBuf = path.to_path_buf();
        let owned_sheet = sheet.map(str::to_string);

        // File parsing is blocking work
        let source = tokio::task::spawn_blocking(move || {
            TabularSource::open(&owned_path, owned_sheet.as_deref())
        })
        .await
        .map_err(|e| IngestionError::SourceUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })??;

        self.import_source(source, options).await
    }

    /// Import an already validated source
    pub async fn import_source(
        &self,
        source: TabularSource,
        options: ImportOptions,
    ) -> Result<ImportReport, IngestionError> {
        let start = Instant::now();
        let mut report = ImportReport::default();

        if options.clear_existing {
            report.cleared = delete_all_projects(self.pool.write()).await?;
            warn!(removed = report.cleared, "Cleared existing projects before import");
        }

        info!(rows = source.len(), "Importing rows");

        for record in source.into_records() {
            match record {
                SourceRecord::Row(raw) => self.import_row(&raw, &mut report).await,
                SourceRecord::Unreadable { number, message } => {
                    warn!(row = number, error = %message, "Skipping undecodable row");
                    report.skipped += 1;
                    report.errors.push(RowError::error(
                        number,
                        "row",
                        "",
                        format!("could not decode record: {}", message),
                    ));
                    metrics::record_import_row("skipped");
                }
            }
        }

        metrics::record_import_run(start.elapsed().as_secs_f64());

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            new_references = report.created_references.total(),
            problems = report.errors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Import finished"
        );

        Ok(report)
    }

    async fn import_row(&self, raw: &RawRow, report: &mut ImportReport) {
        let (normalized, field_errors) = normalize(raw);
        let number = normalized.number;
        report.errors.extend(field_errors);

        let Some((fields, links)) = normalized.into_write() else {
            warn!(row = number, "Skipping row without title");
            report.skipped += 1;
            metrics::record_import_row("skipped");
            return;
        };

        match self.write_row(fields, links).await {
            Ok(outcome) => {
                let label = match outcome.action {
                    WriteAction::Created => {
                        report.created += 1;
                        "created"
                    }
                    WriteAction::Updated => {
                        report.updated += 1;
                        "updated"
                    }
                };
                metrics::record_import_row(label);

                for kind in outcome.created_references {
                    report.created_references.record(kind);
                    metrics::record_reference_created(kind.label());
                }

                debug!(row = number, project_id = %outcome.project_id, action = label, "Row imported");
            }
            Err(e) => {
                warn!(row = number, error = %e, "Row failed; rolled back and skipped");
                report.skipped += 1;
                report.errors.push(RowError::error(
                    number,
                    "row",
                    "",
                    format!("could not be saved: {}", e),
                ));
                metrics::record_import_row("skipped");
            }
        }
    }

    async fn write_row(
        &self,
        fields: ProjectFields,
        links: ProjectLinks,
    ) -> aidboard_common::Result<WriteOutcome> {
        let txn = self.pool.write().begin().await?;
        let outcome = write_project(&txn, WriteMode::Upsert, fields, &links).await?;
        txn.commit().await?;
        Ok(outcome)
    }
}
