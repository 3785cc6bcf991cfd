//! Repository pattern for database operations
//!
//! Read paths for projects and reference entities, plus the transactional
//! create/update/delete used by the HTTP API. Bulk import writes go
//! through [`crate::db::upsert`] directly so each row gets its own
//! transaction.

use crate::db::models::*;
use crate::db::resolver::{self, ReferenceKind};
use crate::db::upsert::{self, ProjectFields, ProjectLinks, WriteMode};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func, LikeExpr, Query};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// `{id, name}` view of a reference entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSummary {
    pub id: Uuid,
    pub name: String,
}

/// Optional filters for listing projects. Names match case-insensitively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<String>,
    pub country: Option<String>,
    pub org_unit: Option<String>,
    pub theme: Option<String>,
    pub donor: Option<String>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
}

/// Project with its references expanded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDetail {
    pub id: Uuid,
    pub title: String,
    pub external_id: Option<String>,
    pub paas_code: Option<String>,
    pub status: String,
    pub fund: Option<String>,
    pub country: Option<ReferenceSummary>,
    pub org_unit: Option<ReferenceSummary>,
    pub themes: Vec<ReferenceSummary>,
    pub donors: Vec<ReferenceSummary>,
    pub approval_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_amount: Option<Decimal>,
    pub pag_value: Option<Decimal>,
    pub total_expenditure: Option<Decimal>,
    pub total_contribution: Option<Decimal>,
    pub total_psc: Option<Decimal>,
    pub total_contribution_expenditure_diff: Option<Decimal>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    pub updated_at: chrono::DateTime<chrono::FixedOffset>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Project Reads
    // ========================================================================

    /// List projects, newest first, narrowed by `filter`
    pub async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectDetail>> {
        let conn = self.read_conn();
        let mut condition = Condition::all();

        if let Some(status) = non_blank(&filter.status) {
            condition = condition.add(ProjectColumn::Status.eq(parse_status(status)?.label()));
        }

        // An unknown reference name cannot match any project
        if let Some(name) = non_blank(&filter.country) {
            match resolver::find_id(conn, ReferenceKind::Country, name).await? {
                Some(id) => condition = condition.add(ProjectColumn::CountryId.eq(id)),
                None => return Ok(Vec::new()),
            }
        }

        if let Some(name) = non_blank(&filter.org_unit) {
            match resolver::find_id(conn, ReferenceKind::OrgUnit, name).await? {
                Some(id) => condition = condition.add(ProjectColumn::OrgUnitId.eq(id)),
                None => return Ok(Vec::new()),
            }
        }

        if let Some(name) = non_blank(&filter.theme) {
            let Some(theme_id) = resolver::find_id(conn, ReferenceKind::Theme, name).await? else {
                return Ok(Vec::new());
            };
            condition = condition.add(
                ProjectColumn::Id.in_subquery(
                    Query::select()
                        .column(ProjectThemeColumn::ProjectId)
                        .from(ProjectThemeEntity)
                        .and_where(ProjectThemeColumn::ThemeId.eq(theme_id))
                        .to_owned(),
                ),
            );
        }

        if let Some(name) = non_blank(&filter.donor) {
            let Some(donor_id) = resolver::find_id(conn, ReferenceKind::Donor, name).await? else {
                return Ok(Vec::new());
            };
            condition = condition.add(
                ProjectColumn::Id.in_subquery(
                    Query::select()
                        .column(ProjectDonorColumn::ProjectId)
                        .from(ProjectDonorEntity)
                        .and_where(ProjectDonorColumn::DonorId.eq(donor_id))
                        .to_owned(),
                ),
            );
        }

        if let Some(search) = non_blank(&filter.search) {
            let pattern = LikeExpr::new(contains_pattern(&search.to_lowercase())).escape('\\');
            condition = condition.add(
                Expr::expr(Func::lower(Expr::col((ProjectEntity, ProjectColumn::Title)))).like(pattern),
            );
        }

        let projects = ProjectEntity::find()
            .filter(condition)
            .order_by_desc(ProjectColumn::CreatedAt)
            .order_by_asc(ProjectColumn::Title)
            .all(conn)
            .await?;

        self.expand(projects).await
    }

    /// Projects located in the named country
    pub async fn projects_by_country(&self, name: &str) -> Result<Vec<ProjectDetail>> {
        let country_id = resolver::find_id(self.read_conn(), ReferenceKind::Country, name)
            .await?
            .ok_or_else(|| AppError::CountryNotFound {
                name: name.trim().to_string(),
            })?;

        let projects = ProjectEntity::find()
            .filter(ProjectColumn::CountryId.eq(country_id))
            .order_by_desc(ProjectColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        self.expand(projects).await
    }

    /// Projects with the given status label or key
    pub async fn projects_by_status(&self, status: &str) -> Result<Vec<ProjectDetail>> {
        let status = parse_status(status)?;

        let projects = ProjectEntity::find()
            .filter(ProjectColumn::Status.eq(status.label()))
            .order_by_desc(ProjectColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        self.expand(projects).await
    }

    pub async fn get_project(&self, id: Uuid) -> Result<ProjectDetail> {
        self.get_project_on(self.read_conn(), id).await
    }

    async fn get_project_on(&self, conn: &DatabaseConnection, id: Uuid) -> Result<ProjectDetail> {
        let project = ProjectEntity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound { id: id.to_string() })?;

        let mut details = expand_on(conn, vec![project]).await?;
        details.pop().ok_or_else(|| AppError::Internal {
            message: format!("Project {} could not be expanded", id),
        })
    }

    async fn expand(&self, projects: Vec<Project>) -> Result<Vec<ProjectDetail>> {
        expand_on(self.read_conn(), projects).await
    }

    // ========================================================================
    // Project Writes
    // ========================================================================

    /// Create a project, resolving its references by name
    pub async fn create_project(&self, fields: ProjectFields, links: ProjectLinks) -> Result<ProjectDetail> {
        self.write(WriteMode::Create, fields, links).await
    }

    /// Replace every field and membership of an existing project
    pub async fn update_project(
        &self,
        id: Uuid,
        fields: ProjectFields,
        links: ProjectLinks,
    ) -> Result<ProjectDetail> {
        self.write(WriteMode::Replace(id), fields, links).await
    }

    async fn write(&self, mode: WriteMode, fields: ProjectFields, links: ProjectLinks) -> Result<ProjectDetail> {
        check_fields(&fields)?;

        let txn = self.write_conn().begin().await?;
        let outcome = upsert::write_project(&txn, mode, fields, &links).await?;
        txn.commit().await?;

        for kind in &outcome.created_references {
            metrics::record_reference_created(kind.label());
        }

        tracing::info!(
            project_id = %outcome.project_id,
            action = ?outcome.action,
            "Project saved"
        );

        // Read back from the primary so a lagging replica cannot 404
        self.get_project_on(self.write_conn(), outcome.project_id).await
    }

    /// Delete a project and its memberships
    pub async fn delete_project(&self, id: Uuid) -> Result<()> {
        let txn = self.write_conn().begin().await?;
        let deleted = upsert::delete_project(&txn, id).await?;
        txn.commit().await?;

        if !deleted {
            return Err(AppError::ProjectNotFound { id: id.to_string() });
        }

        tracing::info!(project_id = %id, "Project deleted");
        Ok(())
    }

    // ========================================================================
    // Reference Entities
    // ========================================================================

    /// All entities of `kind`, sorted by name
    pub async fn list_references(&self, kind: ReferenceKind) -> Result<Vec<ReferenceSummary>> {
        let conn = self.read_conn();

        let mut summaries: Vec<ReferenceSummary> = match kind {
            ReferenceKind::Country => CountryEntity::find()
                .all(conn)
                .await?
                .into_iter()
                .map(|m| ReferenceSummary { id: m.id, name: m.name })
                .collect(),
            ReferenceKind::OrgUnit => OrgUnitEntity::find()
                .all(conn)
                .await?
                .into_iter()
                .map(|m| ReferenceSummary { id: m.id, name: m.name })
                .collect(),
            ReferenceKind::Theme => ThemeEntity::find()
                .all(conn)
                .await?
                .into_iter()
                .map(|m| ReferenceSummary { id: m.id, name: m.name })
                .collect(),
            ReferenceKind::Donor => DonorEntity::find()
                .all(conn)
                .await?
                .into_iter()
                .map(|m| ReferenceSummary { id: m.id, name: m.name })
                .collect(),
        };

        sort_by_name(&mut summaries);
        Ok(summaries)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_status(input: &str) -> Result<ProjectStatus> {
    ProjectStatus::from_label(input).ok_or_else(|| AppError::Validation {
        message: format!(
            "Unknown status '{}'. Valid statuses: {}",
            input.trim(),
            ProjectStatus::valid_labels()
        ),
        field: Some("status".to_string()),
    })
}

fn check_fields(fields: &ProjectFields) -> Result<()> {
    if fields.title.trim().is_empty() {
        return Err(AppError::MissingField {
            field: "title".to_string(),
        });
    }

    if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
        if end < start {
            return Err(AppError::Validation {
                message: "end_date must not be before start_date".to_string(),
                field: Some("end_date".to_string()),
            });
        }
    }

    Ok(())
}

fn sort_by_name(items: &mut [ReferenceSummary]) {
    items.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Attach countries, org units, themes and donors to `projects` with one
/// query per table.
async fn expand_on(conn: &DatabaseConnection, projects: Vec<Project>) -> Result<Vec<ProjectDetail>> {
    if projects.is_empty() {
        return Ok(Vec::new());
    }

    let project_ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
    let country_ids: Vec<Uuid> = projects.iter().filter_map(|p| p.country_id).collect();
    let org_unit_ids: Vec<Uuid> = projects.iter().filter_map(|p| p.org_unit_id).collect();

    let countries: HashMap<Uuid, ReferenceSummary> = if country_ids.is_empty() {
        HashMap::new()
    } else {
        CountryEntity::find()
            .filter(CountryColumn::Id.is_in(country_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, ReferenceSummary { id: m.id, name: m.name }))
            .collect()
    };

    let org_units: HashMap<Uuid, ReferenceSummary> = if org_unit_ids.is_empty() {
        HashMap::new()
    } else {
        OrgUnitEntity::find()
            .filter(OrgUnitColumn::Id.is_in(org_unit_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, ReferenceSummary { id: m.id, name: m.name }))
            .collect()
    };

    let theme_links = ProjectThemeEntity::find()
        .filter(ProjectThemeColumn::ProjectId.is_in(project_ids.clone()))
        .all(conn)
        .await?;
    let theme_names: HashMap<Uuid, String> = if theme_links.is_empty() {
        HashMap::new()
    } else {
        ThemeEntity::find()
            .filter(ThemeColumn::Id.is_in(theme_links.iter().map(|l| l.theme_id).collect::<Vec<_>>()))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect()
    };

    let donor_links = ProjectDonorEntity::find()
        .filter(ProjectDonorColumn::ProjectId.is_in(project_ids))
        .all(conn)
        .await?;
    let donor_names: HashMap<Uuid, String> = if donor_links.is_empty() {
        HashMap::new()
    } else {
        DonorEntity::find()
            .filter(DonorColumn::Id.is_in(donor_links.iter().map(|l| l.donor_id).collect::<Vec<_>>()))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect()
    };

    let mut themes_by_project: HashMap<Uuid, Vec<ReferenceSummary>> = HashMap::new();
    for link in theme_links {
        if let Some(name) = theme_names.get(&link.theme_id) {
            themes_by_project.entry(link.project_id).or_default().push(ReferenceSummary {
                id: link.theme_id,
                name: name.clone(),
            });
        }
    }

    let mut donors_by_project: HashMap<Uuid, Vec<ReferenceSummary>> = HashMap::new();
    for link in donor_links {
        if let Some(name) = donor_names.get(&link.donor_id) {
            donors_by_project.entry(link.project_id).or_default().push(ReferenceSummary {
                id: link.donor_id,
                name: name.clone(),
            });
        }
    }

    let details = projects
        .into_iter()
        .map(|project| {
            let mut themes = themes_by_project.remove(&project.id).unwrap_or_default();
            let mut donors = donors_by_project.remove(&project.id).unwrap_or_default();
            sort_by_name(&mut themes);
            sort_by_name(&mut donors);

            let diff = project.contribution_expenditure_diff();

            ProjectDetail {
                country: project.country_id.and_then(|id| countries.get(&id).cloned()),
                org_unit: project.org_unit_id.and_then(|id| org_units.get(&id).cloned()),
                themes,
                donors,
                total_contribution_expenditure_diff: diff,
                id: project.id,
                title: project.title,
                external_id: project.external_id,
                paas_code: project.paas_code,
                status: project.status,
                fund: project.fund,
                approval_date: project.approval_date,
                start_date: project.start_date,
                end_date: project.end_date,
                budget_amount: project.budget_amount,
                pag_value: project.pag_value,
                total_expenditure: project.total_expenditure,
                total_contribution: project.total_contribution,
                total_psc: project.total_psc,
                created_at: project.created_at,
                updated_at: project.updated_at,
            }
        })
        .collect();

    Ok(details)
}

/// `%text%` with LIKE wildcards in `text` matched literally
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;

    async fn setup() -> Repository {
        let pool = DbPool::connect_url("sqlite::memory:").await.unwrap();
        ensure_schema(pool.write()).await.unwrap();
        Repository::new(pool)
    }

    fn fields(title: &str, status: ProjectStatus) -> ProjectFields {
        ProjectFields {
            title: title.to_string(),
            status,
            ..Default::default()
        }
    }

    fn links(country: &str, themes: &[&str], donors: &[&str]) -> ProjectLinks {
        ProjectLinks {
            country: Some(country.to_string()),
            org_unit: Some("Africa Bureau".to_string()),
            themes: themes.iter().map(|s| s.to_string()).collect(),
            donors: donors.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_returns_expanded_detail() {
        let repo = setup().await;

        let mut f = fields("Clean water", ProjectStatus::Implemented);
        f.total_contribution = Some(Decimal::new(500, 0));
        f.total_expenditure = Some(Decimal::new(120, 0));

        let detail = repo
            .create_project(f, links("Kenya", &["Water", "Health"], &["UNDP"]))
            .await
            .unwrap();

        assert_eq!(detail.title, "Clean water");
        assert_eq!(detail.status, "Implemented");
        assert_eq!(detail.country.as_ref().map(|c| c.name.as_str()), Some("Kenya"));
        assert_eq!(detail.org_unit.as_ref().map(|o| o.name.as_str()), Some("Africa Bureau"));
        let themes: Vec<&str> = detail.themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(themes, vec!["Health", "Water"]);
        assert_eq!(detail.donors.len(), 1);
        assert_eq!(detail.total_contribution_expenditure_diff, Some(Decimal::new(380, 0)));
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let repo = setup().await;

        let err = repo
            .create_project(fields("   ", ProjectStatus::Approved), ProjectLinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));

        let mut f = fields("Dates", ProjectStatus::Approved);
        f.start_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        f.end_date = NaiveDate::from_ymd_opt(2024, 4, 1);
        let err = repo.create_project(f, ProjectLinks::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_filters() {
        let repo = setup().await;

        repo.create_project(fields("Water for Kenya", ProjectStatus::Approved), links("Kenya", &["Water"], &["UNDP"]))
            .await
            .unwrap();
        repo.create_project(fields("Schools in Chad", ProjectStatus::Closed), links("Chad", &["Education"], &["EU"]))
            .await
            .unwrap();

        let by_country = ProjectFilter { country: Some("kenya".into()), ..Default::default() };
        let found = repo.list_projects(&by_country).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Water for Kenya");

        let by_theme = ProjectFilter { theme: Some("EDUCATION".into()), ..Default::default() };
        assert_eq!(repo.list_projects(&by_theme).await.unwrap()[0].title, "Schools in Chad");

        let by_donor = ProjectFilter { donor: Some("undp".into()), ..Default::default() };
        assert_eq!(repo.list_projects(&by_donor).await.unwrap().len(), 1);

        let by_search = ProjectFilter { search: Some("SCHOOL".into()), ..Default::default() };
        assert_eq!(repo.list_projects(&by_search).await.unwrap()[0].title, "Schools in Chad");

        let by_status = ProjectFilter { status: Some("closed".into()), ..Default::default() };
        assert_eq!(repo.list_projects(&by_status).await.unwrap().len(), 1);

        let unknown = ProjectFilter { country: Some("Atlantis".into()), ..Default::default() };
        assert!(repo.list_projects(&unknown).await.unwrap().is_empty());

        assert_eq!(repo.list_projects(&ProjectFilter::default()).await.unwrap().len(), 2);
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("water"), "%water%");
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[tokio::test]
    async fn test_search_matches_wildcards_literally() {
        let repo = setup().await;

        for title in ["Phase_2 roads", "Phase 2 bridges", "100% solar"] {
            repo.create_project(fields(title, ProjectStatus::Approved), ProjectLinks::default())
                .await
                .unwrap();
        }

        let underscore = ProjectFilter { search: Some("_".into()), ..Default::default() };
        let found = repo.list_projects(&underscore).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Phase_2 roads");

        let percent = ProjectFilter { search: Some("%".into()), ..Default::default() };
        let found = repo.list_projects(&percent).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "100% solar");

        let plain = ProjectFilter { search: Some("phase".into()), ..Default::default() };
        assert_eq!(repo.list_projects(&plain).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_by_country_and_status_errors() {
        let repo = setup().await;

        let err = repo.projects_by_country("Nowhere").await.unwrap_err();
        assert!(matches!(err, AppError::CountryNotFound { .. }));

        let err = repo.projects_by_status("On hold").await.unwrap_err();
        match err {
            AppError::Validation { message, .. } => assert!(message.contains("Pending Approval")),
            other => panic!("unexpected error: {other:?}"),
        }

        repo.create_project(fields("P", ProjectStatus::PendingApproval), links("Peru", &[], &[]))
            .await
            .unwrap();
        assert_eq!(repo.projects_by_status("pending_approval").await.unwrap().len(), 1);
        assert_eq!(repo.projects_by_country("PERU").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup().await;

        let created = repo
            .create_project(fields("Old", ProjectStatus::Approved), links("Kenya", &["Water"], &[]))
            .await
            .unwrap();

        let updated = repo
            .update_project(created.id, fields("New", ProjectStatus::Completed), links("Kenya", &["Food"], &["WFP"]))
            .await
            .unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.themes.len(), 1);
        assert_eq!(updated.themes[0].name, "Food");

        repo.delete_project(created.id).await.unwrap();
        let err = repo.get_project(created.id).await.unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound { .. }));

        let err = repo.delete_project(created.id).await.unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_references_sorted() {
        let repo = setup().await;

        repo.create_project(fields("P", ProjectStatus::Approved), links("kenya", &["water", "Agriculture"], &[]))
            .await
            .unwrap();
        repo.create_project(fields("Q", ProjectStatus::Approved), links("Chad", &["Water"], &[]))
            .await
            .unwrap();

        let countries = repo.list_references(ReferenceKind::Country).await.unwrap();
        let names: Vec<&str> = countries.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Chad", "kenya"]);

        let themes = repo.list_references(ReferenceKind::Theme).await.unwrap();
        let names: Vec<&str> = themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Agriculture", "water"]);
    }
}
