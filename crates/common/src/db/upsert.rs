//! Project writes
//!
//! One entry point, [`write_project`], serves both the bulk importer and the
//! CRUD API. It resolves the named references, creates or overwrites the
//! project row, and replaces the theme and donor memberships with exactly
//! the resolved sets. Callers run it inside a transaction so a failure
//! leaves none of the row's writes behind.

use crate::db::models::*;
use crate::db::resolver::{self, ReferenceKind};
use crate::errors::{AppError, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Scalar project fields, already normalized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFields {
    pub title: String,
    pub external_id: Option<String>,
    pub paas_code: Option<String>,
    pub status: ProjectStatus,
    pub fund: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_amount: Option<Decimal>,
    pub pag_value: Option<Decimal>,
    pub total_expenditure: Option<Decimal>,
    pub total_contribution: Option<Decimal>,
    pub total_psc: Option<Decimal>,
}

/// Related entities by name; blank names must already be filtered out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectLinks {
    pub country: Option<String>,
    pub org_unit: Option<String>,
    pub themes: Vec<String>,
    pub donors: Vec<String>,
}

/// How the target project row is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Match on `external_id` when present, otherwise always create
    Upsert,
    /// Always create; an `external_id` already in use is a conflict
    Create,
    /// Overwrite the given project; an `external_id` owned by another
    /// project is a conflict
    Replace(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub project_id: Uuid,
    pub action: WriteAction,
    /// One entry per reference entity this write inserted
    pub created_references: Vec<ReferenceKind>,
}

/// Write one project and its memberships on `conn`.
pub async fn write_project<C: ConnectionTrait>(
    conn: &C,
    mode: WriteMode,
    fields: ProjectFields,
    links: &ProjectLinks,
) -> Result<WriteOutcome> {
    let existing = find_target(conn, mode, fields.external_id.as_deref()).await?;

    let mut created_references = Vec::new();

    let country_id = match links.country.as_deref() {
        Some(name) => Some(resolve_one(conn, ReferenceKind::Country, name, &mut created_references).await?),
        None => None,
    };
    let org_unit_id = match links.org_unit.as_deref() {
        Some(name) => Some(resolve_one(conn, ReferenceKind::OrgUnit, name, &mut created_references).await?),
        None => None,
    };

    let mut theme_ids = Vec::with_capacity(links.themes.len());
    for name in &links.themes {
        push_unique(&mut theme_ids, resolve_one(conn, ReferenceKind::Theme, name, &mut created_references).await?);
    }

    let mut donor_ids = Vec::with_capacity(links.donors.len());
    for name in &links.donors {
        push_unique(&mut donor_ids, resolve_one(conn, ReferenceKind::Donor, name, &mut created_references).await?);
    }

    let now = Utc::now();

    let (project_id, action) = match existing {
        Some(model) => {
            let id = model.id;
            let mut active: ProjectActiveModel = model.into();
            apply_fields(&mut active, fields, country_id, org_unit_id);
            active.updated_at = Set(now.into());
            active.update(conn).await?;
            (id, WriteAction::Updated)
        }
        None => {
            let id = Uuid::new_v4();
            let mut active = ProjectActiveModel {
                id: Set(id),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            };
            apply_fields(&mut active, fields, country_id, org_unit_id);
            active.insert(conn).await?;
            (id, WriteAction::Created)
        }
    };

    replace_themes(conn, project_id, &theme_ids).await?;
    replace_donors(conn, project_id, &donor_ids).await?;

    debug!(project_id = %project_id, action = ?action, "Project written");

    Ok(WriteOutcome {
        project_id,
        action,
        created_references,
    })
}

async fn find_target<C: ConnectionTrait>(
    conn: &C,
    mode: WriteMode,
    external_id: Option<&str>,
) -> Result<Option<Project>> {
    let by_external_id = match external_id {
        Some(ext) => {
            ProjectEntity::find()
                .filter(ProjectColumn::ExternalId.eq(ext))
                .one(conn)
                .await?
        }
        None => None,
    };

    match mode {
        WriteMode::Upsert => Ok(by_external_id),
        WriteMode::Create => match by_external_id {
            Some(other) => Err(AppError::DuplicateExternalId {
                external_id: other.external_id.unwrap_or_default(),
            }),
            None => Ok(None),
        },
        WriteMode::Replace(id) => {
            if let Some(other) = by_external_id {
                if other.id != id {
                    return Err(AppError::DuplicateExternalId {
                        external_id: other.external_id.unwrap_or_default(),
                    });
                }
            }

            let target = ProjectEntity::find_by_id(id)
                .one(conn)
                .await?
                .ok_or_else(|| AppError::ProjectNotFound { id: id.to_string() })?;
            Ok(Some(target))
        }
    }
}

async fn resolve_one<C: ConnectionTrait>(
    conn: &C,
    kind: ReferenceKind,
    name: &str,
    created: &mut Vec<ReferenceKind>,
) -> Result<Uuid> {
    let resolved = resolver::resolve(conn, kind, name).await?;
    if resolved.created {
        created.push(kind);
    }
    Ok(resolved.id)
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn money(value: Option<Decimal>) -> Option<Decimal> {
    value.map(|v| v.round_dp(2))
}

fn apply_fields(
    active: &mut ProjectActiveModel,
    fields: ProjectFields,
    country_id: Option<Uuid>,
    org_unit_id: Option<Uuid>,
) {
    active.title = Set(fields.title);
    active.external_id = Set(fields.external_id);
    active.paas_code = Set(fields.paas_code);
    active.status = Set(fields.status.into());
    active.fund = Set(fields.fund);
    active.country_id = Set(country_id);
    active.org_unit_id = Set(org_unit_id);
    active.approval_date = Set(fields.approval_date);
    active.start_date = Set(fields.start_date);
    active.end_date = Set(fields.end_date);
    active.budget_amount = Set(money(fields.budget_amount));
    active.pag_value = Set(money(fields.pag_value));
    active.total_expenditure = Set(money(fields.total_expenditure));
    active.total_contribution = Set(money(fields.total_contribution));
    active.total_psc = Set(money(fields.total_psc));
}

/// Make `theme_ids` the project's exact theme set
pub async fn replace_themes<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    theme_ids: &[Uuid],
) -> Result<()> {
    ProjectThemeEntity::delete_many()
        .filter(ProjectThemeColumn::ProjectId.eq(project_id))
        .exec(conn)
        .await?;

    if theme_ids.is_empty() {
        return Ok(());
    }

    let rows = theme_ids.iter().map(|theme_id| ProjectThemeActiveModel {
        project_id: Set(project_id),
        theme_id: Set(*theme_id),
    });
    ProjectThemeEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// Make `donor_ids` the project's exact donor set
pub async fn replace_donors<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
    donor_ids: &[Uuid],
) -> Result<()> {
    ProjectDonorEntity::delete_many()
        .filter(ProjectDonorColumn::ProjectId.eq(project_id))
        .exec(conn)
        .await?;

    if donor_ids.is_empty() {
        return Ok(());
    }

    let rows = donor_ids.iter().map(|donor_id| ProjectDonorActiveModel {
        project_id: Set(project_id),
        donor_id: Set(*donor_id),
    });
    ProjectDonorEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// Delete one project with its memberships. Returns false if it did not exist.
pub async fn delete_project<C: ConnectionTrait>(conn: &C, project_id: Uuid) -> Result<bool> {
    ProjectThemeEntity::delete_many()
        .filter(ProjectThemeColumn::ProjectId.eq(project_id))
        .exec(conn)
        .await?;
    ProjectDonorEntity::delete_many()
        .filter(ProjectDonorColumn::ProjectId.eq(project_id))
        .exec(conn)
        .await?;

    let result = ProjectEntity::delete_by_id(project_id).exec(conn).await?;
    Ok(result.rows_affected > 0)
}

/// Remove every project and membership row, leaving reference entities.
///
/// Runs in its own transaction and returns the number of projects removed.
pub async fn delete_all_projects(db: &DatabaseConnection) -> Result<u64> {
    let txn = db.begin().await?;

    ProjectThemeEntity::delete_many().exec(&txn).await?;
    ProjectDonorEntity::delete_many().exec(&txn).await?;
    let removed = ProjectEntity::delete_many().exec(&txn).await?.rows_affected;

    txn.commit().await?;

    debug!(removed, "Cleared projects");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::db::DbPool;
    use sea_orm::{ModelTrait, PaginatorTrait, QueryOrder};

    async fn setup() -> DbPool {
        let pool = DbPool::connect_url("sqlite::memory:").await.unwrap();
        ensure_schema(pool.write()).await.unwrap();
        pool
    }

    fn fields(title: &str, external_id: Option<&str>) -> ProjectFields {
        ProjectFields {
            title: title.to_string(),
            external_id: external_id.map(str::to_string),
            ..Default::default()
        }
    }

    fn links(country: &str, themes: &[&str], donors: &[&str]) -> ProjectLinks {
        ProjectLinks {
            country: Some(country.to_string()),
            org_unit: None,
            themes: themes.iter().map(|s| s.to_string()).collect(),
            donors: donors.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn theme_names(conn: &DatabaseConnection, project_id: Uuid) -> Vec<String> {
        let project = ProjectEntity::find_by_id(project_id).one(conn).await.unwrap().unwrap();
        project
            .find_related(ThemeEntity)
            .order_by_asc(ThemeColumn::Name)
            .all(conn)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let pool = setup().await;
        let conn = pool.write();

        let mut first = fields("A", Some("1"));
        first.pag_value = Some(Decimal::new(100, 0));
        let outcome = write_project(conn, WriteMode::Upsert, first, &links("Kenya", &[], &[]))
            .await
            .unwrap();
        assert_eq!(outcome.action, WriteAction::Created);
        assert_eq!(outcome.created_references, vec![ReferenceKind::Country]);

        let mut second = fields("A-updated", Some("1"));
        second.pag_value = Some(Decimal::new(150, 0));
        let again = write_project(conn, WriteMode::Upsert, second, &links("KENYA", &[], &[]))
            .await
            .unwrap();
        assert_eq!(again.action, WriteAction::Updated);
        assert_eq!(again.project_id, outcome.project_id);
        assert!(again.created_references.is_empty());

        let projects = ProjectEntity::find().all(conn).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "A-updated");
        assert_eq!(projects[0].pag_value, Some(Decimal::new(150, 0)));
    }

    #[tokio::test]
    async fn test_upsert_without_external_id_always_creates() {
        let pool = setup().await;
        let conn = pool.write();

        for _ in 0..3 {
            let outcome = write_project(conn, WriteMode::Upsert, fields("Same", None), &ProjectLinks::default())
                .await
                .unwrap();
            assert_eq!(outcome.action, WriteAction::Created);
        }

        assert_eq!(ProjectEntity::find().count(conn).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_memberships_are_replaced_not_merged() {
        let pool = setup().await;
        let conn = pool.write();

        let first = write_project(
            conn,
            WriteMode::Upsert,
            fields("Water", Some("W-1")),
            &links("Chad", &["Health", "Water"], &["UNDP"]),
        )
        .await
        .unwrap();
        assert_eq!(theme_names(conn, first.project_id).await, vec!["Health", "Water"]);

        write_project(
            conn,
            WriteMode::Upsert,
            fields("Water", Some("W-1")),
            &links("Chad", &["Education"], &[]),
        )
        .await
        .unwrap();

        assert_eq!(theme_names(conn, first.project_id).await, vec!["Education"]);
        assert_eq!(ProjectDonorEntity::find().count(conn).await.unwrap(), 0);
        // References persist even when no longer linked
        assert_eq!(ThemeEntity::find().count(conn).await.unwrap(), 3);
        assert_eq!(DonorEntity::find().count(conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_external_id() {
        let pool = setup().await;
        let conn = pool.write();

        write_project(conn, WriteMode::Create, fields("One", Some("X")), &ProjectLinks::default())
            .await
            .unwrap();
        let err = write_project(conn, WriteMode::Create, fields("Two", Some("X")), &ProjectLinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateExternalId { .. }));
    }

    #[tokio::test]
    async fn test_replace_checks_ownership_and_existence() {
        let pool = setup().await;
        let conn = pool.write();

        let a = write_project(conn, WriteMode::Create, fields("A", Some("A")), &ProjectLinks::default())
            .await
            .unwrap();
        let b = write_project(conn, WriteMode::Create, fields("B", Some("B")), &ProjectLinks::default())
            .await
            .unwrap();

        // Keeping its own external id is fine
        let same = write_project(conn, WriteMode::Replace(a.project_id), fields("A2", Some("A")), &ProjectLinks::default())
            .await
            .unwrap();
        assert_eq!(same.action, WriteAction::Updated);

        let err = write_project(conn, WriteMode::Replace(b.project_id), fields("B2", Some("A")), &ProjectLinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateExternalId { .. }));

        let err = write_project(conn, WriteMode::Replace(Uuid::new_v4()), fields("C", None), &ProjectLinks::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rolled_back_write_leaves_nothing() {
        let pool = setup().await;
        let db = pool.write();

        let txn = db.begin().await.unwrap();
        write_project(&txn, WriteMode::Upsert, fields("Ghost", Some("G")), &links("Mali", &["Food"], &["WFP"]))
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(ProjectEntity::find().count(db).await.unwrap(), 0);
        assert_eq!(CountryEntity::find().count(db).await.unwrap(), 0);
        assert_eq!(ThemeEntity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_all_projects_keeps_references() {
        let pool = setup().await;
        let db = pool.write();

        for i in 0..2 {
            write_project(
                db,
                WriteMode::Upsert,
                fields("P", Some(i.to_string().as_str())),
                &links("Kenya", &["Health"], &["UNDP"]),
            )
            .await
            .unwrap();
        }

        assert_eq!(delete_all_projects(db).await.unwrap(), 2);
        assert_eq!(ProjectEntity::find().count(db).await.unwrap(), 0);
        assert_eq!(ProjectThemeEntity::find().count(db).await.unwrap(), 0);
        assert_eq!(CountryEntity::find().count(db).await.unwrap(), 1);
        assert_eq!(ThemeEntity::find().count(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_money_rounded_on_write() {
        let pool = setup().await;
        let conn = pool.write();

        let mut f = fields("Money", None);
        f.total_psc = Some(Decimal::new(12346, 3));
        let outcome = write_project(conn, WriteMode::Upsert, f, &ProjectLinks::default())
            .await
            .unwrap();

        let stored = ProjectEntity::find_by_id(outcome.project_id).one(conn).await.unwrap().unwrap();
        assert_eq!(stored.total_psc.map(|v| v.round_dp(2)), Some(Decimal::new(1235, 2)));
    }
}
