//! Get-or-create for reference entities
//!
//! Countries, organizational units, themes and donors are identified by
//! name, case-insensitively. A reference is created the first time any
//! writer names it, and the stored display name keeps the casing of that
//! first writer. Every write goes through `name_key` (trimmed, lower-cased)
//! with `ON CONFLICT DO NOTHING`, so two concurrent writers naming the
//! same entity end up sharing one row.

use crate::db::models::*;
use crate::errors::{AppError, Result};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of reference entity a project links to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Country,
    OrgUnit,
    Theme,
    Donor,
}

impl ReferenceKind {
    /// Label used in logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::Country => "country",
            ReferenceKind::OrgUnit => "org_unit",
            ReferenceKind::Theme => "theme",
            ReferenceKind::Donor => "donor",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of resolving one name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: Uuid,
    /// True when this call inserted the row
    pub created: bool,
}

/// Identity key for a reference name
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolve `name` to the id of an existing entity of `kind`, creating it
/// when no entity with the same case-insensitive name exists.
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    kind: ReferenceKind,
    name: &str,
) -> Result<Resolved> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            message: format!("{} name must not be blank", kind),
            field: Some(kind.label().to_string()),
        });
    }

    let key = name_key(trimmed);

    let resolved = match kind {
        ReferenceKind::Country => resolve_country(conn, trimmed, &key).await?,
        ReferenceKind::OrgUnit => resolve_org_unit(conn, trimmed, &key).await?,
        ReferenceKind::Theme => resolve_theme(conn, trimmed, &key).await?,
        ReferenceKind::Donor => resolve_donor(conn, trimmed, &key).await?,
    };

    if resolved.created {
        tracing::debug!(kind = %kind, name = trimmed, id = %resolved.id, "Created reference entity");
    }

    Ok(resolved)
}

/// Look up an existing entity by case-insensitive name without creating it
pub async fn find_id<C: ConnectionTrait>(
    conn: &C,
    kind: ReferenceKind,
    name: &str,
) -> Result<Option<Uuid>> {
    let key = name_key(name);

    let id = match kind {
        ReferenceKind::Country => CountryEntity::find()
            .filter(CountryColumn::NameKey.eq(key.as_str()))
            .one(conn)
            .await?
            .map(|m| m.id),
        ReferenceKind::OrgUnit => OrgUnitEntity::find()
            .filter(OrgUnitColumn::NameKey.eq(key.as_str()))
            .one(conn)
            .await?
            .map(|m| m.id),
        ReferenceKind::Theme => ThemeEntity::find()
            .filter(ThemeColumn::NameKey.eq(key.as_str()))
            .one(conn)
            .await?
            .map(|m| m.id),
        ReferenceKind::Donor => DonorEntity::find()
            .filter(DonorColumn::NameKey.eq(key.as_str()))
            .one(conn)
            .await?
            .map(|m| m.id),
    };

    Ok(id)
}

// Each reference table has the same (id, name, name_key, created_at) core,
// so the get-or-create body is shared.
macro_rules! get_or_create {
    ($fn_name:ident, $entity:ident, $active:ident, $column:ident, $kind:expr) => {
        async fn $fn_name<C: ConnectionTrait>(conn: &C, name: &str, key: &str) -> Result<Resolved> {
            if let Some(existing) = $entity::find()
                .filter($column::NameKey.eq(key))
                .one(conn)
                .await?
            {
                return Ok(Resolved { id: existing.id, created: false });
            }

            let id = Uuid::new_v4();
            let record = $active {
                id: Set(id),
                name: Set(name.to_string()),
                name_key: Set(key.to_string()),
                created_at: Set(Utc::now().into()),
                ..Default::default()
            };

            let inserted = $entity::insert(record)
                .on_conflict(OnConflict::column($column::NameKey).do_nothing().to_owned())
                .exec_without_returning(conn)
                .await?;

            if inserted > 0 {
                return Ok(Resolved { id, created: true });
            }

            // Another writer inserted the same key between our read and insert
            let existing = $entity::find()
                .filter($column::NameKey.eq(key))
                .one(conn)
                .await?
                .ok_or_else(|| AppError::Internal {
                    message: format!("{} '{}' vanished after conflicting insert", $kind, name),
                })?;

            Ok(Resolved { id: existing.id, created: false })
        }
    };
}

get_or_create!(resolve_country, CountryEntity, CountryActiveModel, CountryColumn, ReferenceKind::Country);
get_or_create!(resolve_org_unit, OrgUnitEntity, OrgUnitActiveModel, OrgUnitColumn, ReferenceKind::OrgUnit);
get_or_create!(resolve_theme, ThemeEntity, ThemeActiveModel, ThemeColumn, ReferenceKind::Theme);
get_or_create!(resolve_donor, DonorEntity, DonorActiveModel, DonorColumn, ReferenceKind::Donor);
