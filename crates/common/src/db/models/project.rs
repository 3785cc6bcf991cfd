//! Project entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Approval / lifecycle status of a project
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    #[default]
    Approved,
    Implemented,
    Completed,
    Cancelled,
    Closed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 6] = [
        ProjectStatus::PendingApproval,
        ProjectStatus::Approved,
        ProjectStatus::Implemented,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
        ProjectStatus::Closed,
    ];

    /// Stored and displayed label
    pub fn label(&self) -> &'static str {
        match self {
            ProjectStatus::PendingApproval => "Pending Approval",
            ProjectStatus::Approved => "Approved",
            ProjectStatus::Implemented => "Implemented",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Cancelled => "Cancelled",
            ProjectStatus::Closed => "Closed",
        }
    }

    /// snake_case key accepted wherever a label is
    pub fn key(&self) -> &'static str {
        match self {
            ProjectStatus::PendingApproval => "pending_approval",
            ProjectStatus::Approved => "approved",
            ProjectStatus::Implemented => "implemented",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
            ProjectStatus::Closed => "closed",
        }
    }

    /// Look up a status by label or key.
    ///
    /// Matching ignores case and collapses runs of whitespace, so
    /// `"pending  APPROVAL"` resolves to [`ProjectStatus::PendingApproval`].
    pub fn from_label(input: &str) -> Option<Self> {
        let normalized = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if normalized.is_empty() {
            return None;
        }

        Self::ALL.into_iter().find(|status| {
            status.label().to_lowercase() == normalized || status.key() == normalized
        })
    }

    /// Comma-separated list of labels, for error messages
    pub fn valid_labels() -> String {
        Self::ALL
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for ProjectStatus {
    fn from(s: String) -> Self {
        ProjectStatus::from_label(&s).unwrap_or_default()
    }
}

impl From<ProjectStatus> for String {
    fn from(status: ProjectStatus) -> Self {
        status.label().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Identifier from the source workbook; upsert key when present
    #[sea_orm(column_type = "Text", nullable, unique)]
    pub external_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub paas_code: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub fund: Option<String>,

    pub country_id: Option<Uuid>,

    pub org_unit_id: Option<Uuid>,

    pub approval_date: Option<Date>,

    pub start_date: Option<Date>,

    pub end_date: Option<Date>,

    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub budget_amount: Option<Decimal>,

    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub pag_value: Option<Decimal>,

    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub total_expenditure: Option<Decimal>,

    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub total_contribution: Option<Decimal>,

    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub total_psc: Option<Decimal>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the status as an enum
    pub fn project_status(&self) -> ProjectStatus {
        ProjectStatus::from(self.status.clone())
    }

    /// Total contribution minus total expenditure; never stored
    pub fn contribution_expenditure_diff(&self) -> Option<Decimal> {
        match (self.total_contribution, self.total_expenditure) {
            (Some(contribution), Some(expenditure)) => Some(contribution - expenditure),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::country::Entity",
        from = "Column::CountryId",
        to = "super::country::Column::Id"
    )]
    Country,

    #[sea_orm(
        belongs_to = "super::org_unit::Entity",
        from = "Column::OrgUnitId",
        to = "super::org_unit::Column::Id"
    )]
    OrgUnit,

    #[sea_orm(has_many = "super::project_theme::Entity")]
    ProjectThemes,

    #[sea_orm(has_many = "super::project_donor::Entity")]
    ProjectDonors,
}

impl Related<super::country::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Country.def()
    }
}

impl Related<super::org_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrgUnit.def()
    }
}

impl Related<super::theme::Entity> for Entity {
    fn to() -> RelationDef {
        super::project_theme::Relation::Theme.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::project_theme::Relation::Project.def().rev())
    }
}

impl Related<super::donor::Entity> for Entity {
    fn to() -> RelationDef {
        super::project_donor::Relation::Donor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::project_donor::Relation::Project.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(contribution: Option<Decimal>, expenditure: Option<Decimal>) -> Model {
        let now = Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            title: "Water points".into(),
            external_id: None,
            paas_code: None,
            status: "Approved".into(),
            fund: None,
            country_id: None,
            org_unit_id: None,
            approval_date: None,
            start_date: None,
            end_date: None,
            budget_amount: None,
            pag_value: None,
            total_expenditure: expenditure,
            total_contribution: contribution,
            total_psc: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_lookup() {
        assert_eq!(ProjectStatus::from_label("Approved"), Some(ProjectStatus::Approved));
        assert_eq!(
            ProjectStatus::from_label("  pending   APPROVAL "),
            Some(ProjectStatus::PendingApproval)
        );
        assert_eq!(ProjectStatus::from_label("pending_approval"), Some(ProjectStatus::PendingApproval));
        assert_eq!(ProjectStatus::from_label("closed"), Some(ProjectStatus::Closed));
        assert_eq!(ProjectStatus::from_label("On hold"), None);
        assert_eq!(ProjectStatus::from_label("   "), None);
    }

    #[test]
    fn test_status_string_round_trip_defaults() {
        assert_eq!(ProjectStatus::from("Cancelled".to_string()), ProjectStatus::Cancelled);
        assert_eq!(ProjectStatus::from("garbage".to_string()), ProjectStatus::Approved);
        assert_eq!(String::from(ProjectStatus::PendingApproval), "Pending Approval");
    }

    #[test]
    fn test_contribution_expenditure_diff() {
        let model = sample(Some(Decimal::new(50000, 2)), Some(Decimal::new(12050, 2)));
        assert_eq!(model.contribution_expenditure_diff(), Some(Decimal::new(37950, 2)));

        let model = sample(Some(Decimal::new(500, 0)), None);
        assert_eq!(model.contribution_expenditure_diff(), None);
    }
}
