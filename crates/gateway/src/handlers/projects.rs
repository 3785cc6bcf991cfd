//! Project CRUD handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::AppState;
use aidboard_common::{
    db::models::ProjectStatus,
    db::upsert::{ProjectFields, ProjectLinks},
    db::{ProjectDetail, ProjectFilter},
    errors::{AppError, Result},
};

/// Request body for create and full-replace update
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_dates"))]
pub struct ProjectInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[validate(length(max = 100))]
    pub external_id: Option<String>,

    pub paas_code: Option<String>,

    /// Label or snake_case key; blank or absent means Approved
    pub status: Option<String>,

    pub fund: Option<String>,

    pub country: Option<String>,

    pub org_unit: Option<String>,

    #[serde(default)]
    pub themes: Vec<String>,

    #[serde(default)]
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

fn validate_dates(input: &ProjectInput) -> std::result::Result<(), ValidationError> {
    match (input.start_date, input.end_date) {
        (Some(start), Some(end)) if end < start => {
            Err(ValidationError::new("end_before_start")
                .with_message("end_date must not be before start_date".into()))
        }
        _ => Ok(()),
    }
}

fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors
        .field_errors()
        .keys()
        .find(|k| **k != "__all__")
        .map(|k| k.to_string())
        .or_else(|| Some("end_date".to_string()));

    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn names(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| trimmed(Some(v)))
        .collect()
}

impl ProjectInput {
    /// Validate and split into the shared write types
    pub fn into_parts(self) -> Result<(ProjectFields, ProjectLinks)> {
        self.validate().map_err(validation_error)?;

        let status = match trimmed(self.status) {
            None => ProjectStatus::default(),
            Some(raw) => ProjectStatus::from_label(&raw).ok_or_else(|| AppError::Validation {
                message: format!(
                    "Unknown status '{}'. Valid values: {}",
                    raw,
                    ProjectStatus::valid_labels()
                ),
                field: Some("status".to_string()),
            })?,
        };

        let fields = ProjectFields {
            title: self.title.trim().to_string(),
            external_id: trimmed(self.external_id),
            paas_code: trimmed(self.paas_code),
            status,
            fund: trimmed(self.fund),
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
            country: trimmed(self.country),
            org_unit: trimmed(self.org_unit),
            themes: names(self.themes),
            donors: names(self.donors),
        };

        Ok((fields, links))
    }
}

/// List projects, newest first, with optional filters
pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<ProjectDetail>>> {
    let projects = state.repository.list_projects(&filter).await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectDetail>> {
    Ok(Json(state.repository.get_project(project_id).await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<ProjectInput>,
) -> Result<(StatusCode, Json<ProjectDetail>)> {
    let (fields, links) = input.into_parts()?;
    let project = state.repository.create_project(fields, links).await?;

    tracing::info!(project_id = %project.id, title = %project.title, "Project created");

    Ok((StatusCode::CREATED, Json(project)))
}

/// Full replace of fields and memberships
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<ProjectInput>,
) -> Result<Json<ProjectDetail>> {
    let (fields, links) = input.into_parts()?;
    let project = state.repository.update_project(project_id, fields, links).await?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.repository.delete_project(project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Projects whose country matches `name` case-insensitively
pub async fn projects_by_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ProjectDetail>>> {
    Ok(Json(state.repository.projects_by_country(&name).await?))
}

pub async fn projects_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ProjectDetail>>> {
    Ok(Json(state.repository.projects_by_status(&status).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: serde_json::Value) -> ProjectInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_into_parts_trims_and_defaults() {
        let (fields, links) = input(json!({
            "title": "  Clean water  ",
            "external_id": " ",
            "country": " Kenya ",
            "themes": ["Water", " ", "Health"],
            "pag_value": "1200.50"
        }))
        .into_parts()
        .unwrap();

        assert_eq!(fields.title, "Clean water");
        assert_eq!(fields.external_id, None);
        assert_eq!(fields.status, ProjectStatus::Approved);
        assert_eq!(fields.pag_value, Some(Decimal::new(120050, 2)));
        assert_eq!(links.country.as_deref(), Some("Kenya"));
        assert_eq!(links.themes, vec!["Water".to_string(), "Health".to_string()]);
    }

    #[test]
    fn test_status_key_and_label_accepted() {
        let (fields, _) = input(json!({"title": "A", "status": "pending_approval"}))
            .into_parts()
            .unwrap();
        assert_eq!(fields.status, ProjectStatus::PendingApproval);

        let (fields, _) = input(json!({"title": "A", "status": "closed"})).into_parts().unwrap();
        assert_eq!(fields.status, ProjectStatus::Closed);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = input(json!({"title": "A", "status": "On hold"}))
            .into_parts()
            .unwrap_err();
        match err {
            AppError::Validation { message, field } => {
                assert!(message.contains("Pending Approval"));
                assert_eq!(field.as_deref(), Some("status"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_length_limits() {
        let long_title = "x".repeat(256);
        assert!(input(json!({"title": long_title})).into_parts().is_err());
        assert!(input(json!({"title": ""})).into_parts().is_err());

        let long_id = "1".repeat(101);
        let err = input(json!({"title": "A", "external_id": long_id}))
            .into_parts()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "external_id"));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = input(json!({
            "title": "A",
            "start_date": "2024-06-01",
            "end_date": "2024-01-01"
        }))
        .into_parts()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "end_date"));
    }
}
