//! Reference entity lists, each sorted by name

use axum::{extract::State, Json};

use crate::AppState;
use aidboard_common::{
    db::resolver::ReferenceKind,
    db::ReferenceSummary,
    errors::Result,
};

async fn list(state: &AppState, kind: ReferenceKind) -> Result<Json<Vec<ReferenceSummary>>> {
    Ok(Json(state.repository.list_references(kind).await?))
}

pub async fn list_countries(State(state): State<AppState>) -> Result<Json<Vec<ReferenceSummary>>> {
    list(&state, ReferenceKind::Country).await
}

pub async fn list_org_units(State(state): State<AppState>) -> Result<Json<Vec<ReferenceSummary>>> {
    list(&state, ReferenceKind::OrgUnit).await
}

pub async fn list_themes(State(state): State<AppState>) -> Result<Json<Vec<ReferenceSummary>>> {
    list(&state, ReferenceKind::Theme).await
}

pub async fn list_donors(State(state): State<AppState>) -> Result<Json<Vec<ReferenceSummary>>> {
    list(&state, ReferenceKind::Donor).await
}
