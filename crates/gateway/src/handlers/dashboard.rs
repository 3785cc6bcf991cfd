//! Dashboard aggregation handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::AppState;
use aidboard_common::{
    aggregation::{Dimension, KpiSummary, MonetaryField, NamedCount, NamedValue},
    errors::Result,
    SummaryOutcome,
};

#[derive(Debug, Default, Deserialize)]
pub struct ValueQuery {
    /// Monetary column to sum; defaults to pag_value
    pub field: Option<String>,
}

pub async fn count_by_country(State(state): State<AppState>) -> Result<Json<Vec<NamedCount>>> {
    Ok(Json(state.aggregation.count_by_country().await?))
}

pub async fn count_by_org_unit(State(state): State<AppState>) -> Result<Json<Vec<NamedCount>>> {
    Ok(Json(state.aggregation.count_by_org_unit().await?))
}

pub async fn count_by_theme(State(state): State<AppState>) -> Result<Json<Vec<NamedCount>>> {
    Ok(Json(state.aggregation.count_by_theme().await?))
}

/// Sum of a monetary field per dimension entity
pub async fn value_by_dimension(
    State(state): State<AppState>,
    Path(dimension): Path<String>,
    Query(query): Query<ValueQuery>,
) -> Result<Json<Vec<NamedValue>>> {
    let dimension: Dimension = dimension.parse()?;
    let field = match query.field.as_deref().map(str::trim) {
        None | Some("") => MonetaryField::default(),
        Some(raw) => raw.parse()?,
    };

    Ok(Json(state.aggregation.value_by_dimension(dimension, field).await?))
}

pub async fn kpi_summary(State(state): State<AppState>) -> Result<Json<KpiSummary>> {
    Ok(Json(state.aggregation.kpi_summary().await?))
}

/// Always 200; the outcome's `status` tag tells the client what happened
pub async fn ai_summary(State(state): State<AppState>) -> Json<SummaryOutcome> {
    Json(state.summary.summarize().await)
}
