//! Dashboard aggregation
//!
//! Read-only group-by queries over projects. Only entities linked to at
//! least one project appear in a breakdown. Ordering is applied here
//! rather than in SQL so every backend ranks identically: descending
//! count or value, then ascending name.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics;
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QuerySelect, Statement,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::instrument;

/// Grouping dimension for breakdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Country,
    OrgUnit,
    Theme,
}

impl Dimension {
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Country => "country",
            Dimension::OrgUnit => "org_unit",
            Dimension::Theme => "theme",
        }
    }

    /// FROM/JOIN clause binding the dimension table as `d` and projects as `p`
    fn join_clause(&self) -> &'static str {
        match self {
            Dimension::Country => "countries d INNER JOIN projects p ON p.country_id = d.id",
            Dimension::OrgUnit => "org_units d INNER JOIN projects p ON p.org_unit_id = d.id",
            Dimension::Theme => {
                "themes d INNER JOIN project_themes pt ON pt.theme_id = d.id \
                 INNER JOIN projects p ON p.id = pt.project_id"
            }
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Dimension {
    type Err = AppError;

    /// Accepts singular or plural, with `-` or `_`
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "country" | "countries" => Ok(Dimension::Country),
            "org_unit" | "org_units" | "orgunit" | "orgunits" => Ok(Dimension::OrgUnit),
            "theme" | "themes" => Ok(Dimension::Theme),
            other => Err(AppError::Validation {
                message: format!(
                    "Unknown dimension '{}'. Valid dimensions: country, org_unit, theme",
                    other
                ),
                field: Some("dimension".to_string()),
            }),
        }
    }
}

/// Monetary project column that can be summed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetaryField {
    BudgetAmount,
    #[default]
    PagValue,
    TotalExpenditure,
    TotalContribution,
    TotalPsc,
}

impl MonetaryField {
    pub const ALL: [MonetaryField; 5] = [
        MonetaryField::BudgetAmount,
        MonetaryField::PagValue,
        MonetaryField::TotalExpenditure,
        MonetaryField::TotalContribution,
        MonetaryField::TotalPsc,
    ];

    /// Column name; also the accepted input spelling
    pub fn column(&self) -> &'static str {
        match self {
            MonetaryField::BudgetAmount => "budget_amount",
            MonetaryField::PagValue => "pag_value",
            MonetaryField::TotalExpenditure => "total_expenditure",
            MonetaryField::TotalContribution => "total_contribution",
            MonetaryField::TotalPsc => "total_psc",
        }
    }
}

impl FromStr for MonetaryField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.column() == wanted)
            .ok_or_else(|| AppError::Validation {
                message: format!(
                    "Unknown field '{}'. Valid fields: {}",
                    s.trim(),
                    Self::ALL.map(|f| f.column()).join(", ")
                ),
                field: Some("field".to_string()),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: Decimal,
}

/// Headline figures for the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_projects: u64,
    pub total_pag_value: Decimal,
    pub total_expenditure: Decimal,
    pub total_contribution: Decimal,
    pub contribution_expenditure_diff: Decimal,
    /// Distinct countries referenced by at least one project
    pub countries: u64,
    pub org_units: u64,
    pub themes: u64,
}

/// Aggregation queries over the project store
#[derive(Clone)]
pub struct AggregationService {
    pool: DbPool,
}

impl AggregationService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    pub async fn count_by_country(&self) -> Result<Vec<NamedCount>> {
        self.count_by(Dimension::Country).await
    }

    pub async fn count_by_org_unit(&self) -> Result<Vec<NamedCount>> {
        self.count_by(Dimension::OrgUnit).await
    }

    pub async fn count_by_theme(&self) -> Result<Vec<NamedCount>> {
        self.count_by(Dimension::Theme).await
    }

    /// Number of projects per entity of `dimension`
    #[instrument(skip(self))]
    pub async fn count_by(&self, dimension: Dimension) -> Result<Vec<NamedCount>> {
        let start = Instant::now();
        let conn = self.conn();

        let sql = format!(
            "SELECT d.name AS name, COUNT(DISTINCT p.id) AS count FROM {} GROUP BY d.id, d.name",
            dimension.join_clause()
        );
        let rows = conn
            .query_all(Statement::from_string(conn.get_database_backend(), sql))
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("", "name")?;
            let count: i64 = row.try_get("", "count")?;
            counts.push(NamedCount {
                name,
                count: count.max(0) as u64,
            });
        }

        rank_counts(&mut counts);

        metrics::record_aggregation(start.elapsed().as_secs_f64(), "count_by");
        Ok(counts)
    }

    /// Sum of `field` per entity of `dimension`; all-absent sums are 0
    #[instrument(skip(self))]
    pub async fn value_by_dimension(
        &self,
        dimension: Dimension,
        field: MonetaryField,
    ) -> Result<Vec<NamedValue>> {
        let start = Instant::now();
        let conn = self.conn();

        // Per-row values; summed as Decimal below
        let sql = format!(
            "SELECT d.name AS name, p.{} AS value FROM {}",
            field.column(),
            dimension.join_clause()
        );
        let rows = conn
            .query_all(Statement::from_string(conn.get_database_backend(), sql))
            .await?;

        let mut totals: HashMap<String, Decimal> = HashMap::new();
        for row in rows {
            let name: String = row.try_get("", "name")?;
            let value: Option<Decimal> = row.try_get("", "value")?;
            *totals.entry(name).or_insert(Decimal::ZERO) += value.unwrap_or(Decimal::ZERO);
        }

        let mut values: Vec<NamedValue> = totals
            .into_iter()
            .map(|(name, value)| NamedValue {
                name,
                value: value.round_dp(2),
            })
            .collect();
        rank_values(&mut values);

        metrics::record_aggregation(start.elapsed().as_secs_f64(), "value_by_dimension");
        Ok(values)
    }

    /// Project count, money totals and distinct reference counts
    #[instrument(skip(self))]
    pub async fn kpi_summary(&self) -> Result<KpiSummary> {
        let start = Instant::now();
        let conn = self.conn();

        let total_projects = ProjectEntity::find().count(conn).await?;

        let amounts: Vec<(Option<Decimal>, Option<Decimal>, Option<Decimal>)> = ProjectEntity::find()
            .select_only()
            .column(ProjectColumn::PagValue)
            .column(ProjectColumn::TotalExpenditure)
            .column(ProjectColumn::TotalContribution)
            .into_tuple()
            .all(conn)
            .await?;

        let (mut pag, mut expenditure, mut contribution) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        for (p, e, c) in amounts {
            pag += p.unwrap_or_default();
            expenditure += e.unwrap_or_default();
            contribution += c.unwrap_or_default();
        }

        let summary = KpiSummary {
            total_projects,
            total_pag_value: pag.round_dp(2),
            total_expenditure: expenditure.round_dp(2),
            total_contribution: contribution.round_dp(2),
            contribution_expenditure_diff: (contribution - expenditure).round_dp(2),
            countries: distinct_count(conn, "SELECT COUNT(DISTINCT country_id) AS count FROM projects").await?,
            org_units: distinct_count(conn, "SELECT COUNT(DISTINCT org_unit_id) AS count FROM projects").await?,
            themes: distinct_count(conn, "SELECT COUNT(DISTINCT theme_id) AS count FROM project_themes").await?,
        };

        metrics::record_aggregation(start.elapsed().as_secs_f64(), "kpi_summary");
        Ok(summary)
    }
}

async fn distinct_count(conn: &DatabaseConnection, sql: &str) -> Result<u64> {
    let row = conn
        .query_one(Statement::from_string(conn.get_database_backend(), sql.to_string()))
        .await?;

    match row {
        Some(row) => {
            let count: i64 = row.try_get("", "count")?;
            Ok(count.max(0) as u64)
        }
        None => Ok(0),
    }
}

fn rank_counts(counts: &mut [NamedCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
}

fn rank_values(values: &mut [NamedValue]) {
    values.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)));
}
