//! Schema bootstrap
//!
//! Tables are derived from the entity definitions so Postgres and the
//! SQLite databases used in tests share one source of truth.

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, EntityTrait, Schema};
use tracing::{debug, info};

/// Create every AidBoard table that does not exist yet.
///
/// Reference tables are created before `projects`, and `projects` before
/// the membership tables, so foreign keys always point at existing tables.
pub async fn ensure_schema<C: ConnectionTrait>(conn: &C) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    create_table(conn, &schema, CountryEntity).await?;
    create_table(conn, &schema, OrgUnitEntity).await?;
    create_table(conn, &schema, ThemeEntity).await?;
    create_table(conn, &schema, DonorEntity).await?;
    create_table(conn, &schema, ProjectEntity).await?;
    create_table(conn, &schema, ProjectThemeEntity).await?;
    create_table(conn, &schema, ProjectDonorEntity).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_table<C, E>(conn: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();

    debug!(table = entity.table_name(), "Ensuring table");
    conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(())
}
