//! Theme entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "themes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[serde(skip)]
    #[sea_orm(column_type = "Text", unique)]
    pub name_key: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_theme::Entity")]
    ProjectThemes,
}

impl Related<super::project_theme::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectThemes.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        super::project_theme::Relation::Project.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::project_theme::Relation::Theme.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
