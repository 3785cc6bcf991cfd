//! Donor entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "donors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[serde(skip)]
    #[sea_orm(column_type = "Text", unique)]
    pub name_key: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_donor::Entity")]
    ProjectDonors,
}

impl Related<super::project_donor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectDonors.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        super::project_donor::Relation::Project.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::project_donor::Relation::Donor.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
