//! SeaORM entity models
//!
//! Database entities for AidBoard

mod country;
mod donor;
mod org_unit;
mod project;
mod project_donor;
mod project_theme;
mod theme;

pub use country::{
    Entity as CountryEntity,
    Model as Country,
    ActiveModel as CountryActiveModel,
    Column as CountryColumn,
};

pub use org_unit::{
    Entity as OrgUnitEntity,
    Model as OrgUnit,
    ActiveModel as OrgUnitActiveModel,
    Column as OrgUnitColumn,
};

pub use theme::{
    Entity as ThemeEntity,
    Model as Theme,
    ActiveModel as ThemeActiveModel,
    Column as ThemeColumn,
};

pub use donor::{
    Entity as DonorEntity,
    Model as Donor,
    ActiveModel as DonorActiveModel,
    Column as DonorColumn,
};

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
    ProjectStatus,
};

pub use project_theme::{
    Entity as ProjectThemeEntity,
    Model as ProjectTheme,
    ActiveModel as ProjectThemeActiveModel,
    Column as ProjectThemeColumn,
};

pub use project_donor::{
    Entity as ProjectDonorEntity,
    Model as ProjectDonor,
    ActiveModel as ProjectDonorActiveModel,
    Column as ProjectDonorColumn,
};
