//! Tenant site records.
//!
//! Only the favicon columns are written by this crate; the remaining columns
//! belong to the embedding application.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub allowed_origin: String,
    pub favicon_origin: String,
    pub favicon_data: Vec<u8>,
    pub favicon_content_type: String,
    pub favicon_fetched_at: Option<ChronoDateTimeUtc>,
    pub favicon_last_attempt_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
