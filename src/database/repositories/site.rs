//! SeaORM-based Site repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::traits::SiteFaviconStore;
use crate::entities::{prelude::Sites, sites};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{FaviconUpdate, Site, SiteCreateRequest, SiteFaviconState};

/// SeaORM-based repository for Site operations
#[derive(Clone)]
pub struct SiteSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

/// Row shape of the reduced-column scan
#[derive(Debug, FromQueryResult)]
struct FaviconStateRow {
    id: Uuid,
    allowed_origin: String,
    favicon_origin: String,
    favicon_size: Option<i64>,
    favicon_fetched_at: Option<DateTime<Utc>>,
    favicon_last_attempt_at: Option<DateTime<Utc>>,
}

impl From<FaviconStateRow> for SiteFaviconState {
    fn from(row: FaviconStateRow) -> Self {
        Self {
            id: row.id,
            allowed_origin: row.allowed_origin,
            favicon_origin: row.favicon_origin,
            has_favicon: row.favicon_size.unwrap_or(0) > 0,
            favicon_fetched_at: row.favicon_fetched_at,
            favicon_last_attempt_at: row.favicon_last_attempt_at,
        }
    }
}

impl From<sites::Model> for Site {
    fn from(m: sites::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            allowed_origin: m.allowed_origin,
            favicon_origin: m.favicon_origin,
            favicon_data: m.favicon_data,
            favicon_content_type: m.favicon_content_type,
            favicon_fetched_at: m.favicon_fetched_at,
            favicon_last_attempt_at: m.favicon_last_attempt_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl SiteSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Get database connection for direct operations
    pub fn get_connection(&self) -> &Arc<DatabaseConnection> {
        &self.connection
    }

    /// Create a new site with no favicon cached
    pub async fn create(&self, request: SiteCreateRequest) -> RepositoryResult<Site> {
        let now = Utc::now();

        let active_model = sites::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            allowed_origin: Set(request.allowed_origin),
            favicon_origin: Set(String::new()),
            favicon_data: Set(Vec::new()),
            favicon_content_type: Set(String::new()),
            favicon_fetched_at: Set(None),
            favicon_last_attempt_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&*self.connection).await?;
        Ok(model.into())
    }

    pub async fn find_by_id(&self, id: &Uuid) -> RepositoryResult<Option<Site>> {
        let model = Sites::find_by_id(*id).one(&*self.connection).await?;
        Ok(model.map(Site::from))
    }

    pub async fn find_all(&self) -> RepositoryResult<Vec<Site>> {
        let models = Sites::find()
            .order_by_asc(sites::Column::CreatedAt)
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(Site::from).collect())
    }

    /// Change a site's origin.
    ///
    /// The stored favicon is left alone; the next fetch notices the origin
    /// mismatch and replaces it.
    pub async fn update_allowed_origin(&self, id: &Uuid, origin: &str) -> RepositoryResult<Site> {
        let model = Sites::find_by_id(*id)
            .one(&*self.connection)
            .await?
            .ok_or_else(|| not_found(id))?;

        let mut active_model: sites::ActiveModel = model.into();
        active_model.allowed_origin = Set(origin.to_string());
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(&*self.connection).await?;
        Ok(updated.into())
    }
}

fn not_found(id: &Uuid) -> RepositoryError {
    RepositoryError::RecordNotFound {
        table: "sites".to_string(),
        field: "id".to_string(),
        value: id.to_string(),
    }
}

#[async_trait]
impl SiteFaviconStore for SiteSeaOrmRepository {
    async fn find_site(&self, id: Uuid) -> RepositoryResult<Option<Site>> {
        self.find_by_id(&id).await
    }

    async fn update_favicon(&self, id: Uuid, update: &FaviconUpdate) -> RepositoryResult<()> {
        let mut query = Sites::update_many()
            .col_expr(
                sites::Column::FaviconOrigin,
                Expr::value(update.favicon_origin.clone()),
            )
            .col_expr(
                sites::Column::FaviconLastAttemptAt,
                Expr::value(update.last_attempt_at),
            );

        if let Some(fetched) = &update.fetched {
            query = query
                .col_expr(sites::Column::FaviconData, Expr::value(fetched.data.clone()))
                .col_expr(
                    sites::Column::FaviconContentType,
                    Expr::value(fetched.content_type.clone()),
                )
                .col_expr(
                    sites::Column::FaviconFetchedAt,
                    Expr::value(fetched.fetched_at),
                );
        }

        let result = query
            .filter(sites::Column::Id.eq(id))
            .exec(&*self.connection)
            .await?;

        if result.rows_affected == 0 {
            return Err(not_found(&id));
        }
        Ok(())
    }

    async fn list_favicon_states(&self) -> RepositoryResult<Vec<SiteFaviconState>> {
        let rows = Sites::find()
            .select_only()
            .column(sites::Column::Id)
            .column(sites::Column::AllowedOrigin)
            .column(sites::Column::FaviconOrigin)
            .column(sites::Column::FaviconFetchedAt)
            .column(sites::Column::FaviconLastAttemptAt)
            .column_as(
                Expr::cust("CAST(LENGTH(favicon_data) AS BIGINT)"),
                "favicon_size",
            )
            .order_by_asc(sites::Column::CreatedAt)
            .into_model::<FaviconStateRow>()
            .all(&*self.connection)
            .await?;

        Ok(rows.into_iter().map(SiteFaviconState::from).collect())
    }
}
