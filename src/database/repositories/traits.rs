//! Storage seam used by the favicon manager

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RepositoryResult;
use crate::models::{FaviconUpdate, Site, SiteFaviconState};

/// Record store holding per-site favicon state.
///
/// The manager only ever writes the favicon columns, and only through
/// [`SiteFaviconStore::update_favicon`].
#[async_trait]
pub trait SiteFaviconStore: Send + Sync {
    /// Load a single site; a missing record is `Ok(None)`
    async fn find_site(&self, id: Uuid) -> RepositoryResult<Option<Site>>;

    /// Write the favicon columns of one site without touching anything else
    async fn update_favicon(&self, id: Uuid, update: &FaviconUpdate) -> RepositoryResult<()>;

    /// Eligibility view of every site, without icon bytes
    async fn list_favicon_states(&self) -> RepositoryResult<Vec<SiteFaviconState>>;
}
