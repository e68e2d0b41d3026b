use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant site as seen by the favicon pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    /// Canonical web origin of the tenant; this is what gets probed
    pub allowed_origin: String,
    /// Origin in effect when the favicon was last fetched or attempted
    pub favicon_origin: String,
    /// Cached icon bytes, empty when nothing has been fetched yet
    #[serde(skip)]
    pub favicon_data: Vec<u8>,
    pub favicon_content_type: String,
    pub favicon_fetched_at: Option<DateTime<Utc>>,
    pub favicon_last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn has_favicon(&self) -> bool {
        !self.favicon_data.is_empty()
    }

    /// Project the columns the eligibility check needs
    pub fn favicon_state(&self) -> SiteFaviconState {
        SiteFaviconState {
            id: self.id,
            allowed_origin: self.allowed_origin.clone(),
            favicon_origin: self.favicon_origin.clone(),
            has_favicon: self.has_favicon(),
            favicon_fetched_at: self.favicon_fetched_at,
            favicon_last_attempt_at: self.favicon_last_attempt_at,
        }
    }
}

/// Reduced view of a site used by staleness scans; never carries icon bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFaviconState {
    pub id: Uuid,
    pub allowed_origin: String,
    pub favicon_origin: String,
    pub has_favicon: bool,
    pub favicon_fetched_at: Option<DateTime<Utc>>,
    pub favicon_last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCreateRequest {
    pub name: String,
    pub allowed_origin: String,
}

/// Icon bytes obtained by a resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconAsset {
    pub data: Vec<u8>,
    pub content_type: String,
    /// Where the bytes came from (`data:` URIs are reported verbatim)
    pub source_url: String,
}

/// Partial update of the favicon columns after one attempt.
///
/// The origin and attempt time are always written; the icon columns only
/// when new bytes were obtained.
#[derive(Debug, Clone)]
pub struct FaviconUpdate {
    pub favicon_origin: String,
    pub last_attempt_at: DateTime<Utc>,
    pub fetched: Option<FetchedFavicon>,
}

#[derive(Debug, Clone)]
pub struct FetchedFavicon {
    pub data: Vec<u8>,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
}

impl FaviconUpdate {
    pub fn attempted(origin: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            favicon_origin: origin.into(),
            last_attempt_at: at,
            fetched: None,
        }
    }

    pub fn with_asset(mut self, asset: FaviconAsset) -> Self {
        self.fetched = Some(FetchedFavicon {
            data: asset.data,
            content_type: asset.content_type,
            fetched_at: self.last_attempt_at,
        });
        self
    }
}
