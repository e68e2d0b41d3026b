//! Favicon discovery and caching for tenant sites

pub mod content_type;
pub mod data_url;
pub mod events;
pub mod html;
pub mod manager;
pub mod origin;
pub mod resolver;
pub mod state;

pub use events::{FaviconEvent, FaviconSubscription, favicon_url};
pub use manager::{FaviconSettings, SiteFaviconManager};
pub use origin::NormalizedOrigin;
pub use resolver::{FaviconResolver, HttpFaviconResolver, ResolverSettings};
pub use state::{FetchState, FreshnessPolicy, classify, should_fetch};
