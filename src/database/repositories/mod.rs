//! SeaORM repository implementations

pub mod site;
pub mod traits;

pub use site::SiteSeaOrmRepository;
pub use traits::SiteFaviconStore;
