pub mod favicon;
pub mod scheduler;

pub use favicon::{
    FaviconEvent, FaviconResolver, FaviconSettings, FaviconSubscription, HttpFaviconResolver,
    ResolverSettings, SiteFaviconManager,
};
pub use scheduler::PeriodicScheduler;
