//! Favicon discovery, caching and refresh for multi-tenant dashboards.
//!
//! Each tenant site has an external web origin. [`SiteFaviconManager`]
//! decides when a site's icon needs (re)fetching, runs the fetch through a
//! [`FaviconResolver`], stores the result on the site record and notifies
//! live subscribers.
//!
//! [`SiteFaviconManager`]: services::SiteFaviconManager
//! [`FaviconResolver`]: services::FaviconResolver

pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod models;
pub mod observability;
pub mod services;
