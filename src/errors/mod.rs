//! Centralized error handling for the site favicon service
//!
//! # Error Categories
//!
//! - **Favicon Errors**: origin probing, payload ceilings, content-type and
//!   `data:` URL decoding failures. These never reach `schedule_fetch`
//!   callers; the manager absorbs and logs them.
//! - **Repository Errors**: persistence failures on the site record store
//! - **Application Errors**: configuration and startup/shutdown failures
//!   surfaced to the embedding application
//!
//! # Usage
//!
//! ```rust
//! use site_favicons::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for resolver Results
pub type FaviconResult<T> = Result<T, FaviconError>;
