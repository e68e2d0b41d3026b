//! Error type definitions for the site favicon service

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Favicon resolution errors
    #[error("Favicon error: {0}")]
    Favicon(#[from] FaviconError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },
}

/// Favicon discovery errors
///
/// Every variant is a per-candidate failure: the resolver logs it and moves
/// on to the next candidate.
#[derive(Error, Debug)]
pub enum FaviconError {
    /// Origin could not be parsed or lacks a scheme/host
    #[error("Invalid origin '{origin}': {message}")]
    InvalidOrigin { origin: String, message: String },

    /// Transport-level failure (connect, TLS, timeout, redirect loop)
    #[error("Request failed for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Origin answered with an error status
    #[error("HTTP error: {status} - {url}")]
    HttpStatus { status: u16, url: String },

    /// Successful status with nothing in the body
    #[error("Empty response body: {url}")]
    EmptyBody { url: String },

    /// Icon or HTML payload exceeded its ceiling
    #[error("Payload too large: {url} exceeds {max_size} bytes")]
    PayloadTooLarge { url: String, max_size: usize },

    /// Content type is not an image (or could not be identified as one)
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// Malformed `data:` URL
    #[error("Invalid data URL: {message}")]
    InvalidDataUrl { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl FaviconError {
    pub fn invalid_origin<O: Into<String>, M: Into<String>>(origin: O, message: M) -> Self {
        Self::InvalidOrigin {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_data_url<S: Into<String>>(message: S) -> Self {
        Self::InvalidDataUrl {
            message: message.into(),
        }
    }

    pub fn unsupported_content_type<S: Into<String>>(content_type: S) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }

    /// Oversize payloads are hard failures for the candidate, never truncated
    pub fn is_oversize(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. })
    }
}
