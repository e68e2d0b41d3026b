//! Origin probing for favicons
//!
//! Two strategies run in order:
//! 1. `GET {root}/favicon.ico`
//! 2. HTML-declared `<link rel="...icon...">` candidates on a list of likely
//!    pages, stopping at the first candidate that yields a valid icon.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

use super::content_type::accept_content_type;
use super::data_url::{decode_data_url, is_data_url};
use super::html::extract_icon_links;
use super::origin::NormalizedOrigin;
use crate::config::FaviconConfig;
use crate::errors::{AppError, AppResult, FaviconError, FaviconResult};
use crate::models::FaviconAsset;

/// Capability to discover a site's favicon.
///
/// `Ok(None)` means the origin was probed and offers no usable icon; an
/// error means the last attempted candidate failed.
#[async_trait]
pub trait FaviconResolver: Send + Sync {
    /// Resolve only the icon URL, with outcomes cached per origin
    async fn resolve(&self, origin: &str) -> FaviconResult<Option<String>>;

    /// Fetch the icon bytes; never cached at this layer
    async fn resolve_asset(&self, origin: &str) -> FaviconResult<Option<FaviconAsset>>;
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub http_timeout: Duration,
    pub max_redirects: usize,
    pub max_icon_bytes: usize,
    pub max_html_bytes: usize,
    pub resolve_cache_ttl: Duration,
    pub user_agent: String,
}

impl From<&FaviconConfig> for ResolverSettings {
    fn from(config: &FaviconConfig) -> Self {
        Self {
            http_timeout: config.http_timeout,
            max_redirects: config.max_redirects,
            max_icon_bytes: config.max_icon_bytes,
            max_html_bytes: config.max_html_bytes,
            resolve_cache_ttl: config.resolve_cache_ttl,
            user_agent: config.user_agent(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&FaviconConfig::default())
    }
}

#[derive(Debug, Clone)]
struct CachedResolution {
    url: Option<String>,
    expires_at: Instant,
}

/// HTTP resolver backed by a single shared `reqwest` client
pub struct HttpFaviconResolver {
    client: Client,
    settings: ResolverSettings,
    cache: RwLock<HashMap<String, CachedResolution>>,
}

impl HttpFaviconResolver {
    pub fn new(settings: ResolverSettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .connect_timeout(settings.http_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Forget every cached URL resolution
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.read().len()
    }

    fn cached(&self, key: &str) -> Option<Option<String>> {
        let cache = self.cache.read();
        cache
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.url.clone())
    }

    async fn discover(&self, origin: &NormalizedOrigin) -> FaviconResult<Option<FaviconAsset>> {
        let mut attempted: HashSet<String> = HashSet::new();

        let default_url = origin.default_icon_url()?;
        attempted.insert(default_url.to_string());
        match self.fetch_icon(&default_url).await {
            Ok(asset) => {
                debug!("Found default favicon for {}", origin.key());
                return Ok(Some(asset));
            }
            Err(e) => debug!("Default favicon unavailable for {}: {}", origin.key(), e),
        }

        let mut last_error: Option<FaviconError> = None;
        for page in origin.candidate_pages() {
            let (page_url, html) = match self.fetch_html(&page).await {
                Ok(result) => result,
                Err(e) => {
                    trace!("Skipping page {}: {}", page, e);
                    continue;
                }
            };

            for href in extract_icon_links(&html) {
                let key = if is_data_url(&href) {
                    href.clone()
                } else {
                    match page_url.join(&href) {
                        Ok(url) => url.to_string(),
                        Err(_) => href.clone(),
                    }
                };
                if !attempted.insert(key) {
                    continue;
                }

                match self.fetch_candidate(&page_url, &href).await {
                    Ok(asset) => {
                        debug!("Found declared favicon for {} on {}", origin.key(), page_url);
                        return Ok(Some(asset));
                    }
                    Err(e) => {
                        debug!("Icon candidate '{}' on {} failed: {}", truncate(&href), page_url, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn fetch_candidate(&self, page_url: &Url, href: &str) -> FaviconResult<FaviconAsset> {
        if is_data_url(href) {
            return decode_data_url(href, self.settings.max_icon_bytes);
        }

        let url = page_url
            .join(href)
            .map_err(|e| FaviconError::invalid_origin(href, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FaviconError::invalid_origin(
                href,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        self.fetch_icon(&url).await
    }

    async fn fetch_icon(&self, url: &Url) -> FaviconResult<FaviconAsset> {
        let response = self.get(url).await?;
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();

        let data = read_limited(response, self.settings.max_icon_bytes, url).await?;
        if data.is_empty() {
            return Err(FaviconError::EmptyBody {
                url: url.to_string(),
            });
        }

        let content_type = accept_content_type(declared.as_deref(), &data)?;
        Ok(FaviconAsset {
            data,
            content_type,
            source_url: final_url,
        })
    }

    /// Fetch an HTML page, returning the final URL after redirects
    async fn fetch_html(&self, url: &Url) -> FaviconResult<(Url, String)> {
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let body = read_limited(response, self.settings.max_html_bytes, url).await?;
        Ok((final_url, String::from_utf8_lossy(&body).into_owned()))
    }

    async fn get(&self, url: &Url) -> FaviconResult<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FaviconError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FaviconError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// Read a response body, failing as soon as it grows past `max_bytes`
async fn read_limited(mut response: Response, max_bytes: usize, url: &Url) -> FaviconResult<Vec<u8>> {
    let too_large = || FaviconError::PayloadTooLarge {
        url: url.to_string(),
        max_size: max_bytes,
    };

    if let Some(length) = response.content_length()
        && length > max_bytes as u64
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| FaviconError::Request {
            url: url.to_string(),
            source,
        })?
    {
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Keep inline `data:` URIs from flooding the logs
fn truncate(href: &str) -> &str {
    match href.char_indices().nth(64) {
        Some((idx, _)) => &href[..idx],
        None => href,
    }
}

#[async_trait]
impl FaviconResolver for HttpFaviconResolver {
    async fn resolve(&self, origin: &str) -> FaviconResult<Option<String>> {
        let normalized = NormalizedOrigin::parse(origin)?;
        let key = normalized.key();

        if let Some(hit) = self.cached(&key) {
            trace!("Resolve cache hit for {}", key);
            return Ok(hit);
        }

        let url = match self.discover(&normalized).await {
            Ok(asset) => asset.map(|a| a.source_url),
            Err(e) => {
                debug!("Favicon resolution failed for {}: {}", key, e);
                None
            }
        };

        self.cache.write().insert(
            key,
            CachedResolution {
                url: url.clone(),
                expires_at: Instant::now() + self.settings.resolve_cache_ttl,
            },
        );
        Ok(url)
    }

    async fn resolve_asset(&self, origin: &str) -> FaviconResult<Option<FaviconAsset>> {
        let normalized = NormalizedOrigin::parse(origin)?;
        self.discover(&normalized).await
    }
}
