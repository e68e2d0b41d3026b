//! Origin normalization and candidate page enumeration

use url::Url;

use crate::errors::{FaviconError, FaviconResult};

/// Pages probed for `<link rel="icon">` after the origin's own path
const FALLBACK_PAGES: &[&str] = &["/", "/index.html", "/app", "/login"];

/// A parsed tenant origin: the bare root plus the path it was configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOrigin {
    root: Url,
    path: String,
}

impl NormalizedOrigin {
    /// Parse an origin, requiring an http(s) scheme and a host.
    ///
    /// Query and fragment are discarded; the path is kept only to seed the
    /// HTML candidate list.
    pub fn parse(raw: &str) -> FaviconResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FaviconError::invalid_origin(raw, "origin is empty"));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| FaviconError::invalid_origin(raw, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(FaviconError::invalid_origin(
                raw,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(FaviconError::invalid_origin(raw, "origin has no host"));
        }

        let path = url.path().to_string();
        let mut root = url;
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        // Credentials never leave the configuration
        let _ = root.set_username("");
        let _ = root.set_password(None);

        Ok(Self { root, path })
    }

    /// `scheme://host[:port]/`
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Stable key for caches: the root without its trailing slash
    pub fn key(&self) -> String {
        self.root.as_str().trim_end_matches('/').to_string()
    }

    pub fn default_icon_url(&self) -> FaviconResult<Url> {
        self.join("/favicon.ico")
    }

    /// Ordered, de-duplicated pages to inspect for declared icons: the
    /// configured path and its parents first, then the common entry pages.
    pub fn candidate_pages(&self) -> Vec<Url> {
        let mut paths: Vec<String> = Vec::new();

        let segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        for end in (1..=segments.len()).rev() {
            paths.push(format!("/{}", segments[..end].join("/")));
        }
        paths.extend(FALLBACK_PAGES.iter().map(|p| (*p).to_string()));

        let mut pages: Vec<Url> = Vec::with_capacity(paths.len());
        for path in paths {
            if let Ok(url) = self.join(&path)
                && !pages.contains(&url)
            {
                pages.push(url);
            }
        }
        pages
    }

    fn join(&self, path: &str) -> FaviconResult<Url> {
        self.root
            .join(path)
            .map_err(|e| FaviconError::invalid_origin(self.root.as_str(), e.to_string()))
    }
}

/// Compare two stored origins the way eligibility checks do: trimmed,
/// case-insensitive, ignoring a trailing slash.
pub fn origins_match(a: &str, b: &str) -> bool {
    let a = a.trim().trim_end_matches('/');
    let b = b.trim().trim_end_matches('/');
    a.eq_ignore_ascii_case(b)
}
