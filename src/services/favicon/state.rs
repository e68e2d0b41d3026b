//! Per-site fetch eligibility
//!
//! The state is derived from persisted columns on every check; nothing here
//! is stored.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use super::origin::origins_match;
use crate::models::SiteFaviconState;

/// Where a site stands relative to its next favicon fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// No usable origin configured; nothing to probe
    MissingOrigin,
    /// No icon cached and no attempt waiting out its retry interval
    Unfetched,
    /// No icon cached; the last attempt is younger than the retry interval
    Cooling,
    /// Icon cached and younger than the refresh interval
    Fresh,
    /// Icon cached but older than the refresh interval
    Stale,
    /// Origin differs from the one the cached state was fetched from
    OriginChanged,
}

impl FetchState {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Unfetched | Self::Stale | Self::OriginChanged)
    }

    /// Origin changes bypass staleness checks and always notify
    pub fn is_forced(self) -> bool {
        self == Self::OriginChanged
    }
}

/// Intervals governing refresh and retry
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
}

pub fn classify(state: &SiteFaviconState, now: DateTime<Utc>, policy: &FreshnessPolicy) -> FetchState {
    if state.allowed_origin.trim().is_empty() {
        return FetchState::MissingOrigin;
    }

    let never_attempted = !state.has_favicon && state.favicon_last_attempt_at.is_none();
    if never_attempted {
        return FetchState::Unfetched;
    }

    if !origins_match(&state.favicon_origin, &state.allowed_origin) {
        return FetchState::OriginChanged;
    }

    if !state.has_favicon {
        return match state.favicon_last_attempt_at {
            Some(attempt) if within(now, attempt, policy.retry_interval) => FetchState::Cooling,
            _ => FetchState::Unfetched,
        };
    }

    match state.favicon_fetched_at {
        Some(fetched) if within(now, fetched, policy.refresh_interval) => FetchState::Fresh,
        _ => FetchState::Stale,
    }
}

pub fn should_fetch(state: &SiteFaviconState, now: DateTime<Utc>, policy: &FreshnessPolicy) -> bool {
    classify(state, now, policy).is_eligible()
}

fn within(now: DateTime<Utc>, since: DateTime<Utc>, interval: Duration) -> bool {
    let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(since) < interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const ORIGIN: &str = "https://example.com";

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy {
            refresh_interval: Duration::from_secs(24 * 3600),
            retry_interval: Duration::from_secs(30 * 60),
        }
    }

    fn state() -> SiteFaviconState {
        SiteFaviconState {
            id: Uuid::new_v4(),
            allowed_origin: ORIGIN.to_string(),
            favicon_origin: String::new(),
            has_favicon: false,
            favicon_fetched_at: None,
            favicon_last_attempt_at: None,
        }
    }

    #[test]
    fn test_never_fetched_is_eligible() {
        assert_eq!(classify(&state(), Utc::now(), &policy()), FetchState::Unfetched);
        assert!(should_fetch(&state(), Utc::now(), &policy()));
    }

    #[test]
    fn test_failed_attempt_cools_down_for_retry_interval() {
        let now = Utc::now();
        let mut site = state();
        site.favicon_origin = ORIGIN.to_string();
        site.favicon_last_attempt_at = Some(now - TimeDelta::minutes(10));

        assert_eq!(classify(&site, now, &policy()), FetchState::Cooling);
        assert!(!should_fetch(&site, now, &policy()));

        let later = now + TimeDelta::minutes(21);
        assert_eq!(classify(&site, later, &policy()), FetchState::Unfetched);
        assert!(should_fetch(&site, later, &policy()));
    }

    #[test]
    fn test_cached_icon_is_fresh_until_refresh_interval() {
        let now = Utc::now();
        let mut site = state();
        site.favicon_origin = ORIGIN.to_string();
        site.has_favicon = true;
        site.favicon_fetched_at = Some(now - TimeDelta::hours(1));
        site.favicon_last_attempt_at = site.favicon_fetched_at;

        assert_eq!(classify(&site, now, &policy()), FetchState::Fresh);
        assert!(!should_fetch(&site, now, &policy()));

        let later = now + TimeDelta::hours(23);
        assert_eq!(classify(&site, later, &policy()), FetchState::Stale);
        assert!(should_fetch(&site, later, &policy()));
    }

    #[test]
    fn test_origin_change_overrides_timestamps() {
        let now = Utc::now();
        let mut site = state();
        site.favicon_origin = "https://old.example.com".to_string();
        site.has_favicon = true;
        site.favicon_fetched_at = Some(now);
        site.favicon_last_attempt_at = Some(now);

        let fetch_state = classify(&site, now, &policy());
        assert_eq!(fetch_state, FetchState::OriginChanged);
        assert!(fetch_state.is_eligible());
        assert!(fetch_state.is_forced());

        // Cooling sites too
        site.has_favicon = false;
        site.favicon_fetched_at = None;
        assert_eq!(classify(&site, now, &policy()), FetchState::OriginChanged);
    }

    #[test]
    fn test_origin_comparison_ignores_case() {
        let now = Utc::now();
        let mut site = state();
        site.favicon_origin = "HTTPS://EXAMPLE.COM".to_string();
        site.has_favicon = true;
        site.favicon_fetched_at = Some(now);
        site.favicon_last_attempt_at = Some(now);
        assert_eq!(classify(&site, now, &policy()), FetchState::Fresh);
    }

    #[test]
    fn test_blank_origin_is_never_eligible() {
        let mut site = state();
        site.allowed_origin = "   ".to_string();
        assert_eq!(classify(&site, Utc::now(), &policy()), FetchState::MissingOrigin);
        assert!(!should_fetch(&site, Utc::now(), &policy()));
    }

    #[test]
    fn test_icon_without_timestamp_is_stale() {
        let mut site = state();
        site.favicon_origin = ORIGIN.to_string();
        site.has_favicon = true;
        assert_eq!(classify(&site, Utc::now(), &policy()), FetchState::Stale);
    }
}
