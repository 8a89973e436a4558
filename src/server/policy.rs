//! The cache/auth decision table.
//!
//! Exactly one [`CacheDecision`] is computed per delegated request and it
//! fully determines the `Set-Cookie`/`Cache-Control` headers this layer
//! emits. No other module writes these headers.

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::{Cookie, time::Duration};

/// Cookie whose presence marks the client as authenticated.
pub const AUTH_COOKIE: &str = "token";

/// Cookie forcing one cache-skipping transition when authentication state changes.
///
/// Without it a freshly-logged-out client could be served a stale cache entry
/// captured while authenticated.
pub const BYPASS_COOKIE: &str = "_now_no_cache";

/// Lifetime of the bypass cookie: 20 years in seconds. A client that was ever
/// authenticated keeps skipping the shared cache even long after logout.
pub const BYPASS_COOKIE_MAX_AGE_SECS: i64 = 20 * 365 * 24 * 60 * 60;

const CACHE_CONTROL_NO_CACHE: &str = "public,s-maxage=0";

/// The CDN caches cacheable pages for one hour.
const CACHE_CONTROL_CACHEABLE: &str = "public,s-maxage=3600";

/// Per-request facts the decision is derived from.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput {
    /// Process-wide development flag.
    pub dev_mode: bool,
    /// Client presented the authentication cookie.
    pub authenticated: bool,
    /// Client presented the bypass cookie.
    pub bypass_flag_set: bool,
    /// Path contains the internal-asset marker.
    pub internal_asset: bool,
}

/// Outcome of the decision table. Each variant maps to a fixed set of headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Authenticated without the bypass flag: set the bypass cookie and
    /// forbid shared caching.
    NoCacheAuthenticated,
    /// No longer authenticated but the bypass flag lingers while still on the
    /// no-cache branch (dev mode or internal asset): clear the flag, emit no
    /// cache-control.
    NoCacheClearBypass,
    /// No-cache branch with cookies already consistent: the renderer (or the
    /// dev/asset handling inside it) governs caching.
    NoCachePassthrough,
    /// Anonymous steady state: shared caches may hold the page for an hour.
    CachePublic,
    /// Anonymous but the bypass flag lingers: clear it and cache publicly.
    CachePublicClearBypass,
}

/// Evaluate the decision table. Rows are checked in order, first match wins.
pub fn decide(input: PolicyInput) -> CacheDecision {
    if input.dev_mode || input.authenticated || input.internal_asset {
        if input.authenticated && !input.bypass_flag_set {
            CacheDecision::NoCacheAuthenticated
        } else if !input.authenticated && input.bypass_flag_set {
            CacheDecision::NoCacheClearBypass
        } else {
            CacheDecision::NoCachePassthrough
        }
    } else if input.bypass_flag_set {
        CacheDecision::CachePublicClearBypass
    } else {
        CacheDecision::CachePublic
    }
}

/// Emit the headers a decision stands for.
pub fn apply(decision: CacheDecision, headers: &mut HeaderMap) {
    match decision {
        CacheDecision::NoCacheAuthenticated => {
            append_set_cookie(headers, set_bypass_cookie());
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
            );
        }
        CacheDecision::NoCacheClearBypass => {
            append_set_cookie(headers, clear_bypass_cookie());
        }
        CacheDecision::NoCachePassthrough => {}
        CacheDecision::CachePublic => {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_CACHEABLE),
            );
        }
        CacheDecision::CachePublicClearBypass => {
            append_set_cookie(headers, clear_bypass_cookie());
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_CACHEABLE),
            );
        }
    }
}

fn set_bypass_cookie() -> Cookie<'static> {
    Cookie::build((BYPASS_COOKIE, "1"))
        .path("/")
        .max_age(Duration::seconds(BYPASS_COOKIE_MAX_AGE_SECS))
        .build()
}

fn clear_bypass_cookie() -> Cookie<'static> {
    Cookie::build((BYPASS_COOKIE, "0"))
        .path("/")
        .max_age(Duration::seconds(0))
        .build()
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: Cookie<'_>) {
    // Cookie names and values here are fixed ASCII constants.
    let value = HeaderValue::try_from(cookie.to_string())
        .expect("bypass cookie serializes to a valid header value");
    headers.append(header::SET_COOKIE, value);
}
