//! Ordered per-request decision pipeline.
//!
//! Each stage inspects the [`RequestContext`] and either terminates the
//! request with a ready response (redirects) or lets it continue, possibly
//! after mutating the context. The runner applies stages in a fixed order;
//! requests that survive every stage are delegated to the renderer.

use super::{Settings, cookies::CookieJar, policy};
use axum::{
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};

/// What a stage decided to do with the request.
pub enum StageOutcome {
    /// Hand the (possibly mutated) context to the next stage.
    Continue,
    /// Terminate the request with this response; later stages never run.
    Done(Response),
}

type Stage = fn(&Settings, &mut RequestContext) -> StageOutcome;

/// Stages in delegation order: slash normalization, origin selection,
/// cache policy.
const STAGES: &[Stage] = &[normalize_path, select_origin, apply_cache_policy];

/// Transient per-request state threaded through the stages.
/// Constructed at request receive time, discarded once the response is sent.
pub struct RequestContext {
    pub path: String,
    pub raw_query: Option<String>,
    pub host: String,
    pub cookies: CookieJar,
    /// Scheme+host prefix the renderer uses for absolute asset URLs,
    /// populated by [`select_origin`].
    pub origin: Option<String>,
    /// Headers the policy stage decided on, merged into the renderer's
    /// response by the handler.
    pub response_headers: HeaderMap,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            path: parts.uri.path().to_owned(),
            raw_query: parts.uri.query().map(str::to_owned),
            host: parts
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
            cookies: CookieJar::from_headers(&parts.headers),
            origin: None,
            response_headers: HeaderMap::new(),
        }
    }

    fn is_internal_asset(&self, settings: &Settings) -> bool {
        self.path.contains(&settings.internal_asset_prefix)
    }
}

/// Run the full pipeline. `None` means the request should be delegated to
/// the renderer with whatever state the stages left in the context.
pub fn run(settings: &Settings, ctx: &mut RequestContext) -> Option<Response> {
    for stage in STAGES {
        if let StageOutcome::Done(response) = stage(settings, ctx) {
            return Some(response);
        }
    }
    None
}

/// Strip one trailing slash from non-root paths with a permanent redirect,
/// preserving the query string verbatim. Internal asset paths pass through
/// untouched, the renderer manages their URLs itself.
fn normalize_path(settings: &Settings, ctx: &mut RequestContext) -> StageOutcome {
    if ctx.is_internal_asset(settings) {
        return StageOutcome::Continue;
    }

    if ctx.path != "/" && ctx.path.ends_with('/') {
        let mut location = ctx.path[..ctx.path.len() - 1].to_owned();
        if let Some(query) = ctx.raw_query.as_deref().filter(|q| !q.is_empty()) {
            location.push('?');
            location.push_str(query);
        }
        return StageOutcome::Done(redirect(StatusCode::MOVED_PERMANENTLY, &location));
    }

    StageOutcome::Continue
}

/// Derive the public origin the renderer should prefix asset URLs with.
/// Local development hosts are plain http; everything else sits behind TLS
/// termination and must be advertised as https.
fn select_origin(settings: &Settings, ctx: &mut RequestContext) -> StageOutcome {
    let scheme = if ctx.host.contains(&settings.local_host_pattern) {
        "http"
    } else {
        "https"
    };
    ctx.origin = Some(format!("{scheme}://{}", ctx.host));
    StageOutcome::Continue
}

/// Redirect the bare root to the landing page, otherwise run the decision
/// table and record its headers for the handler to merge after rendering.
fn apply_cache_policy(settings: &Settings, ctx: &mut RequestContext) -> StageOutcome {
    if ctx.path == "/" {
        // 302 rather than 301 so browsers do not cache the redirect forever.
        return StageOutcome::Done(redirect(StatusCode::FOUND, &settings.landing_path));
    }

    let decision = policy::decide(policy::PolicyInput {
        dev_mode: settings.dev_mode,
        authenticated: ctx.cookies.contains(policy::AUTH_COOKIE),
        bypass_flag_set: ctx.cookies.contains(policy::BYPASS_COOKIE),
        internal_asset: ctx.is_internal_asset(settings),
    });
    policy::apply(decision, &mut ctx.response_headers);
    StageOutcome::Continue
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match axum::http::HeaderValue::try_from(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        // The original URL made it through axum's URI parsing, but reject
        // anything that still cannot be a header value instead of panicking.
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{RendererSettings, Settings};
    use axum::http::{Request, StatusCode, header};
    use core::time::Duration;

    fn settings(dev_mode: bool) -> Settings {
        Settings {
            request_timeout: Duration::from_secs(30),
            dev_mode,
            landing_path: "/docs".to_owned(),
            internal_asset_prefix: "/_next/".to_owned(),
            local_host_pattern: "localhost".to_owned(),
            renderer_settings: RendererSettings {
                base_url: url::Url::parse("http://127.0.0.1:3001").unwrap(),
                request_timeout: Duration::from_secs(10),
                allow_invalid_certs: false,
            },
        }
    }

    fn context(uri: &str, host: &str, cookies: &str) -> RequestContext {
        let mut builder = Request::builder().uri(uri).header(header::HOST, host);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        RequestContext::from_parts(&parts)
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[test]
    fn test_trailing_slash_redirects_permanently() {
        let mut ctx = context("/docs/", "example.com", "");
        let StageOutcome::Done(response) = normalize_path(&settings(false), &mut ctx) else {
            panic!("expected a redirect");
        };
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&response), "/docs");
    }

    #[test]
    fn test_trailing_slash_redirect_preserves_query() {
        let mut ctx = context("/docs/?a=1&a=2&b", "example.com", "");
        let StageOutcome::Done(response) = normalize_path(&settings(false), &mut ctx) else {
            panic!("expected a redirect");
        };
        assert_eq!(location(&response), "/docs?a=1&a=2&b");
    }

    #[test]
    fn test_root_is_never_slash_trimmed() {
        let mut ctx = context("/", "example.com", "");
        assert!(matches!(
            normalize_path(&settings(false), &mut ctx),
            StageOutcome::Continue
        ));
    }

    #[test]
    fn test_internal_assets_are_never_redirected() {
        let mut ctx = context("/_next/static/chunks/", "example.com", "");
        assert!(matches!(
            normalize_path(&settings(false), &mut ctx),
            StageOutcome::Continue
        ));
    }

    #[test]
    fn test_plain_path_passes_through() {
        let mut ctx = context("/docs", "example.com", "");
        assert!(matches!(
            normalize_path(&settings(false), &mut ctx),
            StageOutcome::Continue
        ));
    }

    #[test]
    fn test_local_host_gets_http_origin() {
        let mut ctx = context("/docs", "localhost:3000", "");
        select_origin(&settings(false), &mut ctx);
        assert_eq!(ctx.origin.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_public_host_gets_https_origin() {
        let mut ctx = context("/docs", "docs.example.com", "");
        select_origin(&settings(false), &mut ctx);
        assert_eq!(ctx.origin.as_deref(), Some("https://docs.example.com"));
    }

    #[test]
    fn test_root_redirects_to_landing_path() {
        let mut ctx = context("/", "example.com", "token=x; _now_no_cache=1");
        let StageOutcome::Done(response) = apply_cache_policy(&settings(true), &mut ctx) else {
            panic!("expected a redirect");
        };
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/docs");
    }

    #[test]
    fn test_policy_headers_accumulate_in_context() {
        let mut ctx = context("/docs", "example.com", "token=x");
        assert!(matches!(
            apply_cache_policy(&settings(false), &mut ctx),
            StageOutcome::Continue
        ));
        assert_eq!(
            ctx.response_headers.get(header::CACHE_CONTROL).unwrap(),
            "public,s-maxage=0"
        );
        assert_eq!(
            ctx.response_headers.get(header::SET_COOKIE).unwrap(),
            "_now_no_cache=1; Path=/; Max-Age=630720000"
        );
    }

    #[test]
    fn test_run_stops_at_first_terminating_stage() {
        let mut ctx = context("/docs/", "example.com", "token=x");
        let response = run(&settings(false), &mut ctx).expect("redirect expected");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        // The policy stage never ran, so no headers accumulated.
        assert!(ctx.response_headers.is_empty());
    }

    #[test]
    fn test_run_delegates_plain_requests() {
        let mut ctx = context("/docs", "docs.example.com", "");
        assert!(run(&settings(false), &mut ctx).is_none());
        assert_eq!(ctx.origin.as_deref(), Some("https://docs.example.com"));
        assert_eq!(
            ctx.response_headers.get(header::CACHE_CONTROL).unwrap(),
            "public,s-maxage=3600"
        );
    }
}
