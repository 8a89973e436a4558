use super::{AppState, pipeline, pipeline::RequestContext, renderer::RenderRequest};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Catch-all handler: run the stage pipeline and, unless a stage already
/// answered the request, delegate it to the rendering backend.
pub async fn edge_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let mut ctx = RequestContext::from_parts(&parts);
    if let Some(response) = pipeline::run(&state.settings, &mut ctx) {
        return response;
    }

    let render_request = RenderRequest {
        method: parts.method.clone(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned()),
        headers: parts.headers.clone(),
        body,
        origin: ctx.origin.clone().unwrap_or_default(),
    };

    match state.renderer.render(render_request).await {
        Ok(mut response) => {
            merge_policy_headers(&ctx.response_headers, response.headers_mut());
            response
        }
        Err(err) => {
            warn!("Rendering backend failed to handle request: {err}");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Fold the policy stage's headers into the renderer's response.
/// `Set-Cookie` values are appended. For `Cache-Control` the renderer wins
/// when it set one itself, it governs caching for its internal assets.
fn merge_policy_headers(policy: &HeaderMap, response: &mut HeaderMap) {
    for value in policy.get_all(header::SET_COOKIE) {
        response.append(header::SET_COOKIE, value.clone());
    }
    if !response.contains_key(header::CACHE_CONTROL) {
        if let Some(value) = policy.get(header::CACHE_CONTROL) {
            response.insert(header::CACHE_CONTROL, value.clone());
        }
    }
}
