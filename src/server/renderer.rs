use super::RendererSettings;
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Method, header},
    response::Response,
};
use core::time::Duration;
use url::Url;

/// Header carrying the per-request asset origin to the rendering backend.
/// Passed explicitly with every delegated request, never stored process-wide.
pub const ASSET_PREFIX_HEADER: &str = "x-asset-prefix";

/// Connection-level headers that must not be forwarded in either direction
/// (RFC 9110 section 7.6.1).
static HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A delegated page-render request.
pub struct RenderRequest {
    pub method: Method,
    /// Path plus raw query, exactly as received.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Body,
    /// Scheme+host prefix for absolute asset URLs on this request.
    pub origin: String,
}

/// The external collaborator that produces actual page content.
///
/// The filter treats rendering as opaque: implementations may set their own
/// status and headers, and the filter never writes a body of its own for
/// delegated requests.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> Result<Response>;
}

/// [`Renderer`] backed by a rendering framework running as its own HTTP
/// process, reached over a configured base URL.
pub struct UpstreamRenderer {
    client: reqwest::Client,
    base_url: Url,
}

impl UpstreamRenderer {
    pub fn new(settings: &RendererSettings) -> Result<Self> {
        let client = reqwest::ClientBuilder::default()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .danger_accept_invalid_certs(settings.allow_invalid_certs)
            .connect_timeout(Duration::from_secs(5))
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }
}

#[async_trait]
impl Renderer for UpstreamRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Response> {
        let target = self.base_url.join(&request.path_and_query)?;

        let mut headers = request.headers;
        // The client sets Host/Content-Length for the upstream connection itself.
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        for name in &HOP_BY_HOP_HEADERS {
            headers.remove(name);
        }

        let upstream = self
            .client
            .request(request.method, target)
            .headers(headers)
            .header(ASSET_PREFIX_HEADER, request.origin)
            .body(reqwest::Body::wrap_stream(request.body.into_data_stream()))
            .send()
            .await?;

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        for (name, value) in &upstream_headers {
            if !HOP_BY_HOP_HEADERS.contains(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }

        Ok(response)
    }
}
