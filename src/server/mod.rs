//! Edge request policy filter placed in front of a rendering backend.

#[cfg(feature = "rustls-tls")]
#[cfg(feature = "native-tls")]
compile_error!("You can only enable one TLS backend");

mod cookies;
mod handler;
mod pipeline;
mod policy;
mod renderer;

use anyhow::Result;
use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self as axum_middleware, Next},
    response::Response,
};
use core::{net::SocketAddr, time::Duration};
use renderer::{Renderer, UpstreamRenderer};
use reqwest::header;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer,
    timeout::TimeoutLayer,
    trace::{self, TraceLayer},
};
use tracing::{Level, info};
use url::Url;

#[derive(Debug)]
pub struct Server {
    router_inner: Router,
}

/// Settings to run the edge filter with.
#[derive(Debug, Clone)]
pub struct Settings {
    /// How long a request may be processed for before it is abandoned.
    pub request_timeout: Duration,

    /// Whether the server is running in development mode.
    /// In development no response is ever marked as cacheable.
    pub dev_mode: bool,

    /// Path that requests for `/` are redirected to.
    pub landing_path: String,

    /// Path segment reserved for renderer-managed bundled assets.
    /// Requests containing it are never redirected and take the no-cache branch.
    pub internal_asset_prefix: String,

    /// Substring of the Host header identifying a local development deployment.
    pub local_host_pattern: String,

    /// See [`RendererSettings`].
    pub renderer_settings: RendererSettings,
}

/// Configuration options for the rendering backend that page requests are delegated to.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Base URL of the rendering backend.
    pub base_url: Url,

    /// How long to wait for the rendering backend before a delegated request is considered failed.
    pub request_timeout: Duration,

    /// Whether to allow invalid/expired/forged TLS certificates on the rendering backend.
    ///
    /// **Enabling this is dangerous and is usually not necessary.**
    pub allow_invalid_certs: bool,
}

struct AppState {
    renderer: Arc<dyn Renderer>,
    settings: Settings,
}

impl Server {
    /// Create a new server with the provided settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let renderer = Arc::new(UpstreamRenderer::new(&settings.renderer_settings)?);
        Ok(Self {
            router_inner: Self::build_router(settings, renderer),
        })
    }

    fn build_router(settings: Settings, renderer: Arc<dyn Renderer>) -> Router {
        // Every path goes through the same pipeline, so a single catch-all
        // route stands in for a routing table.
        Router::new()
            .fallback(handler::edge_handler)
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(TimeoutLayer::new(settings.request_timeout))
            .layer(CatchPanicLayer::new())
            .layer(axum_middleware::from_fn(Self::header_middleware))
            .with_state(Arc::new(AppState { renderer, settings }))
    }

    /// Start the server and expose it locally on the provided [`SocketAddr`].
    pub async fn start(self, address: &SocketAddr) -> Result<()> {
        let tcp_listener = TcpListener::bind(&address).await?;
        info!("Listening on http://{}", tcp_listener.local_addr()?);
        axum::serve(tcp_listener, self.router_inner)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await?;
        Ok(())
    }

    // https://github.com/tokio-rs/axum/blob/15917c6dbcb4a48707a20e9cfd021992a279a662/examples/graceful-shutdown/src/main.rs#L55
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    async fn header_middleware(request: Request, next: Next) -> Response {
        let mut response = next.run(request).await;
        response.headers_mut().append(
            header::SERVER,
            HeaderValue::from_static(env!("CARGO_PKG_NAME")),
        );
        response
    }
}
