mod server;

use anyhow::Result;
use clap::Parser;
use core::net::SocketAddr;
use dotenvy::dotenv;
use server::{RendererSettings, Server, Settings};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Arguments {
    /// Internet socket address that the server should be ran on.
    #[arg(
        long = "address",
        env = "EDGEFRONT_ADDRESS",
        default_value = "127.0.0.1:3000"
    )]
    address: SocketAddr,

    /// Maximum waiting time before incoming requests are aborted.
    #[arg(
        long = "request-timeout",
        env = "EDGEFRONT_REQUEST_TIMEOUT",
        default_value = "30s"
    )]
    request_timeout: humantime::Duration,

    /// Run in development mode: responses are never marked as cacheable.
    #[arg(long = "dev-mode", env = "EDGEFRONT_DEV_MODE", default_value_t = false)]
    dev_mode: bool,

    /// Path that requests for the bare root are redirected to.
    #[arg(
        long = "landing-path",
        env = "EDGEFRONT_LANDING_PATH",
        default_value = "/docs"
    )]
    landing_path: String,

    /// Path segment that marks requests for renderer-managed bundled assets.
    /// Such requests are never redirected and the renderer governs their caching.
    #[arg(
        long = "internal-asset-prefix",
        env = "EDGEFRONT_INTERNAL_ASSET_PREFIX",
        default_value = "/_next/"
    )]
    internal_asset_prefix: String,

    /// Substring of the Host header that identifies a local development deployment.
    /// Matching hosts get an http:// asset origin instead of https://.
    #[arg(
        long = "local-host-pattern",
        env = "EDGEFRONT_LOCAL_HOST_PATTERN",
        default_value = "localhost"
    )]
    local_host_pattern: String,

    /// Base URL of the rendering backend that page requests are delegated to.
    #[arg(long = "renderer-url", env = "EDGEFRONT_RENDERER_URL")]
    renderer_url: Url,

    /// Maximum waiting time before requests to the rendering backend are aborted.
    #[arg(
        long = "renderer-timeout",
        env = "EDGEFRONT_RENDERER_TIMEOUT",
        default_value = "10s"
    )]
    renderer_timeout: humantime::Duration,

    /// Allow invalid TLS certificates when talking to the rendering backend (DANGEROUS).
    #[arg(
        long = "renderer-allow-invalid-certs",
        env = "EDGEFRONT_RENDERER_ALLOW_INVALID_CERTS",
        default_value_t = false
    )]
    renderer_allow_invalid_certs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();

    if args.renderer_allow_invalid_certs {
        println!(
            "WARNING: Running with 'renderer_allow_invalid_certs' will allow a rendering backend with Invalid/Forged/No TLS certificates to be used, be careful."
        );
    }

    Server::new(Settings {
        request_timeout: *args.request_timeout,
        dev_mode: args.dev_mode,
        landing_path: args.landing_path,
        internal_asset_prefix: args.internal_asset_prefix,
        local_host_pattern: args.local_host_pattern,
        renderer_settings: RendererSettings {
            base_url: args.renderer_url,
            request_timeout: *args.renderer_timeout,
            allow_invalid_certs: args.renderer_allow_invalid_certs,
        },
    })?
    .start(&args.address)
    .await
}
