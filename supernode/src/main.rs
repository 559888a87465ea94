use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use supernode::{api, config::DOWNLOAD_HOME, Config};

const MIB: u64 = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(version, about = "Coordinates peer to peer file distribution")]
struct Args {

    #[arg(long, default_value_t = 8002, help = "Port the api listens on")]
    port: u16,

    #[arg(long, default_value_t = 8001, help = "Port peers download cached files from")]
    download_port: u16,

    #[arg(long, default_value = "/home/admin/supernode", help = "Working directory")]
    home_dir: PathBuf,

    #[arg(long, help = "Where cached files are stored, defaults to <home-dir>/repo")]
    download_path: Option<PathBuf>,

    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST, help = "Address advertised to peers")]
    advertise_ip: Ipv4Addr,

    #[arg(long, default_value_t = 20, help = "Bandwidth left to the system, MiB/s")]
    system_bandwidth: u64,

    #[arg(long, default_value_t = 200, help = "Total bandwidth of the supernode, MiB/s")]
    max_bandwidth: u64,

    #[arg(long, default_value_t = 10, help = "Cdn downloads running at once")]
    pool_size: usize,

    #[arg(long, help = "Enable profiling")]
    profiler: bool,

    #[arg(long, help = "Debug logging")]
    debug: bool,

    #[arg(long, default_value_t = 5, help = "Uploads a single peer serves at once")]
    up_limit: i32,

    #[arg(long, default_value_t = 4, help = "Pieces a single client downloads at once")]
    down_limit: i32,

}

impl Args {

    fn into_config(self) -> Config {
        let mut config = Config::default();
        config.listen_port = self.port;
        config.download_port = self.download_port;
        config.download_path = self.download_path.unwrap_or_else(|| self.home_dir.join("repo"));
        config.home_dir = self.home_dir;
        config.advertise_ip = self.advertise_ip;
        config.system_reserved_bandwidth = self.system_bandwidth * MIB;
        config.max_bandwidth = self.max_bandwidth * MIB;
        config.scheduler_core_pool_size = self.pool_size;
        config.enable_profiler = self.profiler;
        config.debug = self.debug;
        config.peer_up_limit = self.up_limit;
        config.peer_down_limit = self.down_limit;
        config
    }

}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();

    let config = args.into_config();
    tracing::debug!("starting with {:?}", config);
    let api_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
    let download_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.download_port));
    let download_home = config.download_home();

    let handle = match supernode::start(config) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("failed to start supernode: {}", e);
            std::process::exit(1);
        },
    };
    let cancel = handle.cancel_token();

    if let Err(e) = tokio::fs::create_dir_all(&download_home).await {
        tracing::error!("failed to create {}: {}", download_home.display(), e);
        std::process::exit(1);
    }
    let api_listener = match tokio::net::TcpListener::bind(api_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind api on {}: {}", api_addr, e);
            std::process::exit(1);
        },
    };
    let download_listener = match tokio::net::TcpListener::bind(download_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind download server on {}: {}", download_addr, e);
            std::process::exit(1);
        },
    };

    let api = api::router(handle.node());
    let downloads = axum::Router::new().nest_service(&format!("/{}", DOWNLOAD_HOME), ServeDir::new(download_home));
    tracing::info!("api listening on {}, downloads served on {}", api_addr, download_addr);

    let api_server = tokio::spawn(serve(api_listener, api, cancel.clone()));
    let download_server = tokio::spawn(serve(download_listener, downloads, cancel.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
        _ = cancel.cancelled() => {},
    }
    cancel.cancel();
    for server in [api_server, download_server] {
        if let Err(e) = server.await {
            tracing::error!("server task failed: {}", e);
        }
    }
    if let Err(e) = handle.shutdown().await {
        tracing::error!("failed to stop supernode: {}", e);
        std::process::exit(1);
    }
}

async fn serve(listener: tokio::net::TcpListener, app: axum::Router, cancel: CancellationToken) {
    let shutdown = async move { cancel.cancelled().await };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!("server stopped: {}", e);
    }
}
