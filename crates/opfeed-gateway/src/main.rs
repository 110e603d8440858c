use clap::Parser;
use opfeed_core::config::OpfeedConfig;
use opfeed_fanout::{ingress, Broadcaster, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod app;
mod feed;
mod http;
mod ws;

const BROADCASTER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "opfeed-gateway", version, about = "Live operator event relay")]
struct Cli {
    /// HTTP service address (host:port); overrides the config file.
    #[arg(long)]
    addr: Option<String>,

    /// PD RESTful API address, without http://. Enables the feed poller.
    #[arg(long)]
    pd: Option<String>,

    /// Config file path (default: $OPFEED_CONFIG or ~/.opfeed/opfeed.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "opfeed_gateway=info,opfeed_fanout=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > OPFEED_CONFIG env > ~/.opfeed/opfeed.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("OPFEED_CONFIG").ok());
    let mut config = OpfeedConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        OpfeedConfig::default()
    });
    if let Some(pd) = cli.pd {
        config.feed.pd_addr = pd;
        config.feed.enabled = true;
    }
    let addr = cli.addr.unwrap_or_else(|| config.listen_addr());

    // fan-out core: one registry for the whole process, one broadcaster
    let registry = Arc::new(Registry::new());
    let (ingress, ingress_rx) = ingress::channel(config.fanout.ingress_capacity);
    let broadcaster = Broadcaster::new(Arc::clone(&registry), ingress_rx).spawn();

    let shutdown = CancellationToken::new();

    if config.feed.enabled {
        let poller = feed::FeedPoller::new(&config.feed, ingress.clone())?;
        tokio::spawn(poller.run(shutdown.child_token()));
    }

    let state = Arc::new(app::AppState::new(
        config,
        Arc::clone(&registry),
        ingress,
        shutdown.clone(),
    ));
    let router = app::build_router(Arc::clone(&state));

    info!("opfeed gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested, closing viewer sessions");
            signal.cancel();
        })
        .await?;

    // router and state hold the last ingress handles; dropping them lets the
    // broadcaster drain and exit
    drop(state);
    if tokio::time::timeout(BROADCASTER_DRAIN, broadcaster).await.is_err() {
        tracing::warn!("broadcaster did not drain in time");
    }
    info!(subscribers = registry.len(), "opfeed gateway stopped");
    Ok(())
}
