//! Linky Notifier
//!
//! Watches Nostr relays for direct messages addressed to registered users
//! and wakes their devices with Web Push notifications.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use linky_core::relays::default_relays;
use linky_core::tracing_init::init_tracing;
use linky_notifier::push::vapid::DEFAULT_SUBJECT;
use linky_notifier::push::{VapidSigner, WebPushClient};
use linky_notifier::server::{AppState, build_router};
use linky_notifier::service::NotifierService;
use linky_notifier::storage::NotifierDatabase;
use linky_notifier::subscription::SubscriptionConfig;
use linky_notifier::transport::RelayPoolTransport;

#[derive(Parser, Debug)]
#[command(name = "linky-notifier")]
#[command(
    version,
    about = "Linky notifier - Nostr direct message push notifications"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "LINKY_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// VAPID public key (base64url, uncompressed P-256 point).
    #[arg(long, env = "VAPID_PUBLIC_KEY", requires = "vapid_private_key")]
    vapid_public_key: Option<String>,

    /// VAPID private key (base64url, 32-byte scalar).
    #[arg(long, env = "VAPID_PRIVATE_KEY", requires = "vapid_public_key")]
    vapid_private_key: Option<String>,

    /// Contact URI sent to push services.
    #[arg(long, env = "VAPID_SUBJECT", default_value = DEFAULT_SUBJECT)]
    vapid_subject: String,

    /// How long to wait for relays to accept a connection, in seconds.
    #[arg(long, default_value_t = 10)]
    relay_connect_timeout_secs: u64,

    /// Delay before reopening a closed relay stream, in seconds.
    #[arg(long, default_value_t = 5)]
    reconnect_delay_secs: u64,

    /// Sender profile lookup timeout, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    metadata_timeout_ms: u64,

    /// How long push services keep undelivered notifications, in seconds.
    #[arg(long, default_value_t = 86400)]
    push_ttl_secs: u64,

    /// Notification title when the sender has no profile name.
    #[arg(long, default_value = "Kontakt")]
    fallback_sender_label: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // reqwest is built without a default rustls provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing("linky_notifier=info", args.log_json)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting linky-notifier"
    );

    let db_path = match args.db_path.clone() {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening subscription database");
    let db = NotifierDatabase::open(&db_path).await?;

    let vapid = match (&args.vapid_public_key, &args.vapid_private_key) {
        (Some(public), Some(private)) => Some(VapidSigner::from_base64(
            public,
            private,
            args.vapid_subject.clone(),
        )?),
        _ => None,
    };
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let push = WebPushClient::new(http, vapid, Duration::from_secs(args.push_ttl_secs));
    match push.vapid_public_key() {
        Some(key) => info!(vapid_public_key = %key, "Web Push enabled"),
        None => warn!("VAPID keys not configured; push notifications are disabled"),
    }
    let relays = RelayPoolTransport::new()
        .with_connect_timeout(Duration::from_secs(args.relay_connect_timeout_secs));

    let config = SubscriptionConfig {
        reconnect_delay: Duration::from_secs(args.reconnect_delay_secs),
        metadata_timeout: Duration::from_millis(args.metadata_timeout_ms),
        default_relays: default_relays(),
    };
    let service = NotifierService::new(
        db,
        Arc::new(relays),
        Arc::new(push),
        config,
        &args.fallback_sender_label,
    );

    service.restore().await?;

    let app = build_router(AppState {
        service: service.clone(),
    });
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "HTTP API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.shutdown().await;
    served?;

    info!("Notifier stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Received shutdown signal");
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".linky").join("subscriptions.db"))
}
