use anyhow::Context;
use clap::Parser;
use relaydesk::api::{self, AppState};
use relaydesk::client::{ClientController, ControllerConfig, ProcessTransportFactory};
use relaydesk::config::BridgeConfig;
use relaydesk::health::{HealthMonitor, HealthMonitorConfig};
use relaydesk::intake::IntakeRegistry;
use relaydesk::session::SessionTracker;
use relaydesk::shutdown::{self, FaultClass, ShutdownConfig, ShutdownCoordinator};
use relaydesk::store::{FsDocumentStore, SessionStore};
use relaydesk::ticketing::TicketingProbe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "relaydesk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Bridges a messaging-platform automation client to a persistent session store and ticketing backend"
)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the admin HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the store data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaydesk=info".into()),
        )
        .init();

    // Panics in spawned tasks are logged, never escalated to a teardown.
    std::panic::set_hook(Box::new(|info| {
        error!("uncaught panic: {}", info);
    }));

    info!("Starting relaydesk");

    let args = Args::parse();
    let mut config = BridgeConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let store = Arc::new(FsDocumentStore::new(
        config.data_dir.clone(),
        &config.collection,
    ));
    store
        .reconnect()
        .await
        .context("failed to open the session store")?;

    let tracker = Arc::new(SessionTracker::new());
    let tracked: Arc<dyn SessionStore> =
        Arc::new(tracker.wrap(store.clone() as Arc<dyn SessionStore>));

    let mut driver_args = config.transport_args.clone();
    driver_args.push("--sync-interval-minutes".to_string());
    driver_args.push(config.transport_sync_interval_minutes.to_string());
    let factory = Arc::new(ProcessTransportFactory::new(
        config.transport_command.clone(),
        driver_args,
    ));

    let controller = ClientController::new(
        tracked.clone(),
        tracker.clone(),
        factory,
        ControllerConfig {
            session_name: config.session_name.clone(),
            qr_expiry_minutes: config.qr_expiry_minutes,
        },
    );
    let _pump = controller.start();

    // The service stays up even when the first initialize fails; the health
    // monitor and admin endpoints drive later attempts.
    if let Err(e) = controller.initialize().await {
        let error = anyhow::Error::new(e);
        match shutdown::classify_fault(&error) {
            FaultClass::ArchiveMissing => {
                warn!("session archive missing on first-time setup: {:#}", error);
                let scratch = config.data_dir.join("scratch");
                if let Err(e) = shutdown::restore_scratch_dir(&scratch).await {
                    warn!("could not recreate scratch directory: {}", e);
                }
            }
            FaultClass::Fatal => error!("client initialization failed: {:#}", error),
        }
    }

    let monitor = HealthMonitor::new(
        tracked.clone(),
        controller.clone(),
        tracker.clone(),
        HealthMonitorConfig {
            interval_minutes: config.health_interval_minutes,
        },
    );
    let monitor_handle = monitor.start();

    let state = AppState {
        controller: controller.clone(),
        tracker,
        store: tracked.clone(),
        intake: Arc::new(IntakeRegistry::new()),
        ticketing: Arc::new(TicketingProbe::new(config.ticketing_url.clone())),
        admin_api_key: config.admin_api_key.clone(),
        scratch_dir: Some(config.data_dir.join("scratch")),
        started_at: chrono::Utc::now(),
    };
    let router = api::create_router(state);

    let coordinator = ShutdownCoordinator::new(
        tracked,
        controller,
        ShutdownConfig {
            flush_wait_secs: config.shutdown_flush_wait_secs,
        },
    );

    // From here on the store, controller, and monitor are live: fatal
    // faults run the full teardown with exit code 1 instead of unwinding
    // past them.
    let exit_code = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => {
            info!(addr = %config.bind_addr, "admin HTTP surface listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    error!("HTTP server failed: {}", e);
                }
            });
            shutdown::wait_for_signal().await
        }
        Err(e) => {
            error!("failed to bind {}: {}", config.bind_addr, e);
            1
        }
    };

    let code = coordinator.execute(Some(monitor_handle), exit_code).await;
    std::process::exit(code);
}
