//! alarmhub - IP camera alarm webhook server
//!
//! Main entry point.

use alarmhub::{
    alarm_state::AlarmStateService,
    annotator::Annotator,
    connection_tracker::ConnectionTracker,
    dispatcher::{throttle::ThrottleGate, Dispatcher, DispatcherConfig},
    event_pipeline::EventPipeline,
    hub::{HttpRelay, LogRelay, MemoryStore, Relay, Store},
    name_resolver::DeviceNameResolver,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Load the relay channel configuration, empty when not configured
fn load_dispatcher_config(config: &AppConfig) -> anyhow::Result<DispatcherConfig> {
    match config.relay_config {
        Some(ref path) => {
            let raw = std::fs::read_to_string(path)?;
            let parsed: DispatcherConfig = serde_json::from_str(&raw).map_err(|e| {
                alarmhub::Error::Config(format!("Relay config {}: {}", path.display(), e))
            })?;
            tracing::info!(
                path = %path.display(),
                notification = parsed.notification.is_some(),
                image = parsed.image.is_some(),
                "Relay channel config loaded"
            );
            Ok(parsed)
        }
        None => {
            tracing::info!("No relay channel config, dispatch disabled");
            Ok(DispatcherConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alarmhub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting alarmhub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        alarm_timeout_ms = config.alarm_timeout_ms,
        connection_timeout_ms = config.connection_timeout_ms,
        annotate_images = config.annotate_images,
        save_xml = config.save_xml,
        save_images = config.save_images,
        "Configuration loaded"
    );

    // Collaborators: standalone store, relay by configuration
    let store = Arc::new(MemoryStore::new(config.data_dir.clone())) as Arc<dyn Store>;
    let relay: Arc<dyn Relay> = match config.relay_url {
        Some(ref url) => {
            tracing::info!(relay_url = %url, "HTTP relay enabled");
            Arc::new(HttpRelay::new(url.clone()))
        }
        None => {
            tracing::info!("No relay URL configured, sends are logged only");
            Arc::new(LogRelay)
        }
    };

    // Initialize components
    let resolver = Arc::new(DeviceNameResolver::new(store.clone()));
    let throttle = Arc::new(ThrottleGate::new());
    let alarm = Arc::new(AlarmStateService::new(store.clone(), config.alarm_timeout()));
    let connections = Arc::new(ConnectionTracker::new(
        store.clone(),
        resolver.clone(),
        config.connection_timeout(),
    ));

    let dispatcher_config = load_dispatcher_config(&config)?;
    let dispatcher = Dispatcher::new(relay, throttle.clone(), dispatcher_config)?;
    let annotator = Annotator::new(config.annotator_config());

    let pipeline = Arc::new(EventPipeline::new(
        alarm.clone(),
        annotator,
        dispatcher,
        connections.clone(),
        resolver,
        store,
        config.save_xml,
        config.save_images,
    ));
    tracing::info!("Event pipeline initialized");

    // Create application state
    let state = AppState {
        config,
        pipeline,
        alarm,
        throttle,
        connections,
    };

    let app = web_api::create_router(state.clone()).layer(TraceLayer::new_for_http());

    // Start server; a bind failure is fatal
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Blocking drain: force every pending indicator False before exit
    tracing::info!("Shutting down, draining timers");
    state.alarm.drain().await;
    state.throttle.shutdown().await;
    state.connections.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
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
