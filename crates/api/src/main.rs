use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plenum_breakout::{BreakoutManager, BreakoutStartHandler, EventListener, WaitingRoomHandler};
use plenum_recorder::{RecordingApi, RecordingClaimManager, RecordingControl, RecordingQueue};
use plenum_sched::{
    AutoEndHandler, CheckDispatcher, CheckRequest, DispatcherConfig, Scheduler, KIND_AUTO_END,
    KIND_BREAKOUT_START, KIND_WAITING_ROOM,
};
use plenum_store::PgStore;

use plenum_api::config::{RecorderConfig, ServerConfig};
use plenum_api::router::build_app_router;
use plenum_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "plenum_api=debug,plenum_breakout=debug,plenum_recorder=debug,\
                     plenum_sched=debug,tower_http=debug"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let recorder_config = RecorderConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Document store ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = plenum_store::postgres::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    plenum_store::postgres::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    plenum_store::postgres::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store: Arc<dyn plenum_store::DocumentStore> = Arc::new(PgStore::new(pool));

    // --- Recording stack ---
    let backend = Arc::new(RecordingApi::new(recorder_config.api_config()));
    let claims = RecordingClaimManager::new(
        Arc::clone(&store),
        recorder_config.claim_config(),
        recorder_config.claimant.clone(),
    );
    let control = Arc::new(RecordingControl::new(
        backend,
        claims,
        recorder_config.recorder_uid.clone(),
    ));

    let queue = Arc::new(RecordingQueue::new(
        control.clone(),
        recorder_config.queue_config(),
    ));
    let queue_cancel = tokio_util::sync::CancellationToken::new();
    let queue_handle = tokio::spawn(Arc::clone(&queue).run(queue_cancel.clone()));
    tracing::info!("Recording queue started");

    // --- Scheduling ---
    let scheduler = Scheduler::new(Arc::clone(&store));
    let breakouts = BreakoutManager::new(Arc::clone(&store), scheduler.clone());
    let listener = EventListener::new(scheduler.clone());

    let mut dispatcher = CheckDispatcher::new(Arc::clone(&store), DispatcherConfig::default());
    dispatcher.register(
        KIND_WAITING_ROOM,
        Arc::new(WaitingRoomHandler::new(breakouts.clone())),
    );
    dispatcher.register(
        KIND_BREAKOUT_START,
        Arc::new(BreakoutStartHandler::new(breakouts.clone())),
    );
    dispatcher.register(KIND_AUTO_END, Arc::new(AutoEndHandler::new(Arc::clone(&store))));

    let dispatcher_cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher_cancel_clone = dispatcher_cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel_clone).await;
    });
    tracing::info!("Check dispatcher started");

    // Arm the auto-end sweep; it re-arms itself from then on. Another
    // instance may already have it armed, which is fine.
    let armed = scheduler
        .schedule_if_absent(CheckRequest::AutoEnd, Utc::now())
        .await
        .expect("Failed to arm the auto-end sweep");
    if armed {
        tracing::info!("Auto-end sweep armed");
    }

    // --- App state ---
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        queue: Arc::clone(&queue),
        control,
        breakouts,
        listener,
        scheduler,
    };

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    // Stop the dispatcher first so no new checks fire mid-drain.
    dispatcher_cancel.cancel();
    let _ = tokio::time::timeout(drain, dispatcher_handle).await;
    tracing::info!("Check dispatcher stopped");

    // The queue finishes its in-flight batch and drops the rest; their
    // waiters see closed channels.
    queue_cancel.cancel();
    let _ = tokio::time::timeout(drain, queue_handle).await;
    tracing::info!("Recording queue stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
