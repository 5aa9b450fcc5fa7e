/// Server setup and initialization
///
/// Wires together all components: databases, lease lock, normalization engine,
/// dispatch runners, commit hook, storage, maintenance cron, and HTTP routes.
/// Two process shapes share this wiring: the API server and the queue worker.

use crate::{
    api::{create_roadmap_routes, create_step_routes, AppState},
    config::Config,
    roadmap::{Database, PositionStore, StepStorage},
    runtime::{
        dispatch::{InProcessRunner, JobRunner, NormalizationScheduler, QueueRunner},
        engine::NormalizationEngine,
        hook::NormalizationHook,
        lock::{LeaseLock, SqliteLeaseLock},
        metrics::register_metrics,
        queue::{JobQueue, QueueSettings},
        scheduler::{MaintenanceScheduler, MaintenanceTasks},
        worker::QueueWorker,
    },
};
use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::EnvFilter;

/// Fully wired components of one process
pub struct Services {
    pub database: Database,
    pub lock: Arc<dyn LeaseLock>,
    pub engine: Arc<NormalizationEngine>,
    /// Present when queue-backed scheduling is enabled
    pub queue: Option<Arc<JobQueue>>,
    pub scheduler: Arc<NormalizationScheduler>,
    pub storage: StepStorage,
}

impl Services {
    /// Open the application database and build the normalization stack on top of it
    pub async fn build(config: &Config) -> Result<Self> {
        tracing::info!("📁 Data directory: {}", config.database.data_dir);
        let database = Database::open(&config.database.app_db_path).await?;

        tracing::info!("🔒 Initializing lease lock (ttl {:?})", config.normalization.lock_ttl);
        let lock: Arc<dyn LeaseLock> = Arc::new(SqliteLeaseLock::new(database.pool().clone()));

        tracing::info!("🚀 Initializing normalization engine");
        let engine = Arc::new(NormalizationEngine::new(
            PositionStore::new(database.pool().clone()),
            Arc::clone(&lock),
            config.normalization.lock_ttl,
            config.normalization.lock_retry_interval,
        ));

        let queue = config.normalization.use_queue.then(|| {
            tracing::info!("📦 Queue-backed scheduling enabled: {}", config.database.queue_db_path.display());
            Arc::new(JobQueue::open_lazy(
                &config.database.queue_db_path,
                QueueSettings::from(&config.normalization),
            ))
        });
        if queue.is_none() {
            tracing::info!("🧵 In-process scheduling enabled");
        }

        let local: Arc<dyn JobRunner> = Arc::new(InProcessRunner::new(Arc::clone(&engine)));
        let primary = queue
            .as_ref()
            .map(|queue| Arc::new(QueueRunner::new(Arc::clone(queue))) as Arc<dyn JobRunner>);
        let scheduler = Arc::new(NormalizationScheduler::new(primary, local));

        tracing::info!("🪝 Registering normalization commit hook");
        let hook = Arc::new(NormalizationHook::new(Arc::clone(&scheduler)));
        let storage = StepStorage::new(database.pool().clone()).with_observer(hook);

        Ok(Self {
            database,
            lock,
            engine,
            queue,
            scheduler,
            storage,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            storage: self.storage.clone(),
            scheduler: Arc::clone(&self.scheduler),
            queue: self.queue.clone(),
        }
    }

    /// Cron maintenance; the sweep is wired only where a scheduler can take requests
    pub async fn maintenance(&self, config: &Config, with_sweep: bool) -> Result<MaintenanceScheduler> {
        let tasks = MaintenanceTasks::new(
            Arc::clone(&self.lock),
            self.queue.clone(),
            PositionStore::new(self.database.pool().clone()),
            with_sweep.then(|| Arc::clone(&self.scheduler)),
        );
        MaintenanceScheduler::new(
            tasks,
            config.normalization.maintenance_schedule.clone(),
            config.normalization.sweep_schedule.clone().filter(|_| with_sweep),
        )
        .await
    }
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides the default `info` level
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second init (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init();
}

/// Build the HTTP router over already-wired state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/healthz", get(health_check))
        .route("/healthz/dispatch", get(dispatch_health))
        // Roadmap and step API routes
        .merge(create_roadmap_routes())
        .merge(create_step_routes())
        .with_state(state)
}

/// Create the main Axum application
///
/// Initializes every component and returns the router together with the services
/// behind it. The maintenance scheduler is not started here.
pub async fn create_app(config: &Config) -> Result<(Router, Services)> {
    let services = Services::build(config).await?;

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = create_router(services.app_state());

    tracing::info!("✅ Application initialized successfully");
    Ok((app, services))
}

/// Start the HTTP server with the given configuration
///
/// Runs until ctrl-c, then stops the maintenance scheduler.
pub async fn start_server(config: Config) -> Result<()> {
    init_tracing();
    register_metrics();
    tracing::info!("Starting SkillStack API server...");

    let (app, services) = create_app(&config).await?;

    tracing::info!("⏰ Initializing maintenance scheduler");
    let maintenance = services.maintenance(&config, true).await?;
    maintenance.start().await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.stop().await?;
    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Start a queue worker process
///
/// Consumes `normalize_roadmap_steps` jobs from the durable queue regardless of the
/// API's scheduling mode, and runs the maintenance cron alongside.
pub async fn start_worker(mut config: Config) -> Result<()> {
    init_tracing();
    register_metrics();
    tracing::info!("Starting SkillStack queue worker...");

    config.normalization.use_queue = true;
    let services = Services::build(&config).await?;
    let Some(queue) = services.queue.clone() else {
        anyhow::bail!("queue worker started without a job queue");
    };

    let maintenance = services.maintenance(&config, false).await?;
    maintenance.start().await?;

    let worker = QueueWorker::new(
        queue,
        Arc::clone(&services.engine),
        config.normalization.queue_poll_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await?;
    maintenance.stop().await?;
    tracing::info!("👋 Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("⏹️ Shutdown signal received");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

/// Dispatch counters plus queue depth when the queue is enabled
///
/// GET /healthz/dispatch
async fn dispatch_health(State(state): State<AppState>) -> Json<Value> {
    let dispatch = state.scheduler.health();
    let queue = match &state.queue {
        Some(queue) => match queue.counts().await {
            Ok(counts) => json!(counts),
            Err(e) => json!({ "error": format!("{e:#}") }),
        },
        None => Value::Null,
    };

    Json(json!({ "dispatch": dispatch.as_ref(), "queue": queue }))
}
