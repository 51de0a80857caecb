use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use scriberr_adapters::canary::CanaryAdapter;
use scriberr_adapters::parakeet::ParakeetAdapter;
use scriberr_adapters::pyannote::PyannoteAdapter;
use scriberr_adapters::sortformer::SortformerAdapter;
use scriberr_adapters::whisperx::WhisperxAdapter;
use scriberr_adapters::AdapterRegistry;
use scriberr_domain::config::{Config, ConfigSeverity};
use scriberr_engine::{JobProcessor, ProgressBroadcaster, TaskQueue};
use scriberr_server::api;
use scriberr_server::auth::AuthService;
use scriberr_server::state::AppState;
use scriberr_storage::{Database, Repositories};

/// How long `Stop` waits for in-flight jobs on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "scriberr", about = "Audio transcription server")]
struct Cli {
    /// Optional TOML config file; environment variables win over it.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Print the version and exit.
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("scriberr {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    run_server(Arc::new(config)).await
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scriberr=debug")),
        )
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Scriberr starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Data directories ─────────────────────────────────────────────
    for dir in [
        config.storage.data_dir.clone(),
        config.upload_dir(),
        config.work_dir(),
        config.transcripts_dir(),
        config.models_dir(),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    // ── Database + repositories ──────────────────────────────────────
    let database = Database::connect(&config.database_path())
        .await
        .context("opening database")?;
    let repos = Repositories::new(database.pool());

    // ── Auth service ─────────────────────────────────────────────────
    let jwt_secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    });
    let auth = Arc::new(AuthService::new(
        jwt_secret,
        repos.users.clone(),
        repos.api_keys.clone(),
        repos.refresh_tokens.clone(),
    ));

    // ── Admin seed ───────────────────────────────────────────────────
    if let (Some(username), Some(password)) = (
        config.auth.admin_username.as_deref(),
        config.auth.admin_password.as_deref(),
    ) {
        if repos.users.count().await.map_err(anyhow::Error::from)? == 0 {
            let hash = auth
                .hash_password(password)
                .context("hashing admin password")?;
            repos
                .users
                .create(username, &hash)
                .await
                .context("seeding admin user")?;
            tracing::info!(username, "seeded admin user");
        }
    }

    // ── Adapter registry ─────────────────────────────────────────────
    // Every adapter gets its engine environment path injected here; none
    // of them read global configuration.
    let registry = Arc::new(AdapterRegistry::new());
    registry.register_transcription(Arc::new(WhisperxAdapter::new(
        config.engine_env("whisperx"),
    )));
    registry.register_transcription(Arc::new(ParakeetAdapter::new(
        config.engine_env("parakeet"),
    )));
    registry.register_transcription(Arc::new(CanaryAdapter::new(config.engine_env("canary"))));
    registry.register_diarization(Arc::new(PyannoteAdapter::new(
        config.engine_env("pyannote"),
    )));
    registry.register_diarization(Arc::new(SortformerAdapter::new(
        config.engine_env("sortformer"),
    )));

    // ── Pipeline: broadcaster, processor, queue ──────────────────────
    let broadcaster = Arc::new(ProgressBroadcaster::new());
    let processor = Arc::new(JobProcessor::new(
        repos.jobs.clone(),
        registry.clone(),
        broadcaster.clone(),
        config.work_dir(),
        config.transcripts_dir(),
        config.storage.keep_temp_on_failure,
    ));
    let queue = TaskQueue::new(
        processor,
        repos.jobs.clone(),
        config.queue.capacity,
        config.queue.workers,
    );

    // Recover jobs orphaned by an abnormal shutdown, then start workers.
    queue
        .reset_zombie_jobs()
        .await
        .map_err(|e| anyhow::anyhow!("zombie recovery: {e}"))?;
    queue.start();

    // ── Router ───────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        repos,
        auth,
        registry,
        queue: queue.clone(),
        broadcaster,
    };

    let cors_layer = api::build_cors_layer(&config.server.cors.allowed_origins);
    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(axum::extract::DefaultBodyLimit::max(
            config.server.body_size_limit,
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .layer(tower_http::catch_panic::CatchPanicLayer::new())
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "Scriberr listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // ── Drain ────────────────────────────────────────────────────────
    tracing::info!("shutting down: draining worker pool");
    queue.stop(SHUTDOWN_DRAIN).await;
    database.close().await;
    tracing::info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
