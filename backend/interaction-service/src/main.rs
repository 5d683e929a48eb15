use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use collection_cache::redis_hash;
use counter_propagation::{
    CounterTopics, DeltaApplier, DeltaConsumer, DeltaPublisher, KafkaDeltaPublisher,
    NoopDeltaPublisher, PropagationMetrics, RetryPolicy,
};
use interaction_service::cache_aside::TaskPool;
use interaction_service::services::{run_ledger_cleanup, PgCounterSink};
use interaction_service::{metrics, AppState, Config};

const SERVICE_NAME: &str = "interaction-service";

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn ready(state: web::Data<AppState>) -> impl Responder {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => HttpResponse::Ok().body("READY"),
        Err(e) => HttpResponse::ServiceUnavailable().body(format!("database: {}", e)),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting {}", SERVICE_NAME);

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        ttl_min_secs = config.cache.ttl.min().as_secs(),
        ttl_max_secs = config.cache.ttl.max().as_secs(),
        "Configuration loaded"
    );

    // Database pool; statement cache disabled for PgBouncer transaction mode
    let connect_options = PgConnectOptions::from_str(&config.database.url)
        .context("Failed to parse DATABASE_URL")?
        .statement_cache_capacity(0);

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database pool created and migrations applied");

    let redis_conn = redis_hash::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection established");

    metrics::register();
    let propagation_metrics = PropagationMetrics::new(SERVICE_NAME);

    // Counter delta producer (optional)
    let publisher: Arc<dyn DeltaPublisher> = match &config.kafka {
        Some(kafka) => match KafkaDeltaPublisher::new(kafka) {
            Ok(producer) => Arc::new(producer.with_metrics(propagation_metrics.clone())),
            Err(e) => {
                warn!("Failed to initialize Kafka delta producer, counters disabled: {}", e);
                Arc::new(NoopDeltaPublisher)
            }
        },
        None => {
            info!("KAFKA_BROKERS not set, counter deltas will be dropped");
            Arc::new(NoopDeltaPublisher)
        }
    };

    let tasks = TaskPool::new(config.tasks.workers, config.tasks.queue_capacity);

    let state = AppState::new(
        pg_pool.clone(),
        redis_conn,
        config.cache,
        publisher,
        tasks.clone(),
    );

    let mut join_set: JoinSet<Result<()>> = JoinSet::new();

    // Counter aggregator
    if let Some(kafka) = config.kafka.clone() {
        let sink = Arc::new(PgCounterSink::new(pg_pool.clone()));
        let applier = DeltaApplier::new(
            sink.clone(),
            CounterTopics::new(kafka.topic_prefix.clone()),
            RetryPolicy::default(),
        )
        .with_metrics(propagation_metrics.clone());

        join_set.spawn(DeltaConsumer::new(kafka, applier).run());
        join_set.spawn(run_ledger_cleanup(
            sink,
            Duration::from_secs(config.aggregator.cleanup_interval_secs),
            config.aggregator.dedup_retention_hours,
        ));
        info!("Counter aggregator started");
    } else {
        info!("Counter aggregator disabled: KAFKA_BROKERS not configured");
    }

    // HTTP health and metrics
    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let http_state = web::Data::new(state.clone());
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(http_state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/ready", web::get().to(ready))
            .route("/metrics", web::get().to(metrics::metrics_handler))
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();
    let http_handle = http_server.handle();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!("HTTP server listening on http://{}", http_addr);

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        Some(result) = join_set.join_next() => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Task failed: {:#}", e);
                Err(e)
            }
            Err(e) => {
                error!("Task panicked: {:#}", e);
                Err(anyhow::anyhow!("Task panicked: {}", e))
            }
        },
    };

    http_handle.stop(true).await;
    join_set.abort_all();
    state.tasks.shutdown().await;
    pg_pool.close().await;

    info!("{} stopped", SERVICE_NAME);
    outcome
}
