use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tryon_gate::app_state::AppState;
use tryon_gate::config::AppConfig;
use tryon_gate::routes;
use tryon_gate::services::{
    orchestrator::RetryOrchestrator, provider::HttpGenerationProvider,
    quality_gate::QualityGate, scheduler::JobScheduler, scorer::HttpScorer, thresholds,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing tryon-gate server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Total generation jobs submitted, by priority"
    );
    metrics::describe_counter!("generation_jobs_completed", "Generation jobs completed");
    metrics::describe_counter!("generation_jobs_failed", "Generation jobs that failed");
    metrics::describe_counter!("generation_jobs_cancelled", "Generation jobs cancelled");
    metrics::describe_gauge!("generation_active_jobs", "Jobs currently holding a slot");
    metrics::describe_gauge!("generation_queue_depth", "Jobs waiting for a free slot");
    metrics::describe_counter!("quality_evaluations_total", "Quality gate evaluations, by verdict");
    metrics::describe_histogram!("quality_overall_score", "Weighted overall quality score");
    metrics::describe_counter!("generation_runs_started_total", "Generation runs started");
    metrics::describe_counter!(
        "generation_runs_finished_total",
        "Generation runs that settled, by status"
    );
    metrics::describe_counter!("generation_retries_total", "Regeneration attempts submitted");
    metrics::describe_histogram!(
        "generation_attempt_seconds",
        "Time from admission wait to verdict for one attempt"
    );

    // Quality gate with the configured tier
    let mut quality_config = thresholds::default_config(
        tryon_gate::models::quality::Tier::from_name(&config.quality_tier),
    );
    quality_config.strict_mode = config.strict_mode;
    tracing::info!(
        tier = %quality_config.tier,
        strict_mode = quality_config.strict_mode,
        "Quality gate configured"
    );
    let gate = Arc::new(QualityGate::new(quality_config));

    // Scheduler
    let scheduler = Arc::new(JobScheduler::with_expected_duration(
        config.scheduler_slots,
        config.expected_job_duration(),
    ));
    tracing::info!(slots = scheduler.total_slots(), "Job scheduler ready");

    // Collaborator clients
    let provider = HttpGenerationProvider::new(
        config.provider_url.clone(),
        config.provider_token.clone(),
        config.request_timeout(),
    )
    .expect("Failed to initialize generation provider client");
    let scorer = HttpScorer::new(
        config.scorer_url.clone(),
        config.scorer_token.clone(),
        config.request_timeout(),
    )
    .expect("Failed to initialize scoring client");

    let orchestrator = RetryOrchestrator::new(
        Arc::clone(&scheduler),
        Arc::clone(&gate),
        Arc::new(provider),
        Arc::new(scorer),
        config.max_attempts,
    );

    let state = AppState::new(scheduler, gate, orchestrator);

    // Retention sweep
    let sweep_state = state.clone();
    let retention_hours = config.retention_hours;
    let mut interval = tokio::time::interval(config.cleanup_interval());
    tokio::spawn(async move {
        loop {
            interval.tick().await;
            let jobs = sweep_state.scheduler.cleanup(retention_hours);
            let runs = sweep_state.orchestrator.cleanup_runs(retention_hours);
            if jobs > 0 || runs > 0 {
                tracing::info!(jobs, runs, "Retention sweep removed finished entries");
            }
        }
    });

    // Build API routes
    let app = routes::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(25 * 1024 * 1024)); // two reference images

    tracing::info!("Starting tryon-gate on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
