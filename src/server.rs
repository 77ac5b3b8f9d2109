//! Process entrypoint (C8): configuration loading, dependency wiring, and
//! graceful shutdown.

use std::sync::Arc;

use poem::endpoint::PrometheusExporter;
use poem::listener::TcpListener;
use poem::Route;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remote_vector_index_builder::api;
use remote_vector_index_builder::blob_store::InMemoryBlobStore;
use remote_vector_index_builder::config::Settings;
use remote_vector_index_builder::executor::WorkflowExecutor;
use remote_vector_index_builder::index_builder::SimulatedIndexBuilder;
use remote_vector_index_builder::metrics::Metrics;
use remote_vector_index_builder::resource::ResourceManager;
use remote_vector_index_builder::service::JobService;
use remote_vector_index_builder::store::{InMemoryRequestStore, RequestStore};

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let settings = Settings::new();
    init_tracing(&settings.log_level);

    info!(
        http_port = settings.http_port,
        max_workers = settings.max_workers,
        "starting remote-vector-index-builder"
    );

    let resource_manager = Arc::new(ResourceManager::new(
        settings.gpu_memory_limit,
        settings.cpu_memory_limit,
    ));

    let request_store = Arc::new(InMemoryRequestStore::new(
        settings.request_store_max_size,
        settings.request_store_ttl_seconds,
    ));
    InMemoryRequestStore::spawn_sweeper(request_store.clone());

    let blob_store = Arc::new(InMemoryBlobStore::new());
    let index_builder = Arc::new(SimulatedIndexBuilder);
    let metrics = Arc::new(Metrics::new());

    let executor = Arc::new(WorkflowExecutor::new(
        settings.max_workers,
        resource_manager.clone(),
        index_builder,
        blob_store,
        request_store.clone() as Arc<dyn RequestStore>,
        metrics.clone(),
    ));

    let job_service = Arc::new(JobService::new(
        request_store as Arc<dyn RequestStore>,
        executor.clone(),
        resource_manager,
        metrics.clone(),
    ));

    let app = Route::new()
        .nest("/", api::routes(job_service, Arc::new(settings.service_name.clone())))
        .nest("/metrics", PrometheusExporter::new(metrics.registry.clone()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.http_port));
    poem::Server::new(listener)
        .run_with_graceful_shutdown(app, shutdown_signal(), None)
        .await
        .expect("HTTP server failed");

    executor.shutdown().await;
    info!("executor drained, exiting");
}
