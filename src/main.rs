mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::{BackendConfig, Config};
use crate::core::context::AppContext;
use crate::core::database;
use crate::core::openapi::{ApiDoc, BackendInfoModifier};
use crate::core::router::build_router;
use crate::modules::backend::{
    AuthProvider, DocumentStore, LogtoAuthProvider, LogtoTokenManager, MemoryBackend,
    PostgresDocumentStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn connect_backend(
    config: &Config,
) -> anyhow::Result<(Arc<dyn AuthProvider>, Arc<dyn DocumentStore>)> {
    match &config.backend {
        BackendConfig::Memory => {
            tracing::warn!("Using in-memory backend; accounts and reports are lost on exit");
            let backend = MemoryBackend::new();
            Ok((Arc::new(backend.clone()), Arc::new(backend)))
        }
        BackendConfig::Hosted {
            database,
            logto_m2m,
        } => {
            let pool = database::connect_and_migrate(database).await?;
            tracing::info!("Document store ready");

            let token_manager = Arc::new(LogtoTokenManager::new(logto_m2m.clone()));
            let auth = LogtoAuthProvider::new(token_manager, config.session.ttl);
            tracing::info!("Logto auth provider initialized");

            Ok((Arc::new(auth), Arc::new(PostgresDocumentStore::new(pool))))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );
    tracing::info!(
        "Configuration loaded successfully (backend: {})",
        config.backend.name()
    );

    let (auth, documents) = connect_backend(&config).await?;
    let context = AppContext::init(auth, documents);
    tracing::info!("Session and report subscriptions started");

    let mut openapi = ApiDoc::openapi();
    BackendInfoModifier {
        backend: config.backend.name(),
    }
    .modify(&mut openapi);

    let app = build_router(Arc::clone(&context), &config.app, &config.session, openapi);

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    context.dispose();
    tracing::info!("Subscriptions stopped");

    Ok(())
}
