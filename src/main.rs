use std::net::SocketAddr;
use std::sync::Arc;

use formation_progress::{
    config::{get_config, init_config, LogFormat, StorageBackend},
    database::{
        pool::{create_pool, run_migrations},
        MemoryProgressStore, PgProgressStore, ProgressStore,
    },
    routes, AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("formation_progress=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(config.log_format);

    let store: Arc<dyn ProgressStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool().await?;
            run_migrations(&pool).await?;
            Arc::new(PgProgressStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("using the in-memory store, progress is lost on restart");
            Arc::new(MemoryProgressStore::new())
        }
    };

    info!(
        backend = ?config.storage_backend,
        completion_policy = ?config.completion_policy,
        completion_rule = ?config.completion_rule,
        "progress store ready"
    );

    let app = routes::build_router(AppState::new(store));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
