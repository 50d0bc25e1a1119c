use std::net::SocketAddr;
use std::sync::Arc;

use comments_server::{
    attachments::AttachmentStorage, config::Config, db, routes, store::SqliteStore,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comments_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    AttachmentStorage::new(&config.upload_dir).ensure_dir().await?;
    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = routes::create_router(store, config);
    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
