//! Storefront - cart, checkout and order service

use std::sync::Arc;
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use storefront::config::{Config, StoreBackend};
use storefront::publisher::EventPublisher;
use storefront::store::{MemoryStore, PgStore, Store};
use storefront::Storefront;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().context("DATABASE_URL is required for the postgres backend")?;
            let store = PgStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let publisher = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => EventPublisher::nats(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                EventPublisher::disabled()
            }
        },
        None => EventPublisher::disabled(),
    };

    let publishing = publisher.is_enabled();
    let service = Storefront::new(store, config.status_policy).with_publisher(publisher);
    let app = storefront::http::router(service);

    let addr = config.bind_address();
    tracing::info!(%addr, backend = ?config.store_backend, policy = ?config.status_policy, publishing, "storefront listening");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
