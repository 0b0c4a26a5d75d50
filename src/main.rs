use std::sync::Arc;

use carpool::auth::RemoteIdentityProvider;
use carpool::config::{Config, StoreKind};
use carpool::db::{DynStore, MemoryStore, PgStore};
use carpool::engine::Engine;
use carpool::error::Error;
use carpool::server::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("carpool=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: DynStore = match (&config.store, &config.database_url) {
        (StoreKind::Postgres, Some(url)) => {
            Arc::new(PgStore::new(url, config.database_max_connections).await?)
        }
        (StoreKind::Postgres, None) => return Err(Error::env_var_error()),
        (StoreKind::Memory, _) => {
            tracing::warn!("using the in-memory store, records are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let identity = Arc::new(RemoteIdentityProvider::new(config.identity_verify_url.clone()));

    let engine = Engine::new(store)?.with_store_timeout(config.store_timeout);

    serve(engine, identity, config.listen_addr).await
}
