//! chessvars-back binary entrypoint wiring GraphQL, WebSocket, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use chessvars_back::{
    config::AppConfig,
    dao::{game_store::GameStore, storage::StorageError},
    routes,
    services::{identity_service::FirebaseVerifier, storage_supervisor},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let identity = Arc::new(FirebaseVerifier::new(&config));
    let app_state = AppState::new(config, identity);

    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    info!(%backend, "selected storage backend");
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(backend.clone())
    }));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Open the backend named by `STORAGE_BACKEND`.
async fn connect_store(backend: String) -> Result<Arc<dyn GameStore>, StorageError> {
    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use chessvars_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

            let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            Ok(Arc::new(MongoGameStore::connect(config).await?))
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use chessvars_back::dao::game_store::couchdb::{CouchConfig, CouchGameStore};

            let config = CouchConfig::from_env()?;
            Ok(Arc::new(CouchGameStore::connect(config).await?))
        }
        "memory" => {
            use chessvars_back::dao::game_store::memory::MemoryGameStore;

            Ok(Arc::new(MemoryGameStore::new()))
        }
        other => Err(StorageError::unavailable(
            format!("unsupported storage backend `{other}`"),
            std::io::Error::new(std::io::ErrorKind::Unsupported, other.to_owned()),
        )),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
