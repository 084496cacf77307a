//! Trivia Live backend binary: wires the REST, WebSocket, and SSE surface to
//! the MongoDB quiz store and starts the daily event scheduler.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_live_back::{
    config::AppConfig,
    dao::{
        quiz_store::{
            QuizStore,
            mongodb::{MongoConfig, MongoQuizStore},
        },
        storage::StorageError,
    },
    routes,
    services::{scheduler, storage_supervisor},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = AppState::new(AppConfig::load());

    let mongo_uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let mongo_db = env::var("MONGO_DB").ok();
    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        connect_store(mongo_uri.clone(), mongo_db.clone())
    }));
    tokio::spawn(scheduler::run(state.clone()));

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port()));
    info!(%addr, "trivia backend listening");

    let listener = TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    Ok(())
}

/// One MongoDB connection attempt, boxed as the trait object the supervisor
/// installs into shared state.
async fn connect_store(
    uri: String,
    db: Option<String>,
) -> Result<Arc<dyn QuizStore>, StorageError> {
    let config = MongoConfig::from_uri(&uri, db.as_deref())
        .await
        .map_err(StorageError::from)?;
    let store = MongoQuizStore::connect(config)
        .await
        .map_err(StorageError::from)?;
    Ok(Arc::new(store) as Arc<dyn QuizStore>)
}

/// `PORT` wins over `SERVER_PORT`; 8080 when neither parses.
fn listen_port() -> u16 {
    env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                tracing::warn!(error = %err, "no SIGTERM handler, falling back to Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
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
