mod auth;
mod config;
mod ledger;
mod pg;
mod provider;
mod reconcile;
mod rediscover;
mod routes;
mod state;
mod updates;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use ctree::{ItemStore, NodeStore, State as TreeState};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::ledger::ToncenterClient;
use crate::pg::{PgItemStore, PgNodeStore};
use crate::provider::{FileStateProvider, StateProvider};
use crate::reconcile::Reconciler;
use crate::rediscover::Rediscoverer;
use crate::state::{AppState, SharedState, StateHolder, Tree};
use crate::updates::FileUpdateRecorder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    // --- Postgres ---
    let pg_pool = PgPool::connect(&cfg.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run migrations")?;

    // --- Tree ---
    let nodes: Arc<dyn NodeStore> = Arc::new(PgNodeStore::new(pg_pool.clone()));
    let items: Arc<dyn ItemStore> = Arc::new(PgItemStore::new(pg_pool));
    let tree = Arc::new(Tree::new(cfg.depth, nodes, items)?);

    let provider = Arc::new(FileStateProvider::new(cfg.state_path()));
    let persisted = provider.load().await?;
    let confirmed = validate_state(&tree, persisted).await?;
    info!(
        version = confirmed.version,
        last_index = confirmed.last_index,
        root = %confirmed.root.hash_hex(),
        "startup: confirmed state loaded"
    );

    let seed_address = confirmed.address;
    let holder = Arc::new(StateHolder::new(confirmed));

    // --- Reconciliation ---
    let (states_tx, states_rx) = mpsc::channel(16);
    let (addresses_tx, addresses_rx) = mpsc::channel(16);
    if let Some(address) = seed_address {
        addresses_tx.send(address).await?;
    }

    let ledger = Arc::new(ToncenterClient::new(&cfg.ledger_api_url, cfg.ledger_timeout)?);
    let reconciler = Reconciler::new(
        ledger,
        provider,
        holder.clone(),
        cfg.reconcile_interval,
        cfg.ledger_timeout,
    );
    let cancel = CancellationToken::new();
    let reconcile_task = tokio::spawn(reconciler.run(states_rx, addresses_rx, cancel.clone()));

    let recorder = Arc::new(FileUpdateRecorder::new(cfg.updates_dir()));
    let rediscoverer = Rediscoverer::new(tree.clone(), holder.clone(), recorder, states_tx);

    let app_state: SharedState = Arc::new(AppState {
        config: cfg.clone(),
        tree,
        holder,
        rediscoverer,
        addresses: addresses_tx,
    });

    let app = router(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("indexer listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    if let Err(e) = reconcile_task.await {
        warn!("reconciler task ended abnormally: {e}");
    }

    Ok(())
}

fn router(state: SharedState) -> Router {
    let v1 = Router::new()
        .route("/items", get(routes::get_items))
        .route("/items/:index", get(routes::get_item))
        .route("/state", get(routes::get_state));

    // GET forms kept for existing admin clients
    let admin = Router::new()
        .route("/rediscover", post(routes::rediscover).get(routes::rediscover))
        .route("/address/:addr", post(routes::set_address))
        .route("/setaddr/:addr", get(routes::set_address))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .nest("/v1", v1)
        .nest("/admin", admin)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Checks the persisted state against the node store before serving it.
async fn validate_state(tree: &Tree, state: TreeState) -> Result<TreeState> {
    if state.is_empty() {
        return Ok(TreeState {
            root: tree.empty_root(),
            ..state
        });
    }

    if state.last_index >= tree.capacity() {
        bail!(
            "persisted last index {} does not fit a tree of depth {}",
            state.last_index,
            tree.depth()
        );
    }

    let stored = tree.root(state.version).await?;
    if stored != state.root {
        bail!(
            "persisted root {} does not match stored root {} at version {}",
            state.root.hash_hex(),
            stored.hash_hex(),
            state.version
        );
    }

    Ok(state)
}
