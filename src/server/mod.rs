use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

use crate::config::ServerConfig;
use crate::executor::{MemoryStore, SharedStore};
use crate::verifier::{StaticStructures, StructureSource, TemplateVerifier, Verifier};
use handlers::{health_check, resolve_handler};

pub mod handlers;
pub mod models;

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: SharedStore,
    pub verifier: Arc<dyn Verifier>,
    pub structures: Arc<dyn StructureSource>,
}

impl AppState {
    /// Loads the data file and the structure file named by `config`.
    ///
    /// The structure file holds both the request templates (`entries`) and
    /// the role table (`access`).
    pub fn load(config: ServerConfig) -> anyhow::Result<Self> {
        let store = match &config.data_file {
            Some(path) => {
                let store = MemoryStore::from_file(path)
                    .with_context(|| format!("Failed to load data file {}", path))?;
                log::info!("Loaded {} table(s) from {}", store.tables.len(), path);
                store
            }
            None => {
                log::warn!("No data file configured, serving an empty store");
                MemoryStore::default()
            }
        };

        let (structures, verifier) = match &config.structure_file {
            Some(path) => (
                StaticStructures::from_file(path)
                    .with_context(|| format!("Failed to load request structures from {}", path))?,
                TemplateVerifier::from_file(path)
                    .with_context(|| format!("Failed to load access rules from {}", path))?,
            ),
            None => {
                log::warn!("No structure file configured, non-public requests need no template");
                (StaticStructures::new(), TemplateVerifier::new())
            }
        };

        Ok(Self {
            config,
            store: store.into_shared(),
            verifier: Arc::new(verifier),
            structures: Arc::new(structures),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/{method}", post(resolve_handler))
        .layer(TimeoutLayer::new(timeout))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CatchPanicLayer::new())
        .with_state(Arc::new(state))
}

pub async fn run() {
    dotenv().ok();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    run_with_config(config).await;
}

pub async fn run_with_config(config: ServerConfig) {
    dotenv().ok();

    log::info!(
        "Server configuration: http={}:{}, max_query_depth={}, max_sql_count={}, reference_policy={}",
        config.http_host,
        config.http_port,
        config.resolver.max_query_depth,
        config.resolver.max_sql_count,
        config.resolver.reference_policy
    );

    let state = match AppState::load(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to initialize apitree: {:#}", e);
            std::process::exit(1);
        }
    };

    let http_bind_address = format!("{}:{}", config.http_host, config.http_port);
    log::info!("Starting HTTP server on {}", http_bind_address);

    let http_listener = match TcpListener::bind(&http_bind_address).await {
        Ok(listener) => {
            log::info!("Successfully bound HTTP listener to {}", http_bind_address);
            listener
        }
        Err(e) => {
            log::error!("Failed to bind HTTP listener to {}: {}", http_bind_address, e);
            log::error!("Is another process using port {}?", config.http_port);
            std::process::exit(1);
        }
    };

    println!("apitree server is running");
    println!("  HTTP API: http://{}", http_bind_address);

    if let Err(e) = axum::serve(http_listener, router(state)).await {
        log::error!("HTTP server fatal error: {:?}", e);
        std::process::exit(1);
    }
}
