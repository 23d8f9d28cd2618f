use crate::handlers;
use axum::{
    routing::{get, put},
    Router,
};
use perp_scalper_engine::StateStore;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    store: Arc<StateStore>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/state", get(handlers::get_state))
            .route("/api/pause", put(handlers::pause))
            .route("/api/resume", put(handlers::resume))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.store.clone())
    }

    /// Starts the operator API listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve
    /// requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Operator API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
