//! The Meridian WFS HTTP server.
//!
//! A thin axum wrapper around the parser, compiler and renderer crates.
//! Each HTTP request runs on its own task; parsing, compilation and
//! projection planning are synchronous, the only suspension points are
//! datastore reads and response writes.
//!
//! # Example
//!
//! ```ignore
//! use meridian_server::{demo, WfsServer};
//! use meridian_core::ServiceConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = demo::demo_state(ServiceConfig::default(), "http://localhost:8700/wfs");
//!     let server = WfsServer::new(state);
//!     server.run("127.0.0.1:8700".parse().unwrap()).await.unwrap();
//! }
//! ```

pub mod config;
pub mod demo;
pub mod error;
pub mod operations;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The assembled server: state plus router.
pub struct WfsServer {
    state: Arc<AppState>,
    router: Router,
}

impl WfsServer {
    pub fn new(state: AppState) -> Self {
        let state = Arc::new(state);
        let router = routes::build_router(state.clone());
        WfsServer { state, router }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// The router, for driving the server in tests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until shutdown.
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            feature_types = self.state.registry.len(),
            "Meridian WFS server starting"
        );
        axum::serve(listener, self.router).await
    }
}
