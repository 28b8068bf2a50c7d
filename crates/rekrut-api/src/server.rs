//! API server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use rekrut_auth::{Authenticator, SessionIssuer};
use rekrut_core::{RekrutConfig, Result};
use rekrut_directory::{DirectoryService, LdapDirectory};
use rekrut_identity::IdentityStore;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RekrutConfig>,
    pub store: Arc<IdentityStore>,
    pub directory: Arc<dyn DirectoryService>,
    pub authenticator: Arc<Authenticator>,
    pub issuer: Arc<SessionIssuer>,
}

impl AppState {
    /// Wire the components together. The directory adapter is constructed
    /// once from resolved configuration and injected everywhere it is
    /// needed, never from ambient state.
    pub async fn build(config: RekrutConfig) -> Result<Self> {
        let store = Arc::new(IdentityStore::new(&config.database.url).await?);
        let directory: Arc<dyn DirectoryService> =
            Arc::new(LdapDirectory::new(config.ldap.clone())?);

        let authenticator = Arc::new(Authenticator::new(
            Arc::clone(&directory),
            Arc::clone(&store),
            config.auth.clone(),
            &config.ldap,
        ));
        let issuer = Arc::new(SessionIssuer::new(&config.session));

        Ok(Self {
            config: Arc::new(config),
            store,
            directory,
            authenticator,
            issuer,
        })
    }
}

pub struct ApiServer {
    config: RekrutConfig,
}

impl ApiServer {
    pub fn new(config: RekrutConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        );
        let state = AppState::build(self.config).await?;
        let app = create_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("rekrut auth API listening on http://{}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

pub fn create_router(state: AppState) -> Router {
    let session_guard =
        axum::middleware::from_fn_with_state(state.clone(), crate::middleware::require_session);

    Router::new()
        .route("/me", get(routes::me))
        .route_layer(session_guard)
        .route("/ldap-status", get(routes::ldap_status))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/register", post(routes::register))
        .route("/set-local-password", post(routes::set_local_password))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
