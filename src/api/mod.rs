use axum::{
    Json, Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use time;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::state::SharedState;

mod admin;
pub mod auth;
mod deposits;
mod error;
mod keys;
mod observability;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

use tokio::sync::RwLock;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }
}

pub async fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    Ok(Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle).await
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, session_minutes, secure_cookies) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.session_minutes,
            config.server.secure_cookies,
        )
    };

    let protected_routes = create_protected_router(state.clone());

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            session_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .layer(session_layer)
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let root_router = Router::new()
        .route("/", get(service_status))
        .with_state(state);

    Router::new()
        .merge(root_router)
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/deposits", get(admin::list_deposits))
        .route("/deposits/{id}/approve", post(admin::approve_deposit))
        .route("/deposits/{id}/reject", post(admin::reject_deposit))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", get(admin::get_user_detail))
        .route("/users/{id}/ledger", get(admin::get_user_ledger))
        .route("/users/{id}/delete", post(admin::delete_user))
        .route("/users/{id}/adjust-balance", post(admin::adjust_balance))
        .route("/keys/manual-create", post(admin::manual_create_key))
        .route("/keys/{id}/delete", post(admin::delete_key))
        .route("/keys/{id}/reset-device", post(admin::reset_key_device))
        .route_layer(middleware::from_fn(auth::require_admin));

    Router::new()
        .route("/me", get(auth::me))
        .route("/api-key/regenerate", post(auth::regenerate_api_key))
        .route("/deposits", post(deposits::create_deposit))
        .route("/deposits", get(deposits::my_deposits))
        .route("/keys/purchase", post(keys::purchase_key))
        .route("/keys", get(keys::my_keys))
        .route("/packs", get(keys::list_packs))
        .route("/metrics", get(observability::get_metrics))
        .nest("/admin", admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

async fn service_status(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "keyvend",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}
