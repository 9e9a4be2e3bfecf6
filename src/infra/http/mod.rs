//! HTTP surface: token issuance and config CRUD behind token auth.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub fn build_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    let config_routes = Router::new()
        .route(
            "/api/configs/{app}",
            get(handlers::get_config)
                .post(handlers::create_config)
                .put(handlers::update_config)
                .delete(handlers::delete_config),
        )
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::token_auth,
        ));

    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/tokens", post(handlers::issue_token))
        .merge(config_routes)
        .with_state(state)
}
