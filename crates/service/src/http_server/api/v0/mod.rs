use axum::Router;

pub mod access;
pub mod auth;
pub mod files;
pub mod patients;
pub mod providers;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/patients", patients::router(state.clone()))
        .nest("/providers", providers::router(state.clone()))
        .nest("/files", files::router(state.clone()))
        .nest("/access", access::router(state.clone()))
        .with_state(state)
}
