use axum::Router;

mod error;
mod session;
pub mod v0;

pub use error::ApiError;
pub use session::Authenticated;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/v0", v0::router(state.clone()))
        .with_state(state)
}
