use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn handler() -> Response {
    Json(common::prelude::build_info()).into_response()
}
