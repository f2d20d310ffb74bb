//! Version 1 of the API

use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::infrastructure::http::{open_api::ApiDocs, state::AppState};

pub mod activate;
pub mod register;
pub mod test_email;
pub mod uptime;

/// Routes mounted under `/api/v1`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(|| async { Json(ApiDocs::openapi()) }))
        .route("/uptime", get(uptime::handler))
        .route("/register", post(register::handler))
        .route("/activate", get(activate::handler))
        .route("/test-email", post(test_email::handler))
}
