use crate::error::{AppError, AppResult};
use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

pub mod admin;
pub mod auth;
pub mod event;
pub mod password;
pub mod post;
pub mod school;

#[derive(Serialize)]
struct VersionResponse {
    status: &'static str,
    version: &'static str,
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn teapot() -> AppResult<()> {
    Err(AppError::from(
        StatusCode::IM_A_TEAPOT,
        "requested_body_is_short_and_stout",
    ))
}

/// Treats an empty form value the same as a missing one.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub(crate) fn parse_id(value: Option<&str>) -> AppResult<i32> {
    value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .ok_or_else(|| AppError::bad_request("invalid_params"))
}

pub(crate) fn parse_bool(value: Option<&str>) -> AppResult<bool> {
    match value {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(AppError::bad_request("invalid_params")),
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(version))
        .route("/teapot", get(teapot))
        .nest("/auth", auth::app().merge(password::app()))
        .nest("/schools", school::app())
        .nest("/admin", admin::app())
        .merge(post::app())
        .merge(event::app())
}
