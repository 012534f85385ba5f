use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, Extension, Router};
use deadpool::managed::Pool;
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

pub mod api;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod schema;
pub mod session;

use email::Mailer;
use session::SessionStore;

pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Builds the pool without opening a connection; connections are made on
/// first use.
pub fn connect_to_db(db_url: &str) -> anyhow::Result<DbPool> {
    let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(db_config)
        .build()
        .context("failed to build database pool")
}

pub fn app(pool: DbPool, sessions: Arc<dyn SessionStore>, mailer: Mailer) -> Router {
    Router::new()
        .merge(api::app())
        .layer(Extension(pool))
        .layer(Extension(mailer))
        .layer(middleware::from_fn_with_state(
            sessions,
            session::attach_session,
        ))
}

/// Trailing slashes have to go before the router matches the path, so this
/// wraps the finished router rather than being one of its layers.
pub fn trim_trailing_slashes(app: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(app)
}
