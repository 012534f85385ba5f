use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    ServiceExt,
};
use envconfig::Envconfig;
use studentclubportal_server::{
    api::password::purge_stale_resets,
    config::Config,
    connect_to_db,
    email::Mailer,
    session::{PgSessionStore, SessionStore},
    trim_trailing_slashes,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

const BANNER: &str = r"
 ___ _           _         _      _       _
/ __| |_ _  _ __| |___ _ _| |_ __| |_  _ | |__
\__ \  _| || / _` / -_) ' \  _/ _| | || || '_ \
|___/\__|\_,_\__,_\___|_||_\__\__|_|\_,_||_.__/
                             studentclubportal-server
";

// how often expired sessions and spent reset keys are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studentclubportal_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::init_from_env().context("failed to read configuration")?;

    let mailer = Mailer::new(&config.mail)?;
    if let Err(e) = mailer.sanity_check().await {
        tracing::warn!("email sanity check failed. password resets will not work: {e}");
    }

    let pool = connect_to_db(&config.db_url)?;
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));

    let purger = sessions.clone();
    let purge_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purger.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("purged {n} expired sessions"),
                Err(e) => tracing::error!("failed to purge expired sessions: {e:?}"),
            }
            match purge_stale_resets(&purge_pool).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("purged {n} stale password resets"),
                Err(e) => tracing::error!("failed to purge password resets: {e:?}"),
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("CORS_ORIGIN is not a valid header value")?,
        )
        .allow_credentials(true);

    let app = studentclubportal_server::app(pool, sessions, mailer)
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
    let app = trim_trailing_slashes(app);

    println!("{BANNER}");
    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    tracing::info!("listening on {}", config.address);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;

    Ok(())
}
