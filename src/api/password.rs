use super::non_empty;
use crate::{
    auth,
    email::{password_reset_body, Mailer},
    error::{AppError, AppResult, StatusOk},
    schema::*,
    DbPool,
};
use axum::{http::StatusCode, routing::post, Extension, Form, Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use lettre::{message::Mailbox, Address};
use serde::Deserialize;
use url::Url;

// reset links stay valid for one day
const RESET_ALLOWED_HOURS: i64 = 24;

#[derive(Deserialize)]
struct PwdRequest {
    email: Option<String>,
}

#[derive(Deserialize)]
struct NewPwdRequest {
    key: Option<String>,
    password: Option<String>,
}

fn reset_link(frontend_host: &str, key: &str) -> anyhow::Result<Url> {
    Ok(Url::parse_with_params(
        &format!("{frontend_host}/resetPassword"),
        &[("key", key)],
    )?)
}

async fn request_password_reset(
    Extension(pool): Extension<DbPool>,
    Extension(mailer): Extension<Mailer>,
    Form(req): Form<PwdRequest>,
) -> AppResult<Json<StatusOk>> {
    let Some(email) = non_empty(req.email) else {
        return Err(AppError::bad_request("missing_params"));
    };

    let conn = &mut pool.get().await?;

    let Some((user_id, fname, lname)) = users::table
        .filter(users::email.eq(&email))
        .select((users::id, users::fname, users::lname))
        .first::<(i32, String, String)>(conn)
        .await
        .optional()?
    else {
        return Err(AppError::not_found("email_not_found"));
    };

    let key = auth::generate_token();

    diesel::insert_into(password_resets::table)
        .values((
            password_resets::user_id.eq(user_id),
            password_resets::key_digest.eq(auth::token_digest(&key)),
            password_resets::expires_at
                .eq((Utc::now() + chrono::Duration::hours(RESET_ALLOWED_HOURS)).naive_utc()),
            password_resets::used.eq(false),
        ))
        .execute(conn)
        .await?;

    let link = reset_link(mailer.frontend_host(), &key)?;
    let destination = email
        .parse::<Address>()
        .map_err(|_| AppError::bad_request("invalid_email"))?;

    if let Err(e) = mailer
        .send(
            Mailbox::new(Some(format!("{fname} {lname}")), destination),
            "Student Club Portal Password Reset",
            password_reset_body(&fname, link.as_str()),
        )
        .await
    {
        tracing::error!(user_id, "failed to send password reset email: {e:?}");
        return Err(AppError::from(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_server_error",
        ));
    }

    tracing::info!(user_id, "sent password reset email");
    Ok(StatusOk::json())
}

async fn reset_password(
    Extension(pool): Extension<DbPool>,
    Form(req): Form<NewPwdRequest>,
) -> AppResult<Json<StatusOk>> {
    let (Some(key), Some(password)) = (non_empty(req.key), non_empty(req.password)) else {
        return Err(AppError::bad_request("missing_params"));
    };

    if !auth::password_is_acceptable(&password) {
        return Err(AppError::bad_request("insecure_password"));
    }

    let password_hash = auth::hash_password(password)?;

    let conn = &mut pool.get().await?;

    let key_digest = auth::token_digest(&key);
    let user_id = conn
        .transaction::<_, AppError, _>(|conn| {
            async move {
                // claiming the key and marking it used is one statement, so a
                // key cannot be spent twice
                let Some(user_id) = diesel::update(password_resets::table)
                    .filter(password_resets::key_digest.eq(key_digest))
                    .filter(password_resets::used.eq(false))
                    .filter(password_resets::expires_at.gt(Utc::now().naive_utc()))
                    .set(password_resets::used.eq(true))
                    .returning(password_resets::user_id)
                    .get_result::<i32>(conn)
                    .await
                    .optional()?
                else {
                    return Err(AppError::unauthorized("no_reset_available"));
                };

                diesel::update(users::table.find(user_id))
                    .set(users::password_hash.eq(password_hash))
                    .execute(conn)
                    .await?;

                Ok(user_id)
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(user_id, "password reset");
    Ok(StatusOk::json())
}

/// Deletes reset keys that were spent or have expired.
pub async fn purge_stale_resets(pool: &DbPool) -> anyhow::Result<usize> {
    let conn = &mut pool.get().await?;

    Ok(diesel::delete(password_resets::table)
        .filter(
            password_resets::used
                .eq(true)
                .or(password_resets::expires_at.le(Utc::now().naive_utc())),
        )
        .execute(conn)
        .await?)
}

pub fn app() -> Router {
    Router::new()
        .route("/requestPasswordReset", post(request_password_reset))
        .route("/resetPassword", post(reset_password))
}
