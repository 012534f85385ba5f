use super::{parse_bool, parse_id};
use crate::{
    error::{AppError, AppResult, StatusOk},
    models::User,
    schema::*,
    session::SignedIn,
    DbPool,
};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    routing::post,
    Extension, Form, Json, Router,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;

/// Admits only signed-in users with a user level above zero.
pub struct AdminOnly(pub i32);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminOnly {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> AppResult<Self> {
        let SignedIn(user_id) = SignedIn::from_request_parts(parts, state).await?;
        let Extension(pool) = Extension::<DbPool>::from_request_parts(parts, state).await?;

        let conn = &mut pool.get().await?;

        let user = users::table
            .find(user_id)
            .select(User::as_select())
            .first::<User>(conn)
            .await
            .optional()?;

        match user {
            Some(user) if user.is_admin() => Ok(AdminOnly(user_id)),
            _ => Err(AppError::from(StatusCode::FORBIDDEN, "forbidden")),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    school_id: Option<String>,
    verified: Option<String>,
}

async fn verify_school(
    Extension(pool): Extension<DbPool>,
    AdminOnly(admin_id): AdminOnly,
    Form(req): Form<VerifyRequest>,
) -> AppResult<Json<StatusOk>> {
    let school_id = parse_id(req.school_id.as_deref())?;
    let verified = parse_bool(req.verified.as_deref())?;

    let conn = &mut pool.get().await?;

    let updated = diesel::update(schools::table.find(school_id))
        .set(schools::is_verified.eq(verified))
        .execute(conn)
        .await?;

    if updated == 0 {
        return Err(AppError::not_found("invalid_school"));
    }

    tracing::info!(admin_id, school_id, verified, "changed school verification");
    Ok(StatusOk::json())
}

pub fn app() -> Router {
    Router::new().route("/verifySchool", post(verify_school))
}
