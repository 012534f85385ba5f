use super::{non_empty, parse_id, school::officer_school};
use crate::{
    error::{AppError, AppResult, StatusOk},
    models::{display_name, Post},
    schema::*,
    session::Session,
    DbPool,
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct PostResponse {
    id: i32,
    title: String,
    date: NaiveDateTime,
    text: String,
    school_id: i32,
    author: String,
}

#[derive(Serialize)]
struct PostsResponse {
    status: &'static str,
    posts: Vec<PostResponse>,
}

#[derive(Deserialize)]
struct NewPostRequest {
    title: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct DeletePostRequest {
    id: Option<String>,
}

async fn list(
    Extension(pool): Extension<DbPool>,
    Path(school_id): Path<String>,
) -> AppResult<Json<PostsResponse>> {
    let school_id = parse_id(Some(&school_id))?;

    let conn = &mut pool.get().await?;

    let posts = posts::table
        .inner_join(users::table)
        .filter(posts::school_id.eq(school_id))
        .order((posts::posted_at.desc(), posts::id.desc()))
        .select((
            Post::as_select(),
            (users::fname, users::lname, users::shows_last_name),
        ))
        .load::<(Post, (String, String, bool))>(conn)
        .await?
        .into_iter()
        .map(|(post, (fname, lname, shows_last_name))| PostResponse {
            id: post.id,
            title: post.title,
            date: post.posted_at,
            text: post.body,
            school_id: post.school_id,
            author: display_name(&fname, &lname, shows_last_name),
        })
        .collect();

    Ok(Json(PostsResponse {
        status: "ok",
        posts,
    }))
}

async fn create(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<NewPostRequest>,
) -> AppResult<Json<StatusOk>> {
    #[derive(Insertable)]
    #[diesel(table_name = posts)]
    struct NewPost {
        title: String,
        body: String,
        author_id: i32,
        school_id: i32,
        posted_at: NaiveDateTime,
    }

    let (Some(title), Some(text)) = (non_empty(req.title), non_empty(req.text)) else {
        return Err(AppError::bad_request("invalid_params"));
    };

    let Some(user_id) = session.user_id() else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let conn = &mut pool.get().await?;

    let Some(school_id) = officer_school(conn, user_id).await? else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    diesel::insert_into(posts::table)
        .values(NewPost {
            title,
            body: text,
            author_id: user_id,
            school_id,
            posted_at: Utc::now().naive_utc(),
        })
        .execute(conn)
        .await?;

    tracing::info!(user_id, school_id, "published post");
    Ok(StatusOk::json())
}

async fn delete(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<DeletePostRequest>,
) -> AppResult<Json<StatusOk>> {
    let post_id = parse_id(req.id.as_deref())?;

    let Some(user_id) = session.user_id() else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let conn = &mut pool.get().await?;

    let Some(school_id) = officer_school(conn, user_id).await? else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let Some(post_school_id) = posts::table
        .find(post_id)
        .select(posts::school_id)
        .first::<i32>(conn)
        .await
        .optional()?
    else {
        return Err(AppError::not_found("post_not_found"));
    };

    if post_school_id != school_id {
        return Err(AppError::unauthorized("unauthorized"));
    }

    diesel::delete(posts::table.find(post_id))
        .execute(conn)
        .await?;

    tracing::info!(user_id, post_id, "deleted post");
    Ok(StatusOk::json())
}

pub fn app() -> Router {
    Router::new()
        .route("/:school_id/getPosts", get(list))
        .route("/posts/new", post(create))
        .route("/posts/delete", post(delete))
}
