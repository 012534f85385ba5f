use super::{non_empty, parse_id, school::officer_school};
use crate::{
    error::{AppError, AppResult, StatusOk},
    models::Event,
    schema::*,
    session::Session,
    DbPool,
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::{pg::AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EventResponse {
    id: i32,
    title: String,
    attendance: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    description: String,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            attendance: event.attendance,
            start: event.starts_at,
            end: event.ends_at,
            description: event.description,
        }
    }
}

#[derive(Serialize)]
struct EventsResponse {
    status: &'static str,
    events: Vec<EventResponse>,
}

#[derive(Deserialize)]
struct NewEventRequest {
    title: Option<String>,
    description: Option<String>,
    attendance: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct DeleteEventRequest {
    id: Option<String>,
}

/// Accepts RFC 3339 timestamps, converting to UTC, or offset-less
/// `YYYY-MM-DDTHH:MM[:SS]` values that are already UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").ok())
}

async fn load_events(
    conn: &mut AsyncPgConnection,
    school_id: i32,
    upcoming_only: bool,
) -> AppResult<Json<EventsResponse>> {
    let mut query = events::table
        .filter(events::school_id.eq(school_id))
        .order((events::starts_at.asc(), events::id.asc()))
        .select(Event::as_select())
        .into_boxed();

    if upcoming_only {
        query = query.filter(events::ends_at.gt(Utc::now().naive_utc()));
    }

    let events = query
        .load::<Event>(conn)
        .await?
        .into_iter()
        .map(EventResponse::from)
        .collect();

    Ok(Json(EventsResponse {
        status: "ok",
        events,
    }))
}

async fn list_upcoming(
    Extension(pool): Extension<DbPool>,
    Path(school_id): Path<String>,
) -> AppResult<Json<EventsResponse>> {
    let school_id = parse_id(Some(&school_id))?;
    let conn = &mut pool.get().await?;
    load_events(conn, school_id, true).await
}

async fn list_all(
    Extension(pool): Extension<DbPool>,
    Path(school_id): Path<String>,
) -> AppResult<Json<EventsResponse>> {
    let school_id = parse_id(Some(&school_id))?;
    let conn = &mut pool.get().await?;
    load_events(conn, school_id, false).await
}

async fn create(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<NewEventRequest>,
) -> AppResult<Json<StatusOk>> {
    #[derive(Insertable)]
    #[diesel(table_name = events)]
    struct NewEvent {
        title: String,
        description: String,
        attendance: String,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        school_id: i32,
    }

    let (Some(title), Some(description), Some(attendance), Some(start), Some(end)) = (
        non_empty(req.title),
        non_empty(req.description),
        non_empty(req.attendance),
        non_empty(req.start),
        non_empty(req.end),
    ) else {
        return Err(AppError::bad_request("invalid_params"));
    };

    let (Some(starts_at), Some(ends_at)) = (parse_timestamp(&start), parse_timestamp(&end)) else {
        return Err(AppError::bad_request("invalid_params"));
    };
    if ends_at < starts_at {
        return Err(AppError::bad_request("invalid_params"));
    }

    let Some(user_id) = session.user_id() else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let conn = &mut pool.get().await?;

    let Some(school_id) = officer_school(conn, user_id).await? else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    diesel::insert_into(events::table)
        .values(NewEvent {
            title,
            description,
            attendance,
            starts_at,
            ends_at,
            school_id,
        })
        .execute(conn)
        .await?;

    tracing::info!(user_id, school_id, "scheduled event");
    Ok(StatusOk::json())
}

async fn delete(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<DeleteEventRequest>,
) -> AppResult<Json<StatusOk>> {
    let event_id = parse_id(req.id.as_deref())?;

    let Some(user_id) = session.user_id() else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let conn = &mut pool.get().await?;

    let Some(school_id) = officer_school(conn, user_id).await? else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let Some(event_school_id) = events::table
        .find(event_id)
        .select(events::school_id)
        .first::<i32>(conn)
        .await
        .optional()?
    else {
        return Err(AppError::not_found("event_not_found"));
    };

    if event_school_id != school_id {
        return Err(AppError::unauthorized("unauthorized"));
    }

    diesel::delete(events::table.find(event_id))
        .execute(conn)
        .await?;

    tracing::info!(user_id, event_id, "deleted event");
    Ok(StatusOk::json())
}

pub fn app() -> Router {
    Router::new()
        .route("/:school_id/getEvents", get(list_upcoming))
        .route("/:school_id/getAllEvents", get(list_all))
        .route("/events/new", post(create))
        .route("/events/delete", post(delete))
}
