use super::{non_empty, parse_id};
use crate::{
    error::{AppError, AppResult, StatusOk},
    models::{display_name, Role, School, User},
    schema::*,
    session::{Session, SignedIn},
    DbPool,
};
use axum::{
    extract::{Path, Query},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{pg::AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

#[derive(Serialize)]
struct OfficerResponse {
    id: i32,
    name: String,
    grade_level: Option<i32>,
}

#[derive(Serialize)]
struct SchoolResponse {
    id: i32,
    display_name: String,
    name: String,
    website: String,
    donations_raised: f64,
    donation_goal: f64,
    founded_date: Option<NaiveDate>,
    city: String,
    state: String,
    address: String,
    drive_folder: String,
    club_head: Option<OfficerResponse>,
    faculty_adviser: Option<OfficerResponse>,
    is_verified: bool,
}

#[derive(Serialize)]
struct OneSchool {
    status: &'static str,
    school: SchoolResponse,
}

#[derive(Serialize)]
struct ManySchools {
    status: &'static str,
    schools: Vec<SchoolResponse>,
}

#[derive(Serialize)]
struct CreatedSchool {
    status: &'static str,
    id: i32,
}

#[derive(Serialize)]
struct MemberResponse {
    id: i32,
    name: String,
    #[serde(rename = "type")]
    user_type: i32,
    grade_level: Option<i32>,
}

#[derive(Serialize)]
struct MembersResponse {
    status: &'static str,
    members: Vec<MemberResponse>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSchoolRequest {
    display_name: Option<String>,
    name: Option<String>,
    website: Option<String>,
    city: Option<String>,
    state: Option<String>,
    address: Option<String>,
    founded_date: Option<String>,
    donation_goal: Option<String>,
    drive_folder: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClubHeadRequest {
    user_id: Option<String>,
}

/// Escapes LIKE metacharacters and wraps the query for a substring match.
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn display_name_is_valid(name: &str) -> bool {
    (3..=64).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn website_is_valid(website: &str) -> bool {
    Url::parse(website)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn parse_donation_goal(value: Option<String>) -> AppResult<f64> {
    match non_empty(value) {
        None => Ok(0.0),
        Some(v) => v
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|goal| goal.is_finite() && *goal >= 0.0)
            .ok_or_else(|| AppError::bad_request("invalid_params")),
    }
}

fn parse_founded_date(value: Option<String>) -> AppResult<Option<NaiveDate>> {
    non_empty(value)
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .map_err(|_| AppError::bad_request("invalid_params"))
        })
        .transpose()
}

/// The school whose club head or faculty adviser is `user_id`, if any.
pub(crate) async fn officer_school(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> QueryResult<Option<i32>> {
    schools::table
        .filter(
            schools::club_head_id
                .eq(user_id)
                .or(schools::faculty_adviser_id.eq(user_id)),
        )
        .select(schools::id)
        .first::<i32>(conn)
        .await
        .optional()
}

async fn load_schools(
    conn: &mut AsyncPgConnection,
    schools: Vec<School>,
) -> AppResult<Vec<SchoolResponse>> {
    let officer_ids: Vec<i32> = schools
        .iter()
        .flat_map(|s| [s.club_head_id, s.faculty_adviser_id])
        .flatten()
        .collect();

    let officers: HashMap<i32, User> = users::table
        .filter(users::id.eq_any(officer_ids))
        .select(User::as_select())
        .load::<User>(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(schools
        .into_iter()
        .map(|school| SchoolResponse {
            club_head: school
                .club_head_id
                .and_then(|id| officers.get(&id))
                .map(|u| OfficerResponse {
                    id: u.id,
                    name: u.display_name(),
                    grade_level: u.grade_level,
                }),
            faculty_adviser: school
                .faculty_adviser_id
                .and_then(|id| officers.get(&id))
                .map(|u| OfficerResponse {
                    id: u.id,
                    name: display_name(&u.fname, &u.lname, true),
                    grade_level: None,
                }),
            id: school.id,
            display_name: school.display_name,
            name: school.name,
            website: school.website,
            donations_raised: school.donations_raised,
            donation_goal: school.donation_goal,
            founded_date: school.founded_date,
            city: school.city,
            state: school.state,
            address: school.address,
            drive_folder: school.drive_folder,
            is_verified: school.is_verified,
        })
        .collect())
}

async fn create(
    Extension(pool): Extension<DbPool>,
    Form(req): Form<NewSchoolRequest>,
) -> AppResult<Json<CreatedSchool>> {
    #[derive(Insertable)]
    #[diesel(table_name = schools)]
    struct NewSchool {
        display_name: String,
        name: String,
        website: String,
        donations_raised: f64,
        donation_goal: f64,
        founded_date: Option<NaiveDate>,
        city: String,
        state: String,
        address: String,
        drive_folder: String,
        is_verified: bool,
    }

    let (Some(display_name), Some(name), Some(website), Some(city), Some(state), Some(address)) = (
        non_empty(req.display_name),
        non_empty(req.name),
        non_empty(req.website),
        non_empty(req.city),
        non_empty(req.state),
        non_empty(req.address),
    ) else {
        return Err(AppError::bad_request("invalid_params"));
    };

    if !display_name_is_valid(&display_name) {
        return Err(AppError::bad_request("invalid_display_name"));
    }
    if !website_is_valid(&website) {
        return Err(AppError::bad_request("invalid_website"));
    }
    let founded_date = parse_founded_date(req.founded_date)?;
    let donation_goal = parse_donation_goal(req.donation_goal)?;

    let conn = &mut pool.get().await?;

    let id = diesel::insert_into(schools::table)
        .values(NewSchool {
            display_name,
            name,
            website,
            donations_raised: 0.0,
            donation_goal,
            founded_date,
            city,
            state,
            address,
            drive_folder: req.drive_folder.unwrap_or_default(),
            is_verified: false,
        })
        .on_conflict(schools::display_name)
        .do_nothing()
        .returning(schools::id)
        .get_result::<i32>(conn)
        .await
        .optional()?;

    let Some(id) = id else {
        return Err(AppError::bad_request("school_exists"));
    };

    tracing::info!(school_id = id, "created school");
    Ok(Json(CreatedSchool { status: "ok", id }))
}

async fn info(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Path(name): Path<String>,
) -> AppResult<Json<OneSchool>> {
    let conn = &mut pool.get().await?;

    let school = schools::table
        .filter(schools::display_name.eq(name))
        .select(School::as_select())
        .first::<School>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::not_found("invalid_school"))?;

    if !school.is_verified && !school.is_officer(session.user_id()) {
        return Err(AppError::unauthorized("school_unverified"));
    }

    let school = load_schools(conn, vec![school])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("`load_schools` should return one school"))?;

    Ok(Json(OneSchool {
        status: "ok",
        school,
    }))
}

async fn search(
    Extension(pool): Extension<DbPool>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ManySchools>> {
    let q = query.q.unwrap_or_default();
    if q.chars().count() <= 2 {
        return Err(AppError::bad_request("search_query_too_short"));
    }
    let pattern = like_pattern(&q);

    let conn = &mut pool.get().await?;

    let found = schools::table
        .filter(schools::is_verified.eq(true))
        .filter(
            schools::name
                .ilike(pattern.as_str())
                .or(schools::display_name.ilike(pattern.as_str())),
        )
        .order(schools::name.asc())
        .select(School::as_select())
        .load::<School>(conn)
        .await?;

    Ok(Json(ManySchools {
        status: "ok",
        schools: load_schools(conn, found).await?,
    }))
}

async fn set_club_head(
    Extension(pool): Extension<DbPool>,
    SignedIn(user_id): SignedIn,
    Form(req): Form<ClubHeadRequest>,
) -> AppResult<Json<StatusOk>> {
    let club_head_id = parse_id(req.user_id.as_deref())?;

    let conn = &mut pool.get().await?;

    let Some(school_id) = schools::table
        .filter(schools::faculty_adviser_id.eq(user_id))
        .select(schools::id)
        .first::<i32>(conn)
        .await
        .optional()?
    else {
        return Err(AppError::unauthorized("unauthorized"));
    };

    let is_student_of_school = users::table
        .find(club_head_id)
        .filter(users::school_id.eq(school_id))
        .filter(users::user_type.eq(Role::Student.code()))
        .select(users::id)
        .first::<i32>(conn)
        .await
        .optional()?
        .is_some();
    if !is_student_of_school {
        return Err(AppError::bad_request("invalid_club_head"));
    }

    diesel::update(schools::table.find(school_id))
        .set(schools::club_head_id.eq(club_head_id))
        .execute(conn)
        .await?;

    tracing::info!(school_id, club_head_id, "appointed club head");
    Ok(StatusOk::json())
}

async fn members(
    Extension(pool): Extension<DbPool>,
    SignedIn(user_id): SignedIn,
    Path(school_id): Path<String>,
) -> AppResult<Json<MembersResponse>> {
    let school_id = parse_id(Some(&school_id))?;

    let conn = &mut pool.get().await?;

    let own_school = users::table
        .find(user_id)
        .select(users::school_id)
        .first::<i32>(conn)
        .await
        .optional()?;
    if own_school != Some(school_id) {
        return Err(AppError::unauthorized("unauthorized"));
    }

    let members = users::table
        .filter(users::school_id.eq(school_id))
        .order(users::id.asc())
        .select(User::as_select())
        .load::<User>(conn)
        .await?
        .into_iter()
        .map(|u| MemberResponse {
            id: u.id,
            name: u.display_name(),
            user_type: u.user_type,
            grade_level: u.grade_level,
        })
        .collect();

    Ok(Json(MembersResponse {
        status: "ok",
        members,
    }))
}

pub fn app() -> Router {
    Router::new()
        .route("/new", post(create))
        .route("/get/:name", get(info))
        .route("/search", get(search))
        .route("/setClubHead", post(set_club_head))
        .route("/:school_id/members", get(members))
}
