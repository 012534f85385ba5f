use super::{non_empty, parse_bool};
use crate::{
    auth,
    error::{AppError, AppResult, StatusOk},
    models::{Role, User},
    schema::*,
    session::{Session, SignedIn},
    DbPool,
};
use axum::{
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherRegisterRequest {
    fname: Option<String>,
    lname: Option<String>,
    email: Option<String>,
    password: Option<String>,
    school_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentRegisterRequest {
    fname: Option<String>,
    lname: Option<String>,
    email: Option<String>,
    password: Option<String>,
    school_id: Option<String>,
    grade_level: Option<String>,
    shows_last_name: Option<String>,
    how_did_you_hear: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    status: &'static str,
    school: String,
}

#[derive(Serialize)]
struct Me {
    id: i32,
    fname: String,
    lname: String,
    shows_last_name: bool,
    email: String,
    school_id: i32,
    school: String,
    school_name: String,
    #[serde(rename = "type")]
    user_type: i32,
    grade_level: Option<i32>,
    how_did_you_hear: Option<String>,
    user_level: i32,
    registration: NaiveDateTime,
}

#[derive(Serialize)]
struct MeResponse {
    status: &'static str,
    me: Me,
}

/// Validated registration details shared by both account types.
struct Registration {
    fname: String,
    lname: String,
    email: String,
    password: String,
    school_id: String,
    role: Role,
    shows_last_name: bool,
    grade_level: Option<i32>,
    how_did_you_hear: Option<String>,
}

impl Registration {
    fn check_credentials(&self) -> AppResult<()> {
        if !auth::email_is_valid(&self.email) {
            return Err(AppError::bad_request("invalid_email"));
        }
        if !auth::password_is_acceptable(&self.password) {
            return Err(AppError::bad_request("insecure_password"));
        }
        Ok(())
    }
}

fn parse_grade_level(value: &str) -> Option<i32> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|grade| (1..=12).contains(grade))
}

async fn register(
    pool: &DbPool,
    mut session: Session,
    reg: Registration,
) -> AppResult<Json<StatusOk>> {
    #[derive(Insertable)]
    #[diesel(table_name = users)]
    struct NewUser {
        fname: String,
        lname: String,
        shows_last_name: bool,
        email: String,
        password_hash: String,
        school_id: i32,
        user_type: i32,
        grade_level: Option<i32>,
        how_did_you_hear: Option<String>,
        user_level: i32,
        registered_at: NaiveDateTime,
    }

    reg.check_credentials()?;

    let conn = &mut pool.get().await?;

    let existing = users::table
        .filter(users::email.eq(&reg.email))
        .select(users::id)
        .first::<i32>(conn)
        .await
        .optional()?;
    if existing.is_some() {
        return Err(AppError::bad_request("account_exists"));
    }

    let school_id = match reg.school_id.trim().parse::<i32>() {
        Ok(id) => schools::table
            .find(id)
            .select(schools::id)
            .first::<i32>(conn)
            .await
            .optional()?,
        Err(_) => None,
    };
    let Some(school_id) = school_id else {
        return Err(AppError::bad_request("school_not_found"));
    };

    let new_user = diesel::insert_into(users::table)
        .values(NewUser {
            fname: reg.fname,
            lname: reg.lname,
            shows_last_name: reg.shows_last_name,
            email: reg.email,
            password_hash: auth::hash_password(reg.password)?,
            school_id,
            user_type: reg.role.code(),
            grade_level: reg.grade_level,
            how_did_you_hear: reg.how_did_you_hear,
            user_level: 0,
            registered_at: Utc::now().naive_utc(),
        })
        .on_conflict(users::email)
        .do_nothing()
        .returning(users::id)
        .get_result::<i32>(conn)
        .await
        .optional()?;

    // a concurrent registration can still take the email between the check and the insert
    let Some(user_id) = new_user else {
        return Err(AppError::bad_request("account_exists"));
    };

    if reg.role == Role::Teacher {
        // the first teacher of a school takes the vacant adviser seat
        let claimed = diesel::update(schools::table.find(school_id))
            .filter(schools::faculty_adviser_id.is_null())
            .set(schools::faculty_adviser_id.eq(user_id))
            .execute(conn)
            .await?;
        if claimed > 0 {
            tracing::info!(user_id, school_id, "teacher became faculty adviser");
        }
    }

    session.sign_in(user_id).await?;
    tracing::info!(user_id, school_id, "registered account");

    Ok(StatusOk::json())
}

async fn register_teacher(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<TeacherRegisterRequest>,
) -> AppResult<Json<StatusOk>> {
    let (Some(fname), Some(lname), Some(email), Some(password), Some(school_id)) = (
        non_empty(req.fname),
        non_empty(req.lname),
        non_empty(req.email),
        non_empty(req.password),
        non_empty(req.school_id),
    ) else {
        return Err(AppError::bad_request("invalid_params"));
    };

    register(
        &pool,
        session,
        Registration {
            fname,
            lname,
            email,
            password,
            school_id,
            role: Role::Teacher,
            shows_last_name: true,
            grade_level: None,
            how_did_you_hear: None,
        },
    )
    .await
}

async fn register_student(
    Extension(pool): Extension<DbPool>,
    session: Session,
    Form(req): Form<StudentRegisterRequest>,
) -> AppResult<Json<StatusOk>> {
    let (
        Some(fname),
        Some(lname),
        Some(email),
        Some(password),
        Some(school_id),
        Some(grade_level),
        Some(how_did_you_hear),
    ) = (
        non_empty(req.fname),
        non_empty(req.lname),
        non_empty(req.email),
        non_empty(req.password),
        non_empty(req.school_id),
        non_empty(req.grade_level),
        non_empty(req.how_did_you_hear),
    )
    else {
        return Err(AppError::bad_request("invalid_params"));
    };

    let grade_level =
        parse_grade_level(&grade_level).ok_or_else(|| AppError::bad_request("invalid_params"))?;
    let shows_last_name = parse_bool(req.shows_last_name.as_deref())?;

    register(
        &pool,
        session,
        Registration {
            fname,
            lname,
            email,
            password,
            school_id,
            role: Role::Student,
            shows_last_name,
            grade_level: Some(grade_level),
            how_did_you_hear: Some(how_did_you_hear),
        },
    )
    .await
}

async fn login(
    Extension(pool): Extension<DbPool>,
    mut session: Session,
    Form(req): Form<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (Some(email), Some(password)) = (non_empty(req.email), non_empty(req.password)) else {
        return Err(AppError::bad_request("invalid_params"));
    };

    let conn = &mut pool.get().await?;

    if let Some((user_id, password_hash, school)) = users::table
        .inner_join(schools::table)
        .filter(users::email.eq(email))
        .select((users::id, users::password_hash, schools::display_name))
        .first::<(i32, String, String)>(conn)
        .await
        .optional()?
    {
        if auth::verify_password(password, &password_hash)? {
            session.sign_in(user_id).await?;
            return Ok(Json(LoginResponse {
                status: "ok",
                school,
            }));
        }
    }
    Err(AppError::unauthorized("invalid_login"))
}

async fn logout(mut session: Session) -> AppResult<Json<StatusOk>> {
    if session.user_id().is_none() {
        return Err(AppError::unauthorized("logged_out"));
    }

    session.sign_out().await?;

    Ok(StatusOk::json())
}

async fn me(
    Extension(pool): Extension<DbPool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<Json<MeResponse>> {
    let conn = &mut pool.get().await?;

    let Some((user, school, school_name)) = users::table
        .inner_join(schools::table)
        .filter(users::id.eq(user_id))
        .select((User::as_select(), schools::display_name, schools::name))
        .first::<(User, String, String)>(conn)
        .await
        .optional()?
    else {
        return Err(AppError::unauthorized("logged_out"));
    };

    Ok(Json(MeResponse {
        status: "ok",
        me: Me {
            id: user.id,
            fname: user.fname,
            lname: user.lname,
            shows_last_name: user.shows_last_name,
            email: user.email,
            school_id: user.school_id,
            school,
            school_name,
            user_type: user.user_type,
            grade_level: user.grade_level,
            how_did_you_hear: user.how_did_you_hear,
            user_level: user.user_level,
            registration: user.registered_at,
        },
    }))
}

pub fn app() -> Router {
    Router::new()
        .route("/registerTeacher", post(register_teacher))
        .route("/registerStudent", post(register_student))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}
