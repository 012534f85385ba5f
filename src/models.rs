use crate::schema::*;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

/// Account type, stored as an integer in `users.user_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn code(self) -> i32 {
        match self {
            Role::Teacher => 0,
            Role::Student => 1,
        }
    }
}

/// Students may hide their last name; teachers are always shown in full.
pub fn display_name(fname: &str, lname: &str, shows_last_name: bool) -> String {
    if shows_last_name {
        format!("{fname} {lname}")
    } else {
        fname.to_string()
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(belongs_to(School))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub fname: String,
    pub lname: String,
    pub shows_last_name: bool,
    pub email: String,
    pub password_hash: String,
    pub school_id: i32,
    pub user_type: i32,
    pub grade_level: Option<i32>,
    pub how_did_you_hear: Option<String>,
    pub user_level: i32,
    pub registered_at: NaiveDateTime,
}

impl User {
    pub fn display_name(&self) -> String {
        display_name(&self.fname, &self.lname, self.shows_last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.user_level > 0
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct School {
    pub id: i32,
    pub display_name: String,
    pub name: String,
    pub website: String,
    pub donations_raised: f64,
    pub donation_goal: f64,
    pub founded_date: Option<NaiveDate>,
    pub city: String,
    pub state: String,
    pub address: String,
    pub drive_folder: String,
    pub club_head_id: Option<i32>,
    pub faculty_adviser_id: Option<i32>,
    pub is_verified: bool,
}

impl School {
    /// Whether `user_id` is this school's club head or faculty adviser.
    pub fn is_officer(&self, user_id: Option<i32>) -> bool {
        user_id.is_some() && (user_id == self.club_head_id || user_id == self.faculty_adviser_id)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(belongs_to(School))]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub author_id: i32,
    pub school_id: i32,
    pub posted_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(belongs_to(School))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Event {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub attendance: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub school_id: i32,
}
