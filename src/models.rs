//! Row types for the relational store. See [`crate::schema`] for the tables they map onto.

use crate::schema::{attendance_sessions, courses, professors, students};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use std::fmt;
use std::str::FromStr;

/// A student in the relational registry.
///
/// This registry is independent from the JSON roster kept by [`crate::roster::JsonStore`]; the
/// same `student_id` may exist in either, both, or neither.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DbStudent {
    pub id: i32,
    pub student_id: String,
    pub fullname: String,
    pub group_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = students)]
pub struct NewDbStudent<'a> {
    pub student_id: &'a str,
    pub fullname: &'a str,
    pub group_name: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Course {
    pub id: i32,
    pub course_code: String,
    pub course_name: String,
}

#[derive(Insertable)]
#[diesel(table_name = courses)]
pub struct NewCourse<'a> {
    pub course_code: &'a str,
    pub course_name: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = professors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Professor {
    pub id: i32,
    pub name: String,
    pub email: String,
}

#[derive(Insertable)]
#[diesel(table_name = professors)]
pub struct NewProfessor<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

/// Whether a session still accepts attendance.
///
/// Nothing in this crate moves a session from [`SessionStatus::Open`] to
/// [`SessionStatus::Closed`]; operators do that with a manual `UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Open => write!(f, "Open"),
            SessionStatus::Closed => write!(f, "Closed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "closed" => Ok(SessionStatus::Closed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

impl ToSql<Text, Sqlite> for SessionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for SessionStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        value.parse().map_err(Into::into)
    }
}

/// A row of `attendance_sessions`. `course_id` and `opened_by` are weak references: the rows they
/// name may not exist.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = attendance_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceSession {
    pub id: i32,
    pub course_id: Option<i32>,
    pub group_name: Option<String>,
    pub session_date: NaiveDate,
    pub opened_by: Option<i32>,
    pub status: SessionStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = attendance_sessions)]
pub struct NewSession<'a> {
    pub course_id: i32,
    pub group_name: &'a str,
    pub session_date: NaiveDate,
    pub opened_by: i32,
    pub created_at: NaiveDateTime,
}

/// A session joined with the course and professor it references, if they still exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListing {
    pub session: AttendanceSession,
    pub course_code: Option<String>,
    pub professor_name: Option<String>,
}

impl SessionListing {
    /// Shown in place of a course or professor that no longer exists.
    pub const PLACEHOLDER: &'static str = "N/A";

    pub fn course_label(&self) -> &str {
        self.course_code.as_deref().unwrap_or(Self::PLACEHOLDER)
    }

    pub fn professor_label(&self) -> &str {
        self.professor_name.as_deref().unwrap_or(Self::PLACEHOLDER)
    }
}
