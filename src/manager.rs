use crate::models::{
    AttendanceSession, Course, DbStudent, NewCourse, NewDbStudent, NewProfessor, NewSession,
    Professor, SessionListing,
};
use crate::schema::{attendance_records, attendance_sessions, courses, professors, students};
use chrono::{NaiveDateTime, Timelike};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as QueryError};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use diesel::ConnectionError;
use std::fmt;
use std::str::FromStr;

/// Table definitions, executed on every bootstrap. Each statement is a no-op if the table exists.
const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id TEXT NOT NULL UNIQUE,
        fullname TEXT NOT NULL,
        group_name TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS courses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course_code TEXT NOT NULL UNIQUE,
        course_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS professors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS attendance_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course_id INTEGER,
        group_name TEXT,
        session_date DATE NOT NULL,
        opened_by INTEGER,
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS attendance_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        student_id INTEGER NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('present', 'absent')),
        recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
];

/// Courses inserted by bootstrap unless a course with the same code exists.
pub const SEED_COURSES: [(&str, &str); 2] = [
    ("CS101", "Introduction to Programming"),
    ("CS102", "Database Systems"),
];

/// Professors inserted by bootstrap unless a professor with the same email exists.
pub const SEED_PROFESSORS: [(&str, &str); 2] = [
    ("Dr. Smith", "smith@university.edu"),
    ("Dr. Johnson", "johnson@university.edu"),
];

#[derive(Debug)]
pub enum DbError {
    Connection(ConnectionError),
    Query(QueryError),
}

impl DbError {
    /// Whether the statement was rejected by a `UNIQUE` constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DbError::Query(QueryError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
        )
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Connection(e) => write!(f, "Database connection failed: {}", e),
            DbError::Query(e) => write!(f, "Database query failed: {}", e),
        }
    }
}

impl std::error::Error for DbError {}

impl From<ConnectionError> for DbError {
    fn from(e: ConnectionError) -> Self {
        DbError::Connection(e)
    }
}

impl From<QueryError> for DbError {
    fn from(e: QueryError) -> Self {
        DbError::Query(e)
    }
}

/// The tables the status page may inspect. Only these names ever reach a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbTable {
    Students,
    Courses,
    Professors,
    AttendanceSessions,
    AttendanceRecords,
}

impl DbTable {
    pub const ALL: [DbTable; 5] = [
        DbTable::Students,
        DbTable::Courses,
        DbTable::Professors,
        DbTable::AttendanceSessions,
        DbTable::AttendanceRecords,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DbTable::Students => "students",
            DbTable::Courses => "courses",
            DbTable::Professors => "professors",
            DbTable::AttendanceSessions => "attendance_sessions",
            DbTable::AttendanceRecords => "attendance_records",
        }
    }

    /// Looks a table up by name, returning `None` for anything outside [`DbTable::ALL`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name() == name)
    }
}

impl FromStr for DbTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(DbTable::name).collect();
            format!("unknown table '{s}', expected one of: {}", known.join(", "))
        })
    }
}

/// Existence and size of one table, as shown on the status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub table: DbTable,
    pub exists: bool,
    /// `None` if the table could not be counted.
    pub rows: Option<i64>,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// The manager for the relational registry: students, courses, professors and sessions.
///
/// Each instance owns one connection. Request handlers open a fresh one per request and drop it
/// when done; no statement spans a transaction.
pub struct SchoolDb {
    db: SqliteConnection,
}

impl SchoolDb {
    /// Connects to the `sqlite3` database at `database_url`.
    pub fn connect(database_url: &str) -> Result<Self, DbError> {
        let connection = SqliteConnection::establish(database_url)?;

        Ok(Self { db: connection })
    }

    /// Creates any missing table and inserts any missing seed row.
    ///
    /// Safe to call any number of times.
    pub fn initialize(&mut self) -> Result<(), DbError> {
        for statement in SCHEMA {
            sql_query(statement).execute(&mut self.db)?;
        }
        tracing::debug!("Tables created/verified");

        let seed_courses: Vec<NewCourse> = SEED_COURSES
            .iter()
            .map(|&(course_code, course_name)| NewCourse {
                course_code,
                course_name,
            })
            .collect();
        let courses_inserted = diesel::insert_or_ignore_into(courses::table)
            .values(&seed_courses)
            .execute(&mut self.db)?;

        let seed_professors: Vec<NewProfessor> = SEED_PROFESSORS
            .iter()
            .map(|&(name, email)| NewProfessor { name, email })
            .collect();
        let professors_inserted = diesel::insert_or_ignore_into(professors::table)
            .values(&seed_professors)
            .execute(&mut self.db)?;

        tracing::debug!(
            "Seeded {} course(s) and {} professor(s)",
            courses_inserted,
            professors_inserted
        );

        Ok(())
    }

    /// Inserts a student stamped with `now` into the relational registry and returns its
    /// surrogate id.
    pub fn add_student(
        &mut self,
        student_id: &str,
        fullname: &str,
        group_name: &str,
        now: NaiveDateTime,
    ) -> Result<i32, DbError> {
        let id = diesel::insert_into(students::table)
            .values(NewDbStudent {
                student_id,
                fullname,
                group_name,
                created_at: now.with_nanosecond(0).unwrap_or(now),
            })
            .returning(students::id)
            .get_result(&mut self.db)?;

        Ok(id)
    }

    /// Retrieves all students, newest first.
    pub fn students(&mut self) -> Result<Vec<DbStudent>, DbError> {
        let found = students::table
            .select(DbStudent::as_select())
            .order((students::created_at.desc(), students::id.desc()))
            .load(&mut self.db)?;

        Ok(found)
    }

    pub fn courses(&mut self) -> Result<Vec<Course>, DbError> {
        let found = courses::table
            .select(Course::as_select())
            .order(courses::id)
            .load(&mut self.db)?;

        Ok(found)
    }

    pub fn professors(&mut self) -> Result<Vec<Professor>, DbError> {
        let found = professors::table
            .select(Professor::as_select())
            .order(professors::id)
            .load(&mut self.db)?;

        Ok(found)
    }

    /// Opens a session dated and stamped from `now`, and returns its id.
    ///
    /// `course_id` and `professor_id` are stored as given; they are not checked against the
    /// `courses` and `professors` tables.
    pub fn create_session(
        &mut self,
        course_id: i32,
        group_name: &str,
        professor_id: i32,
        now: NaiveDateTime,
    ) -> Result<i32, DbError> {
        let id = diesel::insert_into(attendance_sessions::table)
            .values(NewSession {
                course_id,
                group_name,
                session_date: now.date(),
                opened_by: professor_id,
                created_at: now.with_nanosecond(0).unwrap_or(now),
            })
            .returning(attendance_sessions::id)
            .get_result(&mut self.db)?;

        Ok(id)
    }

    /// Retrieves all sessions, newest first, with the code of their course and the name of the
    /// professor who opened them. Sessions whose course or professor is gone are still listed.
    pub fn sessions(&mut self) -> Result<Vec<SessionListing>, DbError> {
        let rows = attendance_sessions::table
            .left_join(courses::table)
            .left_join(professors::table)
            .select((
                AttendanceSession::as_select(),
                courses::course_code.nullable(),
                professors::name.nullable(),
            ))
            .order((
                attendance_sessions::created_at.desc(),
                attendance_sessions::id.desc(),
            ))
            .load::<(AttendanceSession, Option<String>, Option<String>)>(&mut self.db)?;

        Ok(rows
            .into_iter()
            .map(|(session, course_code, professor_name)| SessionListing {
                session,
                course_code,
                professor_name,
            })
            .collect())
    }

    pub fn table_exists(&mut self, table: DbTable) -> Result<bool, DbError> {
        let row = sql_query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind::<Text, _>(table.name())
        .get_result::<CountRow>(&mut self.db)?;

        Ok(row.count > 0)
    }

    /// Returns the number of rows in `table`.
    pub fn count_rows(&mut self, table: DbTable) -> Result<i64, DbError> {
        let count: i64 = match table {
            DbTable::Students => students::table.count().get_result(&mut self.db),
            DbTable::Courses => courses::table.count().get_result(&mut self.db),
            DbTable::Professors => professors::table.count().get_result(&mut self.db),
            DbTable::AttendanceSessions => {
                attendance_sessions::table.count().get_result(&mut self.db)
            }
            DbTable::AttendanceRecords => {
                attendance_records::table.count().get_result(&mut self.db)
            }
        }?;

        Ok(count)
    }

    /// Existence and row count of `table`. The count is `None` if the table is missing.
    pub fn status_of(&mut self, table: DbTable) -> Result<TableStatus, DbError> {
        let exists = self.table_exists(table)?;
        let rows = self.count_rows(table).ok();

        Ok(TableStatus {
            table,
            exists,
            rows,
        })
    }

    /// Existence and row count for every table in [`DbTable::ALL`].
    pub fn table_status(&mut self) -> Result<Vec<TableStatus>, DbError> {
        DbTable::ALL
            .into_iter()
            .map(|table| self.status_of(table))
            .collect()
    }
}
