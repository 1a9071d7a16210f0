//! Request handlers for the single page.
//!
//! `POST` submissions are validated, persisted to one of the stores, and answered with a
//! `303 See Other` back to the view they came from, carrying a [`Flash`] with the outcome.
//! `GET` requests render the view named by `?view=`, consuming any pending flash.

use crate::AppState;
use crate::flash::{FLASH_COOKIE, Flash};
use crate::roster::{Presence, RosterError};
use crate::views::{self, View};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::fmt;

/// A submitted form, field name to raw value.
pub type FormData = HashMap<String, String>;

/// The kinds of submission, selected by the `form_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    AddStudentFlat,
    TakeAttendanceFlat,
    AddStudentDb,
    CreateSession,
}

impl FormKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "add_student_flat" | "add_student_json" => Some(FormKind::AddStudentFlat),
            "take_attendance_flat" | "take_attendance_json" => Some(FormKind::TakeAttendanceFlat),
            "add_student_db" => Some(FormKind::AddStudentDb),
            "create_session" => Some(FormKind::CreateSession),
            _ => None,
        }
    }

    /// The view the form lives on, and where its submission redirects.
    pub fn origin(&self) -> View {
        match self {
            FormKind::AddStudentFlat => View::RosterJson,
            FormKind::TakeAttendanceFlat => View::AttendanceJson,
            FormKind::AddStudentDb => View::RosterDb,
            FormKind::CreateSession => View::SessionsDb,
        }
    }
}

#[derive(Debug)]
pub enum FormError {
    MissingField(&'static str),
    InvalidNumber(&'static str),
    InvalidStatus(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::MissingField(field) => {
                write!(f, "All fields are required! Missing: {}", field)
            }
            FormError::InvalidNumber(field) => write!(f, "Field {} must be a number.", field),
            FormError::InvalidStatus(student_id) => {
                write!(f, "Invalid attendance status for student {}.", student_id)
            }
        }
    }
}

impl std::error::Error for FormError {}

impl From<FormError> for Flash {
    fn from(e: FormError) -> Self {
        Flash::error(e.to_string())
    }
}

/// The trimmed value of `field`, rejecting absent, empty and whitespace-only values.
fn required<'a>(form: &'a FormData, field: &'static str) -> Result<&'a str, FormError> {
    form.get(field)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or(FormError::MissingField(field))
}

fn required_id(form: &FormData, field: &'static str) -> Result<i32, FormError> {
    required(form, field)?
        .parse()
        .map_err(|_| FormError::InvalidNumber(field))
}

/// Runs the submission in `form` and returns the view to redirect to along with the outcome.
pub fn process_submission(state: &AppState, form: &FormData, now: NaiveDateTime) -> (View, Flash) {
    let kind = form
        .get("form_type")
        .and_then(|name| FormKind::from_name(name.trim()));

    let Some(kind) = kind else {
        tracing::warn!("Ignoring submission with form_type {:?}", form.get("form_type"));
        return (View::Home, Flash::error("Unknown form submission."));
    };

    let outcome = match kind {
        FormKind::AddStudentFlat => add_student_flat(state, form, now),
        FormKind::TakeAttendanceFlat => take_attendance_flat(state, form, now),
        FormKind::AddStudentDb => add_student_db(state, form, now),
        FormKind::CreateSession => create_session(state, form, now),
    };

    let flash = outcome.unwrap_or_else(|flash| flash);
    (kind.origin(), flash)
}

fn add_student_flat(state: &AppState, form: &FormData, now: NaiveDateTime) -> Result<Flash, Flash> {
    let student_id = required(form, "student_id")?;
    let name = required(form, "name")?;
    let group = required(form, "group")?;

    match state.store.register_student(student_id, name, group, now) {
        Ok(student) => {
            tracing::info!("Added {} to the JSON roster", student.student_id);
            Ok(Flash::success("Student added successfully to JSON!"))
        }
        Err(RosterError::DuplicateStudent(_)) => Err(Flash::error("Student ID already exists!")),
        Err(e) => {
            tracing::error!("Cannot register {}: {}", student_id, e);
            Err(Flash::error("Could not save the student to the JSON file."))
        }
    }
}

fn take_attendance_flat(
    state: &AppState,
    form: &FormData,
    now: NaiveDateTime,
) -> Result<Flash, Flash> {
    let today = now.date();
    let already_taken = || Flash::warning("Attendance for today already taken!");

    if state.store.attendance_taken(today) {
        return Err(already_taken());
    }

    let mut statuses = HashMap::new();
    for student in state.store.roster() {
        let Some(raw) = form.get(&format!("status_{}", student.student_id)) else {
            continue;
        };
        let status: Presence = raw
            .trim()
            .parse()
            .map_err(|_| FormError::InvalidStatus(student.student_id.clone()))?;
        statuses.insert(student.student_id, status);
    }

    match state.store.take_attendance(today, &statuses) {
        Ok(snapshot) => {
            tracing::info!("Saved attendance for {} ({} students)", today, snapshot.len());
            Ok(Flash::success(format!("Attendance saved for {}!", today)))
        }
        Err(RosterError::AlreadyTaken(_)) => Err(already_taken()),
        Err(e) => {
            tracing::error!("Cannot save attendance for {}: {}", today, e);
            Err(Flash::error("Could not save attendance."))
        }
    }
}

fn connection_failed() -> Flash {
    Flash::error("Database connection failed.")
}

fn add_student_db(state: &AppState, form: &FormData, now: NaiveDateTime) -> Result<Flash, Flash> {
    let student_id = required(form, "student_id_db")?;
    let fullname = required(form, "fullname")?;
    let group_name = required(form, "group_name")?;

    let mut db = state.connect().map_err(|_| connection_failed())?;

    match db.add_student(student_id, fullname, group_name, now) {
        Ok(id) => {
            tracing::info!("Added {} to the database as #{}", student_id, id);
            Ok(Flash::success("Student added to database!"))
        }
        Err(e) if e.is_unique_violation() => {
            Err(Flash::error("Student ID already exists in database!"))
        }
        Err(e) => {
            tracing::error!("Cannot insert student {}: {}", student_id, e);
            Err(Flash::error("Could not add the student to the database."))
        }
    }
}

fn create_session(state: &AppState, form: &FormData, now: NaiveDateTime) -> Result<Flash, Flash> {
    let course_id = required_id(form, "course_id")?;
    let group_name = required(form, "group_name")?;
    let professor_id = required_id(form, "professor_id")?;

    let mut db = state.connect().map_err(|_| connection_failed())?;

    match db.create_session(course_id, group_name, professor_id, now) {
        Ok(id) => {
            tracing::info!("Opened session #{} for course {}", id, course_id);
            Ok(Flash::success(format!("Session created! ID: {}", id)))
        }
        Err(e) => {
            tracing::error!("Cannot create session: {}", e);
            Err(Flash::error("Could not create the session."))
        }
    }
}

/// Picks the view named by a query string. The last `view` parameter wins, then the last
/// `action`; without either the home view is shown.
pub fn requested_view(query: &[(String, String)]) -> View {
    let last = |key: &str| {
        query
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    };

    View::from_name(last("view").or_else(|| last("action")).unwrap_or_default())
}

/// `POST /`
pub async fn submit(state: web::Data<AppState>, form: web::Form<FormData>) -> HttpResponse {
    let form = form.into_inner();
    let now = Local::now().naive_local();

    let (view, flash) = web::block(move || process_submission(&state, &form, now))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Submission handler failed: {}", e);
            (View::Home, Flash::error("The request could not be processed."))
        });

    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, view.location()))
        .cookie(flash.to_cookie())
        .finish()
}

/// `GET /?view=<name>`
pub async fn index(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> HttpResponse {
    let view = requested_view(&query);
    let flash = Flash::from_request(&req);
    let today = Local::now().date_naive();

    let page = match web::block(move || views::render(&state, view, flash.as_ref(), today)).await {
        Ok(page) => page,
        Err(e) => {
            tracing::error!("Rendering {} failed: {}", view.name(), e);
            return HttpResponse::InternalServerError().body("The page could not be rendered.");
        }
    };

    let mut response = HttpResponse::Ok();
    response.content_type("text/html; charset=utf-8");
    if req.cookie(FLASH_COOKIE).is_some() {
        response.cookie(Flash::removal());
    }
    response.body(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServerSettings, Settings, StorageSettings};
    use chrono::NaiveDate;
    use tempfile::{TempDir, tempdir};

    fn state() -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let settings = Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageSettings {
                data_dir: dir.path().join("data"),
                database_url: dir.path().join("school.db").display().to_string(),
                log_path: dir.path().join("error.log"),
            },
        };
        let state = AppState::new(settings);
        assert!(state.bootstrap());
        (dir, state)
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    fn form(fields: &[(&str, &str)]) -> FormData {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn whitespace_only_fields_are_rejected() {
        let (_dir, state) = state();
        let submitted = form(&[
            ("form_type", "add_student_flat"),
            ("student_id", "S1"),
            ("name", "   "),
            ("group", "A"),
        ]);

        let (view, flash) = process_submission(&state, &submitted, now());

        assert_eq!(view, View::RosterJson);
        assert_eq!(flash, Flash::error("All fields are required! Missing: name"));
        assert!(state.store.roster().is_empty());
    }

    #[test]
    fn flat_registration_trims_and_rejects_duplicates() {
        let (_dir, state) = state();
        let submitted = form(&[
            ("form_type", "add_student_json"),
            ("student_id", " S1 "),
            ("name", "Ann"),
            ("group", "A"),
        ]);

        let (_, flash) = process_submission(&state, &submitted, now());
        assert_eq!(flash, Flash::success("Student added successfully to JSON!"));
        assert_eq!(state.store.roster()[0].student_id, "S1");

        let (_, flash) = process_submission(&state, &submitted, now());
        assert_eq!(flash, Flash::error("Student ID already exists!"));
        assert_eq!(state.store.roster().len(), 1);
    }

    #[test]
    fn attendance_reads_status_per_rostered_student() {
        let (_dir, state) = state();
        for (id, name) in [("S1", "Ann"), ("S2", "Bob")] {
            state.store.register_student(id, name, "A", now()).unwrap();
        }

        let submitted = form(&[
            ("form_type", "take_attendance_flat"),
            ("status_S2", "present"),
            ("status_S9", "present"),
        ]);
        let (view, flash) = process_submission(&state, &submitted, now());

        assert_eq!(view, View::AttendanceJson);
        assert_eq!(flash, Flash::success("Attendance saved for 2025-03-14!"));
        let statuses: Vec<Presence> = state
            .store
            .snapshot(now().date())
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses, vec![Presence::Absent, Presence::Present]);

        let (_, flash) = process_submission(&state, &submitted, now());
        assert_eq!(flash, Flash::warning("Attendance for today already taken!"));
    }

    #[test]
    fn invalid_attendance_status_saves_nothing() {
        let (_dir, state) = state();
        state.store.register_student("S1", "Ann", "A", now()).unwrap();

        let submitted = form(&[("form_type", "take_attendance_flat"), ("status_S1", "late")]);
        let (_, flash) = process_submission(&state, &submitted, now());

        assert_eq!(flash.level, crate::flash::Level::Error);
        assert!(!state.store.attendance_taken(now().date()));
    }

    #[test]
    fn database_student_and_session() {
        let (_dir, state) = state();

        let student = form(&[
            ("form_type", "add_student_db"),
            ("student_id_db", "S101"),
            ("fullname", "Jane Smith"),
            ("group_name", "Group A"),
        ]);
        let (view, flash) = process_submission(&state, &student, now());
        assert_eq!(view, View::RosterDb);
        assert_eq!(flash, Flash::success("Student added to database!"));

        let (_, flash) = process_submission(&state, &student, now());
        assert_eq!(flash, Flash::error("Student ID already exists in database!"));

        let session = form(&[
            ("form_type", "create_session"),
            ("course_id", "2"),
            ("group_name", "Group B"),
            ("professor_id", "1"),
        ]);
        let (view, flash) = process_submission(&state, &session, now());
        assert_eq!(view, View::SessionsDb);
        assert_eq!(flash, Flash::success("Session created! ID: 1"));

        let sessions = state.connect().unwrap().sessions().unwrap();
        assert_eq!(sessions[0].session.session_date, now().date());
        assert_eq!(sessions[0].course_label(), "CS102");
    }

    #[test]
    fn non_numeric_session_reference_is_rejected() {
        let (_dir, state) = state();
        let session = form(&[
            ("form_type", "create_session"),
            ("course_id", "CS101"),
            ("group_name", "Group B"),
            ("professor_id", "1"),
        ]);

        let (_, flash) = process_submission(&state, &session, now());
        assert_eq!(flash, Flash::error("Field course_id must be a number."));
    }

    #[test]
    fn unreachable_database_is_reported_to_the_user() {
        let (dir, mut state) = state();
        state.settings.storage.database_url =
            dir.path().join("gone").join("school.db").display().to_string();

        let student = form(&[
            ("form_type", "add_student_db"),
            ("student_id_db", "S101"),
            ("fullname", "Jane Smith"),
            ("group_name", "Group A"),
        ]);
        let (_, flash) = process_submission(&state, &student, now());
        assert_eq!(flash, Flash::error("Database connection failed."));
    }

    #[test]
    fn repeated_view_parameters_resolve_to_the_last() {
        let query = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        assert_eq!(requested_view(&[]), View::Home);
        assert_eq!(
            requested_view(&query(&[("view", "roster-json"), ("view", "db-status")])),
            View::DbStatus
        );
        assert_eq!(
            requested_view(&query(&[("view", "roster-json"), ("action", "exercise5")])),
            View::RosterJson
        );
        assert_eq!(
            requested_view(&query(&[("action", "exercise1"), ("action", "exercise4")])),
            View::RosterDb
        );
        assert_eq!(requested_view(&query(&[("view", "nope")])), View::Home);
    }

    #[test]
    fn unknown_form_type_goes_home() {
        let (_dir, state) = state();
        let (view, flash) = process_submission(&state, &form(&[("form_type", "drop")]), now());
        assert_eq!(view, View::Home);
        assert_eq!(flash, Flash::error("Unknown form submission."));
    }
}
