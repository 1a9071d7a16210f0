//! Page rendering. Each [`View`] reads what it needs from the stores and renders a listing,
//! usually alongside the form that feeds it.

use crate::AppState;
use crate::flash::{Flash, Level};
use crate::manager::{DbError, SchoolDb};
use crate::models::{Course, DbStudent, Professor, SessionListing, SessionStatus};
use crate::roster::{AttendanceEntry, DataFile, JsonStudent, Presence};
use chrono::NaiveDate;

/// Groups offered by the relational forms.
const GROUPS: [&str; 3] = ["Group A", "Group B", "Group C"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    RosterJson,
    AttendanceJson,
    DbStatus,
    RosterDb,
    SessionsDb,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Home,
        View::RosterJson,
        View::AttendanceJson,
        View::DbStatus,
        View::RosterDb,
        View::SessionsDb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            View::Home => "home",
            View::RosterJson => "roster-json",
            View::AttendanceJson => "attendance-json",
            View::DbStatus => "db-status",
            View::RosterDb => "roster-db",
            View::SessionsDb => "sessions-db",
        }
    }

    /// Resolves a `view` parameter. `exerciseN` names are accepted for old bookmarks; anything
    /// unrecognized falls back to [`View::Home`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "roster-json" | "exercise1" => View::RosterJson,
            "attendance-json" | "exercise2" => View::AttendanceJson,
            "db-status" | "exercise3" => View::DbStatus,
            "roster-db" | "exercise4" => View::RosterDb,
            "sessions-db" | "exercise5" => View::SessionsDb,
            _ => View::Home,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            View::Home => "Home",
            View::RosterJson => "Students (JSON)",
            View::AttendanceJson => "Attendance (JSON)",
            View::DbStatus => "Database Status",
            View::RosterDb => "Students (Database)",
            View::SessionsDb => "Attendance Sessions",
        }
    }

    /// Where to redirect after a submission made from this view.
    pub fn location(&self) -> String {
        match self {
            View::Home => "/".to_string(),
            other => format!("/?view={}", other.name()),
        }
    }
}

/// Renders `view` as a complete HTML page, with `flash` shown above the content.
pub fn render(state: &AppState, view: View, flash: Option<&Flash>, today: NaiveDate) -> String {
    let content = match view {
        View::Home => home(state),
        View::RosterJson => roster_json(&state.store.roster()),
        View::AttendanceJson => attendance_json(state, today),
        View::DbStatus => db_status(state),
        View::RosterDb => roster_db(state),
        View::SessionsDb => sessions_db(state),
    };

    page(view, flash, &content)
}

/// Escapes text for use in HTML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn banner(level: Level, message: &str) -> String {
    format!(
        "<div class=\"{}\">{}</div>\n",
        level.class(),
        escape(message)
    )
}

fn table(headers: &[&str], rows: impl IntoIterator<Item = Vec<String>>) -> String {
    let mut html = String::from("<table>\n<tr>");
    for header in headers {
        html.push_str(&format!("<th>{}</th>", header));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

fn text_input(id: &str, label: &str, placeholder: &str) -> String {
    format!(
        "<div class=\"form-group\"><label for=\"{id}\">{label}:</label>\
         <input type=\"text\" id=\"{id}\" name=\"{id}\" required placeholder=\"{placeholder}\"></div>\n"
    )
}

fn select(id: &str, label: &str, prompt: &str, options: &[(String, String)]) -> String {
    let mut html = format!(
        "<div class=\"form-group\"><label for=\"{id}\">{label}:</label>\
         <select id=\"{id}\" name=\"{id}\" required><option value=\"\">{prompt}</option>"
    );
    for (value, text) in options {
        html.push_str(&format!(
            "<option value=\"{}\">{}</option>",
            escape(value),
            escape(text)
        ));
    }
    html.push_str("</select></div>\n");
    html
}

fn group_options(extra: &[&str]) -> Vec<(String, String)> {
    GROUPS
        .iter()
        .chain(extra)
        .map(|g| (g.to_string(), g.to_string()))
        .collect()
}

fn connection_failed(e: &DbError) -> String {
    tracing::debug!("Rendering connection failure: {}", e);
    banner(
        Level::Error,
        "Database connection failed. Please check the database settings.",
    )
}

fn home(state: &AppState) -> String {
    let mut html = String::from("<h2>Welcome to the School Attendance System</h2>\n");

    html.push_str("<h3>Database Connection Test</h3>\n");
    html.push_str(&match state.connect() {
        Ok(_) => banner(Level::Success, "Database connection successful!"),
        Err(e) => connection_failed(&e),
    });

    html.push_str("<h3>Available JSON Files</h3>\n");
    html.push_str(&data_files(&state.store.list_files()));
    html
}

fn data_files(files: &[DataFile]) -> String {
    if files.is_empty() {
        return "<p>No JSON files found.</p>\n".to_string();
    }

    let mut html = String::from("<ul>\n");
    for file in files {
        html.push_str(&format!(
            "<li>{} ({:.2} KB)</li>\n",
            escape(&file.name),
            file.size_kb()
        ));
    }
    html.push_str("</ul>\n");
    html
}

fn roster_json(students: &[JsonStudent]) -> String {
    let mut html = String::from("<h2>Add Student (JSON)</h2>\n");
    html.push_str("<form method=\"POST\" action=\"/\">\n");
    html.push_str("<input type=\"hidden\" name=\"form_type\" value=\"add_student_flat\">\n");
    html.push_str(&text_input("student_id", "Student ID", "e.g., 101"));
    html.push_str(&text_input("name", "Full Name", "e.g., John Doe"));
    html.push_str(&text_input("group", "Group", "e.g., Group A"));
    html.push_str("<button type=\"submit\">Add Student to JSON</button>\n</form>\n");

    html.push_str("<h3>Existing Students (JSON)</h3>\n");
    if students.is_empty() {
        html.push_str("<p>No students in JSON file yet.</p>\n");
        return html;
    }

    html.push_str(&table(
        &["Student ID", "Name", "Group", "Added At"],
        students.iter().map(|s| {
            vec![
                escape(&s.student_id),
                escape(&s.name),
                escape(&s.group),
                s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        }),
    ));
    html
}

fn presence_cell(status: Presence) -> String {
    let color = match status {
        Presence::Present => "#27ae60",
        Presence::Absent => "#e74c3c",
    };
    format!("<span style=\"color: {color}; font-weight: bold;\">{status}</span>")
}

fn attendance_json(state: &AppState, today: NaiveDate) -> String {
    let mut html = String::from("<h2>Take Attendance (JSON)</h2>\n");

    if state.store.attendance_taken(today) {
        html.push_str(&banner(
            Level::Warning,
            &format!("Attendance for today ({today}) has already been taken."),
        ));
        html.push_str("<h3>Today's Attendance</h3>\n");
        html.push_str(&snapshot_table(&state.store.snapshot(today)));
        return html;
    }

    let students = state.store.roster();
    if students.is_empty() {
        html.push_str(&banner(
            Level::Warning,
            "No students found. Please add students to the JSON roster first.",
        ));
        return html;
    }

    html.push_str(&format!("<p>Date: <strong>{today}</strong></p>\n"));
    html.push_str("<form method=\"POST\" action=\"/\">\n");
    html.push_str("<input type=\"hidden\" name=\"form_type\" value=\"take_attendance_flat\">\n");
    html.push_str(&table(
        &["Student ID", "Name", "Group", "Status"],
        students.iter().map(|s| {
            let field = escape(&format!("status_{}", s.student_id));
            let radios = format!(
                "<div class=\"radio-group\">\
                 <label><input type=\"radio\" name=\"{field}\" value=\"present\" checked> Present</label>\
                 <label><input type=\"radio\" name=\"{field}\" value=\"absent\"> Absent</label></div>"
            );
            vec![escape(&s.student_id), escape(&s.name), escape(&s.group), radios]
        }),
    ));
    html.push_str("<button type=\"submit\">Save Attendance for Today</button>\n</form>\n");
    html
}

fn snapshot_table(entries: &[AttendanceEntry]) -> String {
    if entries.is_empty() {
        return "<p>No students were on the roster when attendance was taken.</p>\n".to_string();
    }

    table(
        &["Student ID", "Name", "Group", "Status"],
        entries.iter().map(|e| {
            vec![
                escape(&e.student_id),
                escape(&e.name),
                escape(&e.group),
                presence_cell(e.status),
            ]
        }),
    )
}

fn db_status(state: &AppState) -> String {
    let storage = &state.settings.storage;
    let mut html = String::from("<h2>Database Configuration</h2>\n<div class=\"db-test\">\n");
    html.push_str(&format!(
        "<p><strong>Database URL:</strong> {}</p>\n",
        escape(&storage.database_url)
    ));
    html.push_str(&format!(
        "<p><strong>Data directory:</strong> {}</p>\n",
        escape(&storage.data_dir.display().to_string())
    ));
    html.push_str(&format!(
        "<p><strong>Diagnostic log:</strong> {}</p>\n</div>\n",
        escape(&storage.log_path.display().to_string())
    ));

    html.push_str("<h3>Database Status</h3>\n");
    let mut db = match state.connect() {
        Ok(db) => db,
        Err(e) => {
            html.push_str(&connection_failed(&e));
            return html;
        }
    };
    html.push_str(&banner(Level::Success, "Connected to database successfully!"));

    let tables = match db.table_status() {
        Ok(tables) => tables,
        Err(e) => {
            tracing::error!("Cannot inspect tables: {}", e);
            html.push_str(&banner(Level::Error, "Could not inspect database tables."));
            return html;
        }
    };

    html.push_str("<ul>\n");
    for status in &tables {
        let name = status.table.name();
        if status.exists {
            html.push_str(&format!("<li>Table '{name}' exists</li>\n"));
        } else {
            html.push_str(&format!("<li>Table '{name}' missing</li>\n"));
        }
    }
    html.push_str("</ul>\n<h4>Table Records Count:</h4>\n<ul>\n");
    for status in &tables {
        let name = status.table.name();
        match status.rows {
            Some(rows) => html.push_str(&format!("<li>{name}: {rows} records</li>\n")),
            None => html.push_str(&format!("<li>{name}: Table doesn't exist</li>\n")),
        }
    }
    html.push_str("</ul>\n");
    html
}

fn roster_db(state: &AppState) -> String {
    let mut html = String::from("<h2>Student Management (Database)</h2>\n");
    html.push_str("<form method=\"POST\" action=\"/\">\n");
    html.push_str("<input type=\"hidden\" name=\"form_type\" value=\"add_student_db\">\n");
    html.push_str(&text_input("student_id_db", "Student ID", "e.g., S101"));
    html.push_str(&text_input("fullname", "Full Name", "e.g., Jane Smith"));
    html.push_str(&select(
        "group_name",
        "Group",
        "Select Group",
        &group_options(&["Other"]),
    ));
    html.push_str("<button type=\"submit\">Add Student to Database</button>\n</form>\n");

    html.push_str("<h3>Students in Database</h3>\n");
    let students = match state.connect() {
        Ok(mut db) => db.students(),
        Err(e) => {
            html.push_str(&connection_failed(&e));
            return html;
        }
    };

    match students {
        Ok(students) => html.push_str(&db_students_table(&students)),
        Err(e) => {
            tracing::error!("Cannot list students: {}", e);
            html.push_str(&banner(Level::Error, "Could not load students."));
        }
    }
    html
}

fn db_students_table(students: &[DbStudent]) -> String {
    if students.is_empty() {
        return "<p>No students in database yet.</p>\n".to_string();
    }

    table(
        &["ID", "Student ID", "Full Name", "Group", "Created At"],
        students.iter().map(|s| {
            vec![
                s.id.to_string(),
                escape(&s.student_id),
                escape(&s.fullname),
                escape(&s.group_name),
                s.created_at.to_string(),
            ]
        }),
    )
}

fn sessions_db(state: &AppState) -> String {
    let mut html = String::from("<h2>Attendance Sessions</h2>\n");
    let mut db = match state.connect() {
        Ok(db) => db,
        Err(e) => {
            html.push_str(&connection_failed(&e));
            return html;
        }
    };

    let (courses, professors, sessions) = match load_sessions_page(&mut db) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Cannot load sessions: {}", e);
            html.push_str(&banner(Level::Error, "Could not load sessions."));
            return html;
        }
    };

    html.push_str(&session_form(&courses, &professors));
    html.push_str("<h3>Existing Sessions</h3>\n");
    html.push_str(&sessions_table(&sessions));

    html.push_str("<h3>Close Session (Manual SQL)</h3>\n");
    html.push_str("<p>Sessions are closed outside this application. Run:</p>\n");
    html.push_str(
        "<pre>UPDATE attendance_sessions SET status = 'closed' WHERE id = [SESSION_ID];</pre>\n",
    );
    html
}

fn load_sessions_page(
    db: &mut SchoolDb,
) -> Result<(Vec<Course>, Vec<Professor>, Vec<SessionListing>), DbError> {
    Ok((db.courses()?, db.professors()?, db.sessions()?))
}

fn session_form(courses: &[Course], professors: &[Professor]) -> String {
    let course_options: Vec<(String, String)> = courses
        .iter()
        .map(|c| {
            (
                c.id.to_string(),
                format!("{} - {}", c.course_code, c.course_name),
            )
        })
        .collect();
    let professor_options: Vec<(String, String)> = professors
        .iter()
        .map(|p| (p.id.to_string(), p.name.clone()))
        .collect();

    let mut html = String::from("<h3>Create New Session</h3>\n");
    html.push_str("<form method=\"POST\" action=\"/\">\n");
    html.push_str("<input type=\"hidden\" name=\"form_type\" value=\"create_session\">\n");
    html.push_str(&select("course_id", "Course", "Select Course", &course_options));
    html.push_str(&select("group_name", "Group", "Select Group", &group_options(&[])));
    html.push_str(&select(
        "professor_id",
        "Professor",
        "Select Professor",
        &professor_options,
    ));
    html.push_str("<button type=\"submit\">Create Session</button>\n</form>\n");
    html
}

fn sessions_table(sessions: &[SessionListing]) -> String {
    if sessions.is_empty() {
        return "<p>No sessions created yet.</p>\n".to_string();
    }

    table(
        &["ID", "Course", "Group", "Date", "Professor", "Status", "Created At"],
        sessions.iter().map(|listing| {
            let session = &listing.session;
            let color = match session.status {
                SessionStatus::Open => "#27ae60",
                SessionStatus::Closed => "#e74c3c",
            };
            vec![
                session.id.to_string(),
                escape(listing.course_label()),
                escape(session.group_name.as_deref().unwrap_or(SessionListing::PLACEHOLDER)),
                session.session_date.to_string(),
                escape(listing.professor_label()),
                format!(
                    "<span style=\"color: {color}; font-weight: bold;\">{}</span>",
                    session.status
                ),
                session.created_at.to_string(),
            ]
        }),
    )
}

const STYLE: &str = "\
body { font-family: 'Segoe UI', Tahoma, sans-serif; background: #f0f2f5; color: #333; margin: 0; }
.container { max-width: 1200px; margin: 0 auto; padding: 20px; }
header { background: #2c3e50; color: white; padding: 20px; border-radius: 10px 10px 0 0; }
.nav { display: flex; flex-wrap: wrap; gap: 10px; background: white; padding: 15px; margin: 20px 0; border-radius: 8px; }
.nav a { padding: 10px 20px; background: #3498db; color: white; text-decoration: none; border-radius: 5px; }
.content { background: white; padding: 25px; border-radius: 8px; }
.form-group { margin-bottom: 20px; }
label { display: block; margin-bottom: 8px; font-weight: 600; }
input[type=text], select { width: 100%; padding: 12px; border: 1px solid #ddd; border-radius: 5px; }
button { background: #2ecc71; color: white; padding: 12px 25px; border: none; border-radius: 5px; cursor: pointer; }
.success { background: #d4edda; color: #155724; padding: 15px; margin: 15px 0; border-left: 4px solid #28a745; }
.error { background: #f8d7da; color: #721c24; padding: 15px; margin: 15px 0; border-left: 4px solid #dc3545; }
.warning { background: #fff3cd; color: #856404; padding: 15px; margin: 15px 0; border-left: 4px solid #ffc107; }
table { width: 100%; border-collapse: collapse; margin-top: 20px; }
th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
.radio-group { display: flex; gap: 20px; }
.radio-group label { display: inline; font-weight: normal; }
.db-test { padding: 15px; background: #e8f4f8; border-radius: 5px; }
pre { background: #f4f4f4; padding: 10px; border-radius: 5px; }
";

fn page(view: View, flash: Option<&Flash>, content: &str) -> String {
    let mut nav = String::new();
    for target in View::ALL {
        nav.push_str(&format!(
            "<a href=\"{}\">{}</a>",
            escape(&target.location()),
            target.title()
        ));
    }

    let message = flash
        .map(|f| banner(f.level, &f.message))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title} | School Attendance System</title>\n<style>\n{STYLE}</style>\n</head>\n\
         <body>\n<div class=\"container\">\n<header><h1>School Attendance Management System</h1></header>\n\
         <nav class=\"nav\">{nav}</nav>\n{message}<main class=\"content\">\n{content}</main>\n\
         </div>\n</body>\n</html>\n",
        title = view.title(),
    )
}
