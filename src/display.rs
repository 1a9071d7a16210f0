use crate::manager::{DbTable, SchoolDb};
use crate::roster::JsonStore;
use anyhow::Result;
use chrono::NaiveDate;
use tabled::{Table, Tabled, settings::Style};

/// Pretty prints the JSON roster.
pub fn show_roster(store: &JsonStore) {
    #[derive(Tabled)]
    struct RosterRow {
        student_id: String,
        name: String,
        group: String,
        added_at: String,
    }

    let rows: Vec<RosterRow> = store
        .roster()
        .into_iter()
        .map(|student| RosterRow {
            student_id: student.student_id,
            name: student.name,
            group: student.group,
            added_at: student.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("JSON roster:\n{table}");
}

/// Pretty prints the attendance snapshot taken on `date`.
pub fn show_attendance(store: &JsonStore, date: NaiveDate) {
    if !store.attendance_taken(date) {
        eprintln!("No attendance was taken on {date}.");
        return;
    }

    #[derive(Tabled)]
    struct EntryRow {
        student_id: String,
        name: String,
        group: String,
        status: String,
    }

    let rows: Vec<EntryRow> = store
        .snapshot(date)
        .into_iter()
        .map(|entry| EntryRow {
            student_id: entry.student_id,
            name: entry.name,
            group: entry.group,
            status: entry.status.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("Attendance on {date}:\n{table}");
}

/// Pretty prints the students registered in the database.
pub fn show_students(db: &mut SchoolDb) -> Result<()> {
    #[derive(Tabled)]
    struct StudentRow {
        id: i32,
        student_id: String,
        fullname: String,
        group_name: String,
        created_at: String,
    }

    let rows: Vec<StudentRow> = db
        .students()?
        .into_iter()
        .map(|student| StudentRow {
            id: student.id,
            student_id: student.student_id,
            fullname: student.fullname,
            group_name: student.group_name,
            created_at: student.created_at.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("Database students:\n{table}");

    Ok(())
}

/// Pretty prints every session with its course and professor.
pub fn show_sessions(db: &mut SchoolDb) -> Result<()> {
    #[derive(Tabled)]
    struct SessionRow {
        id: i32,
        course: String,
        group: String,
        date: NaiveDate,
        professor: String,
        status: String,
    }

    let rows: Vec<SessionRow> = db
        .sessions()?
        .into_iter()
        .map(|listing| SessionRow {
            id: listing.session.id,
            course: listing.course_label().to_string(),
            group: listing.session.group_name.clone().unwrap_or_default(),
            date: listing.session.session_date,
            professor: listing.professor_label().to_string(),
            status: listing.session.status.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("Sessions:\n{table}");

    Ok(())
}

/// Pretty prints which tables exist and their row counts, for `table` only if given.
pub fn show_status(db: &mut SchoolDb, table: Option<DbTable>) -> Result<()> {
    #[derive(Tabled)]
    struct StatusRow {
        table: &'static str,
        exists: bool,
        rows: String,
    }

    let statuses = match table {
        Some(table) => vec![db.status_of(table)?],
        None => db.table_status()?,
    };

    let rows: Vec<StatusRow> = statuses
        .into_iter()
        .map(|status| StatusRow {
            table: status.table.name(),
            exists: status.exists,
            rows: status
                .rows
                .map_or_else(|| "-".to_string(), |count| count.to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("Tables:\n{table}");

    Ok(())
}
