//! This module contains the command-line interface [`Cli`] parser for running the attendance
//! server and inspecting its stores.

use crate::manager::DbTable;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// The command line configuration struct, where the command-line interface parser is automatically
/// derived by [`clap::Parser`].
#[derive(Parser, Debug)]
#[command(version, about = "School attendance tracker")]
pub struct Cli {
    /// Name of the configuration file to load, without the `.toml` extension.
    #[arg(long, default_value = "config")]
    pub config: String,

    /// What to do. Defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prepare both stores and run the web interface.
    Serve,

    /// Create missing tables and seed rows, then exit.
    InitDb,

    /// Display the JSON roster.
    ShowRoster,

    /// Display the students registered in the database.
    ShowStudents,

    /// Display the attendance snapshot for a day (today by default).
    ShowAttendance {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Display all attendance sessions.
    ShowSessions,

    /// Display which tables exist and how many rows they hold.
    ShowStatus {
        /// Only report this table, e.g. `attendance_sessions`.
        #[arg(long)]
        table: Option<DbTable>,
    },
}
