use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use attendance::cli::{Cli, Command};
use attendance::{AppState, Settings, configure_routes, display};
use chrono::Local;
use clap::Parser;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,actix_server=warn";

/// Logs to stdout and, if its directory can be created, to the diagnostic log file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_path: &Path) -> Option<WorkerGuard> {
    let filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let timer = || ChronoLocal::new("%Y-%m-%dT%H:%M:%S".to_string());

    let dir = log_path.parent().unwrap_or_else(|| Path::new(""));
    let file_name = log_path.file_name();

    match (std::fs::create_dir_all(dir), file_name) {
        (Ok(()), Some(file_name)) => {
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_writer(non_blocking.and(std::io::stdout))
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_env_filter(filter())
                .with_timer(timer())
                .init();

            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true)
                .with_env_filter(filter())
                .with_timer(timer())
                .init();

            tracing::warn!("Cannot open {}, logging to stdout only", log_path.display());
            None
        }
    }
}

async fn serve(state: AppState) -> std::io::Result<()> {
    state.bootstrap();

    let host = state.settings.server.host.clone();
    let port = state.settings.server.port;
    info!("Server starting on http://{}:{}/", host, port);

    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .service(configure_routes())
    })
    .bind((host, port))?
    .run()
    .await
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).context("Failed to load configuration")?;
    let _guard = init_tracing(&settings.storage.log_path);

    let state = AppState::new(settings);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            actix_web::rt::System::new().block_on(serve(state))?;
        }
        Command::InitDb => {
            if !state.bootstrap() {
                anyhow::bail!("Initialization failed, see the log for details");
            }
            println!("Stores initialized.");
        }
        Command::ShowRoster => display::show_roster(&state.store),
        Command::ShowAttendance { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            display::show_attendance(&state.store, date);
        }
        Command::ShowStudents => display::show_students(&mut state.connect()?)?,
        Command::ShowSessions => display::show_sessions(&mut state.connect()?)?,
        Command::ShowStatus { table } => display::show_status(&mut state.connect()?, table)?,
    }

    Ok(())
}
