use anyhow::Result;
use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub mod cli;
pub mod display;
pub mod flash;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod roster;
pub mod schema;
pub mod views;

use crate::manager::{DbError, SchoolDb};
use crate::roster::JsonStore;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory holding the JSON roster and the daily attendance snapshots.
    pub data_dir: PathBuf,
    /// Path of the `sqlite3` database file.
    pub database_url: String,
    /// Diagnostic log file.
    pub log_path: PathBuf,
}

impl Settings {
    /// Loads settings from `<name>.toml` (if present), then `ATTENDANCE__*` environment variables.
    ///
    /// A `DATABASE_URL` variable, read from the environment or a `.env` file, takes precedence
    /// over `storage.database_url`.
    pub fn load(name: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("storage.data_dir", "data")?
            .set_default("storage.database_url", "attendance.db")?
            .set_default("storage.log_path", "logs/error.log")?
            .add_source(config::File::with_name(name).required(false))
            .add_source(
                config::Environment::with_prefix("ATTENDANCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("storage.database_url", env::var("DATABASE_URL").ok())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Shared, read-only state handed to every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub store: JsonStore,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let store = JsonStore::new(settings.storage.data_dir.clone());
        Self { settings, store }
    }

    /// Opens a fresh connection to the relational store, logging the failure if it is unreachable.
    pub fn connect(&self) -> Result<SchoolDb, DbError> {
        SchoolDb::connect(&self.settings.storage.database_url).inspect_err(|e| {
            tracing::error!(
                "Cannot connect to {}: {}",
                self.settings.storage.database_url,
                e
            )
        })
    }

    /// Prepares both stores. Runs once at startup, before any request is served.
    ///
    /// Failures are logged and reported but never abort the process: pages backed by a store
    /// that could not be prepared show a failure banner instead.
    pub fn bootstrap(&self) -> bool {
        let mut ok = true;

        if let Err(e) = self.store.ensure_dir() {
            tracing::error!(
                "Cannot create data directory {}: {}",
                self.store.data_dir().display(),
                e
            );
            ok = false;
        }

        match self.connect().and_then(|mut db| db.initialize()) {
            Ok(()) => tracing::info!("Database initialized"),
            Err(e) => {
                tracing::error!("Database initialization failed: {}", e);
                ok = false;
            }
        }

        ok
    }
}

/// Routes of the web interface: a single page that reads `?view=` on `GET` and dispatches on
/// `form_type` on `POST`.
pub fn configure_routes() -> impl actix_web::dev::HttpServiceFactory {
    actix_web::web::resource("/")
        .route(actix_web::web::get().to(handlers::index))
        .route(actix_web::web::post().to(handlers::submit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // Only test in the crate that touches the process environment.
    #[test]
    fn settings_layer_file_then_environment() {
        let dir = tempdir().unwrap();
        unsafe {
            env::remove_var("DATABASE_URL");
            env::remove_var("ATTENDANCE__SERVER__PORT");
        }

        let defaults = Settings::load(dir.path().join("absent").to_str().unwrap()).unwrap();
        assert_eq!(defaults.server.host, "127.0.0.1");
        assert_eq!(defaults.server.port, 8080);
        assert_eq!(defaults.storage.data_dir, PathBuf::from("data"));
        assert_eq!(defaults.storage.database_url, "attendance.db");
        assert_eq!(defaults.storage.log_path, PathBuf::from("logs/error.log"));

        let name = dir.path().join("site");
        fs::write(
            name.with_extension("toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n\
             [storage]\ndata_dir = \"/srv/attendance\"\ndatabase_url = \"from-file.db\"\n",
        )
        .unwrap();

        let from_file = Settings::load(name.to_str().unwrap()).unwrap();
        assert_eq!(from_file.server.host, "0.0.0.0");
        assert_eq!(from_file.server.port, 9000);
        assert_eq!(from_file.storage.data_dir, PathBuf::from("/srv/attendance"));
        assert_eq!(from_file.storage.database_url, "from-file.db");
        assert_eq!(from_file.storage.log_path, PathBuf::from("logs/error.log"));

        unsafe {
            env::set_var("ATTENDANCE__SERVER__PORT", "9100");
            env::set_var("DATABASE_URL", "from-env.db");
        }
        let overridden = Settings::load(name.to_str().unwrap());
        unsafe {
            env::remove_var("DATABASE_URL");
            env::remove_var("ATTENDANCE__SERVER__PORT");
        }

        let overridden = overridden.unwrap();
        assert_eq!(overridden.server.host, "0.0.0.0");
        assert_eq!(overridden.server.port, 9100);
        assert_eq!(overridden.storage.database_url, "from-env.db");
    }
}
