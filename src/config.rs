//! Process configuration, read once at startup.
//!
//! Values come from the environment, optionally seeded from a `.env` file in
//! the working directory. [`Config::from_lookup`] takes any key lookup so
//! callers (and tests) never depend on ambient process state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::debug;

/// Log directory used when `LOG_DIR` is unset.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Database timeout used when `DB_TIMEOUT_SECS` is unset.
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// `DATABASE_URL` names a scheme no backend handles.
    #[error("unsupported DATABASE_URL scheme (expected postgres:// or sqlite:)")]
    UnsupportedDatabaseUrl,
    /// `DATABASE_URL` has a supported scheme but does not parse.
    #[error("malformed DATABASE_URL: {0}")]
    DatabaseUrl(#[source] sqlx::Error),
    /// The `.env` file exists but cannot be parsed.
    #[error("failed to load .env: {0}")]
    DotEnv(#[source] dotenvy::Error),
}

/// Where run counts are written.
#[derive(Clone)]
pub enum DatabaseTarget {
    /// PostgreSQL server.
    Postgres(PgConnectOptions),
    /// SQLite database file.
    Sqlite(SqliteConnectOptions),
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres(options) => f
                .debug_struct("Postgres")
                .field("host", &options.get_host())
                .field("port", &options.get_port())
                .field("database", &options.get_database())
                .field("user", &options.get_username())
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Sqlite(options) => f
                .debug_struct("Sqlite")
                .field("filename", &options.get_filename())
                .finish(),
        }
    }
}

/// Top-level configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for `.log` files.
    pub log_dir: PathBuf,
    /// Persistence destination.
    pub database: DatabaseTarget,
    /// Raw run-date override, if one was supplied and non-empty.
    pub run_date_override: Option<String>,
    /// Upper bound on one persistence call (connect + transaction).
    pub db_timeout: Duration,
    /// Directory for JSON log files; console only when unset.
    pub trace_dir: Option<PathBuf>,
    /// `.env` file the values were seeded from, if one was loaded.
    pub env_file: Option<PathBuf>,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `.env` is malformed or a variable is invalid.
    ///
    /// Nothing is logged here since the subscriber is configured from the
    /// result; call [`Config::log_loaded`] once logging is up.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_file = match dotenvy::dotenv() {
            Ok(path) => Some(path),
            Err(e) if e.not_found() => None,
            Err(e) => return Err(ConfigError::DotEnv(e)),
        };
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    /// Emit where configuration came from and its effective values at
    /// DEBUG. The database password stays redacted.
    pub fn log_loaded(&self) {
        if let Some(path) = &self.env_file {
            debug!(path = %path.display(), "loaded .env");
        }
        debug!(
            log_dir = %self.log_dir.display(),
            database = ?self.database,
            db_timeout_secs = self.db_timeout.as_secs(),
            "configuration loaded"
        );
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let log_dir = get("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let database = match get("DATABASE_URL") {
            Some(url) => parse_database_url(&url)?,
            None => DatabaseTarget::Postgres(postgres_from_parts(&get)?),
        };

        let db_timeout = match get("DB_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "DB_TIMEOUT_SECS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "DB_TIMEOUT_SECS",
                        value: raw,
                        reason: "must be at least 1".to_owned(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        };

        Ok(Self {
            log_dir,
            database,
            run_date_override: get("RUN_DATE"),
            db_timeout,
            trace_dir: get("LOGSIFT_TRACE_DIR").map(PathBuf::from),
            env_file: None,
        })
    }
}

fn parse_database_url(url: &str) -> Result<DatabaseTarget, ConfigError> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let options = PgConnectOptions::from_str(url).map_err(ConfigError::DatabaseUrl)?;
        Ok(DatabaseTarget::Postgres(options))
    } else if url.starts_with("sqlite:") {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(ConfigError::DatabaseUrl)?
            .create_if_missing(true);
        Ok(DatabaseTarget::Sqlite(options))
    } else {
        Err(ConfigError::UnsupportedDatabaseUrl)
    }
}

/// PostgreSQL options from the `PG_*` variables. Unset parts keep the
/// driver defaults.
fn postgres_from_parts<G>(get: &G) -> Result<PgConnectOptions, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let mut options = PgConnectOptions::new();
    if let Some(host) = get("PG_HOST") {
        options = options.host(&host);
    }
    if let Some(raw) = get("PG_PORT") {
        let port = raw
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "PG_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        options = options.port(port);
    }
    if let Some(db) = get("PG_DB") {
        options = options.database(&db);
    }
    if let Some(user) = get("PG_USER") {
        options = options.username(&user);
    }
    if let Some(password) = get("PG_PASSWORD") {
        options = options.password(&password);
    }
    Ok(options)
}
