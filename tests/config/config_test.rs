//! Coverage for environment-style configuration.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::fmt::MakeWriter;

use logsift::config::{
    Config, ConfigError, DatabaseTarget, DEFAULT_DB_TIMEOUT_SECS, DEFAULT_LOG_DIR,
};

fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_apply_when_unset() {
    let config = from_pairs(&[]).expect("config");
    assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
    assert_eq!(config.db_timeout, Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS));
    assert!(config.run_date_override.is_none());
    assert!(config.trace_dir.is_none());
    assert!(matches!(config.database, DatabaseTarget::Postgres(_)));
}

#[test]
fn pg_parts_are_applied() {
    let config = from_pairs(&[
        ("PG_HOST", "db.internal"),
        ("PG_PORT", "6543"),
        ("PG_DB", "logs"),
        ("PG_USER", "analyzer"),
        ("PG_PASSWORD", "hunter2"),
    ])
    .expect("config");

    match &config.database {
        DatabaseTarget::Postgres(options) => {
            assert_eq!(options.get_host(), "db.internal");
            assert_eq!(options.get_port(), 6543);
            assert_eq!(options.get_database(), Some("logs"));
            assert_eq!(options.get_username(), "analyzer");
        }
        DatabaseTarget::Sqlite(_) => panic!("expected postgres target"),
    }
}

#[test]
fn debug_output_hides_password() {
    let config = from_pairs(&[("PG_PASSWORD", "hunter2")]).expect("config");
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("[REDACTED]"));
}

#[test]
fn invalid_port_is_rejected() {
    let err = from_pairs(&[("PG_PORT", "not-a-port")]).expect_err("bad port");
    assert!(matches!(err, ConfigError::InvalidValue { key: "PG_PORT", .. }));
}

#[test]
fn database_url_selects_sqlite() {
    let config = from_pairs(&[("DATABASE_URL", "sqlite://counts.db")]).expect("config");
    assert!(matches!(config.database, DatabaseTarget::Sqlite(_)));
}

#[test]
fn database_url_takes_precedence_over_parts() {
    let config = from_pairs(&[
        ("DATABASE_URL", "postgres://u:p@url-host:5433/db"),
        ("PG_HOST", "parts-host"),
    ])
    .expect("config");
    match &config.database {
        DatabaseTarget::Postgres(options) => assert_eq!(options.get_host(), "url-host"),
        DatabaseTarget::Sqlite(_) => panic!("expected postgres target"),
    }
}

#[test]
fn unsupported_database_url_is_rejected() {
    let err = from_pairs(&[("DATABASE_URL", "mysql://localhost/db")]).expect_err("scheme");
    assert!(matches!(err, ConfigError::UnsupportedDatabaseUrl));
}

#[test]
fn empty_values_count_as_unset() {
    let config = from_pairs(&[("LOG_DIR", ""), ("RUN_DATE", "")]).expect("config");
    assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
    assert!(config.run_date_override.is_none());
}

#[test]
fn overrides_are_read() {
    let config = from_pairs(&[
        ("LOG_DIR", "/srv/logs"),
        ("RUN_DATE", "2025-10-14"),
        ("DB_TIMEOUT_SECS", "5"),
        ("LOGSIFT_TRACE_DIR", "/tmp/trace"),
    ])
    .expect("config");
    assert_eq!(config.log_dir, PathBuf::from("/srv/logs"));
    assert_eq!(config.run_date_override.as_deref(), Some("2025-10-14"));
    assert_eq!(config.db_timeout, Duration::from_secs(5));
    assert_eq!(config.trace_dir, Some(PathBuf::from("/tmp/trace")));
}

#[test]
fn zero_timeout_is_rejected() {
    let err = from_pairs(&[("DB_TIMEOUT_SECS", "0")]).expect_err("zero");
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: "DB_TIMEOUT_SECS",
            ..
        }
    ));
}

/// In-memory log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn lookup_config_has_no_env_file() {
    let config = from_pairs(&[]).expect("config");
    assert!(config.env_file.is_none());
}

#[test]
fn loaded_configuration_is_logged_once_a_subscriber_exists() {
    let mut config = from_pairs(&[("LOG_DIR", "/srv/logs"), ("PG_PASSWORD", "hunter2")])
        .expect("config");
    config.env_file = Some(PathBuf::from("/srv/app/.env"));

    let sink = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || config.log_loaded());

    let output = sink.text();
    assert!(output.contains("loaded .env"), "{output}");
    assert!(output.contains("/srv/app/.env"), "{output}");
    assert!(output.contains("/srv/logs"), "{output}");
    assert!(!output.contains("hunter2"), "{output}");
}
