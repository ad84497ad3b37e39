//! Shared fixtures for integration tests.

use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const DR_SEUSS_SQL: &str = include_str!("../fixtures/drseuss.sql");

/// A fixture database that lives as long as its temp directory.
pub struct FishDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl FishDb {
    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}

/// Routes library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Builds the seven-row `fish` table in a fresh file.
pub fn build_fish_db() -> anyhow::Result<FishDb> {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("drseuss.db");
    let conn = Connection::open(&path)?;
    conn.execute_batch(DR_SEUSS_SQL)?;
    conn.close().map_err(|(_, e)| e)?;

    Ok(FishDb { _dir: dir, path })
}
