use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Batch, Connection, OpenFlags, Rows, Statement};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::engine::{Cursor, Database, Opener};
use crate::error::{EngineError, QueryError, Result};
use crate::params::NamedArg;
use crate::value::Value;

/// Prefixes SQLite accepts for named parameters.
const PARAMETER_PREFIXES: [char; 3] = [':', '@', '$'];

/// Opens SQLite database files read-only through rusqlite.
#[derive(Debug, Clone)]
pub struct SqliteOpener {
    busy_timeout: Duration,
    progress_interval: i32,
}

impl SqliteOpener {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            progress_interval: config.progress_interval.max(1),
        }
    }
}

impl Default for SqliteOpener {
    fn default() -> Self {
        Self::new(&ConnectorConfig::default())
    }
}

impl Opener for SqliteOpener {
    fn open(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<Box<dyn Database>, EngineError> {
        // No SQLITE_OPEN_CREATE: a missing file is an error, never a new database.
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;

        let token = AssertUnwindSafe(cancel.clone());
        conn.progress_handler(self.progress_interval, Some(move || token.is_cancelled()));

        Ok(Box::new(SqliteDatabase { conn }))
    }
}

/// A read-only rusqlite connection.
pub struct SqliteDatabase {
    conn: Connection,
}

impl Database for SqliteDatabase {
    fn query(
        &self,
        sql: &str,
        args: &[NamedArg],
        consume: &mut dyn FnMut(&mut dyn Cursor) -> Result<()>,
    ) -> Result<()> {
        let mut stmt = prepare_single(&self.conn, sql)?;
        bind_named(&mut stmt, args)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let outcome = {
            let mut cursor = SqliteCursor::new(columns, stmt.raw_query());
            consume(&mut cursor)
        };

        if let Err(err) = stmt.finalize() {
            warn!(error = %err, "failed to finalize statement");
        }
        outcome
    }

    fn close(self: Box<Self>) -> std::result::Result<(), EngineError> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

/// Prepares the only statement in `sql`. Trailing whitespace, comments and
/// semicolons are allowed; a second statement is not.
fn prepare_single<'conn>(conn: &'conn Connection, sql: &str) -> Result<Statement<'conn>> {
    let mut batch = Batch::new(conn, sql);
    let stmt = batch
        .next()
        .map_err(|e| QueryError::execution(e.to_string()))?
        .ok_or_else(|| QueryError::execution("query contains no statement"))?;

    match batch.next() {
        Ok(None) => Ok(stmt),
        Ok(Some(_)) | Err(_) => Err(QueryError::execution(
            "query must contain a single statement",
        )),
    }
}

/// Binds each argument to every parameter spelled `:name`, `@name` or `$name`,
/// then fails if the statement still has an unbound parameter.
fn bind_named(stmt: &mut Statement<'_>, args: &[NamedArg]) -> Result<()> {
    let mut bound = vec![false; stmt.parameter_count()];

    for arg in args {
        let mut used = false;
        for prefix in PARAMETER_PREFIXES {
            let placeholder = format!("{prefix}{}", arg.name);
            let index = stmt
                .parameter_index(&placeholder)
                .map_err(|e| QueryError::binding(e.to_string()))?;
            if let Some(index) = index {
                stmt.raw_bind_parameter(index, arg.value.as_str())
                    .map_err(|e| QueryError::binding(e.to_string()))?;
                bound[index - 1] = true;
                used = true;
            }
        }
        if !used {
            debug!(param = %arg.name, "parameter not referenced by query");
        }
    }

    match bound.iter().position(|is_bound| !is_bound) {
        None => Ok(()),
        Some(offset) => {
            let index = offset + 1;
            Err(QueryError::binding(match stmt.parameter_name(index) {
                Some(name) => format!(
                    "missing named argument \"{}\"",
                    name.trim_start_matches(PARAMETER_PREFIXES)
                ),
                None => format!("missing argument for parameter {index}"),
            }))
        }
    }
}

/// Cursor over rusqlite rows. Cells are read while advancing since a
/// rusqlite row cannot outlive the step that produced it.
struct SqliteCursor<'stmt> {
    columns: Vec<String>,
    rows: Rows<'stmt>,
    current: Option<std::result::Result<Vec<Value>, EngineError>>,
    fault: Option<EngineError>,
}

impl<'stmt> SqliteCursor<'stmt> {
    fn new(columns: Vec<String>, rows: Rows<'stmt>) -> Self {
        Self {
            columns,
            rows,
            current: None,
            fault: None,
        }
    }
}

impl Cursor for SqliteCursor<'_> {
    fn column_names(&self) -> std::result::Result<Vec<String>, EngineError> {
        Ok(self.columns.clone())
    }

    fn advance(&mut self) -> bool {
        let width = self.columns.len();
        match self.rows.next() {
            Ok(Some(row)) => {
                let values = (0..width)
                    .map(|idx| row.get_ref(idx).map(Value::from))
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(EngineError::from);
                self.current = Some(values);
                true
            }
            Ok(None) => {
                self.current = None;
                false
            }
            Err(err) => {
                self.current = None;
                self.fault = Some(err.into());
                false
            }
        }
    }

    fn read_row(&mut self) -> std::result::Result<Vec<Value>, EngineError> {
        self.current
            .take()
            .unwrap_or_else(|| Err(EngineError::new("no current row")))
    }

    fn terminal_error(&mut self) -> Option<EngineError> {
        self.fault.take()
    }
}
