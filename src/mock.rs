//! Scripted engine for testing.
//!
//! Provides an opener whose cursors replay a predefined sequence of rows and
//! failures, and which counts opened and closed handles.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{Cursor, Database, Opener};
use crate::error::{EngineError, QueryError, Result};
use crate::params::NamedArg;
use crate::value::Value;

/// A cursor that replays scripted rows.
#[derive(Debug, Clone)]
pub struct ScriptedCursor {
    columns: std::result::Result<Vec<String>, String>,
    steps: VecDeque<std::result::Result<Vec<Value>, String>>,
    current: Option<std::result::Result<Vec<Value>, String>>,
    fault: Option<String>,
}

impl Default for ScriptedCursor {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ScriptedCursor {
    /// Creates a cursor with the given columns and no rows.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Ok(columns.into_iter().map(Into::into).collect()),
            steps: VecDeque::new(),
            current: None,
            fault: None,
        }
    }

    /// Creates a cursor whose column lookup fails.
    pub fn without_columns(message: impl Into<String>) -> Self {
        Self {
            columns: Err(message.into()),
            steps: VecDeque::new(),
            current: None,
            fault: None,
        }
    }

    /// Appends a row.
    pub fn with_row(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.steps.push_back(Ok(values.into_iter().collect()));
        self
    }

    /// Appends a row whose cells cannot be read.
    pub fn with_scan_error(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(Err(message.into()));
        self
    }

    /// Reports `message` as the terminal fault after the last row.
    pub fn with_fault(mut self, message: impl Into<String>) -> Self {
        self.fault = Some(message.into());
        self
    }
}

impl Cursor for ScriptedCursor {
    fn column_names(&self) -> std::result::Result<Vec<String>, EngineError> {
        self.columns.clone().map_err(EngineError::new)
    }

    fn advance(&mut self) -> bool {
        self.current = self.steps.pop_front();
        self.current.is_some()
    }

    fn read_row(&mut self) -> std::result::Result<Vec<Value>, EngineError> {
        match self.current.take() {
            Some(step) => step.map_err(EngineError::new),
            None => Err(EngineError::new("no current row")),
        }
    }

    fn terminal_error(&mut self) -> Option<EngineError> {
        self.fault.take().map(EngineError::new)
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    last_args: Mutex<Vec<NamedArg>>,
}

/// An opener that hands out handles replaying a [`ScriptedCursor`].
#[derive(Debug, Clone)]
pub struct MockOpener {
    script: std::result::Result<ScriptedCursor, String>,
    query_error: Option<QueryError>,
    close_error: Option<String>,
    hang: bool,
    counters: Arc<Counters>,
}

impl MockOpener {
    /// Creates an opener whose queries replay `cursor`.
    pub fn new(cursor: ScriptedCursor) -> Self {
        Self {
            script: Ok(cursor),
            query_error: None,
            close_error: None,
            hang: false,
            counters: Arc::default(),
        }
    }

    /// Creates an opener that fails to open with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Err(message.into()),
            ..Self::new(ScriptedCursor::default())
        }
    }

    /// Makes every query fail with `err` before a cursor exists.
    pub fn with_query_error(mut self, err: QueryError) -> Self {
        self.query_error = Some(err);
        self
    }

    /// Makes closing the handle fail with `message`.
    pub fn with_close_error(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    /// Makes every query block until its cancellation token fires, then fail
    /// the way an interrupted statement does.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of handles opened so far.
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Number of handles closed so far.
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Arguments passed to the most recent query.
    pub fn last_args(&self) -> Vec<NamedArg> {
        self.counters
            .last_args
            .lock()
            .map(|args| args.clone())
            .unwrap_or_default()
    }
}

impl Opener for MockOpener {
    fn open(
        &self,
        _path: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<Box<dyn Database>, EngineError> {
        let cursor = self.script.clone().map_err(EngineError::new)?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabase {
            cursor,
            query_error: self.query_error.clone(),
            close_error: self.close_error.clone(),
            hang: self.hang.then(|| cancel.clone()),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MockDatabase {
    cursor: ScriptedCursor,
    query_error: Option<QueryError>,
    close_error: Option<String>,
    hang: Option<CancellationToken>,
    counters: Arc<Counters>,
}

impl Database for MockDatabase {
    fn query(
        &self,
        _sql: &str,
        args: &[NamedArg],
        consume: &mut dyn FnMut(&mut dyn Cursor) -> Result<()>,
    ) -> Result<()> {
        if let Ok(mut last) = self.counters.last_args.lock() {
            *last = args.to_vec();
        }
        if let Some(err) = &self.query_error {
            return Err(err.clone());
        }
        if let Some(cancel) = &self.hang {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            return Err(QueryError::row_iteration("interrupted"));
        }
        let mut cursor = self.cursor.clone();
        consume(&mut cursor)
    }

    fn close(self: Box<Self>) -> std::result::Result<(), EngineError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        match self.close_error {
            Some(message) => Err(EngineError::new(message)),
            None => Ok(()),
        }
    }
}
