//! Engine capability consumed by the connector.
//!
//! The connector never talks to SQLite directly; it is handed an [`Opener`]
//! and drives the [`Database`] and [`Cursor`] it yields. Tests substitute
//! their own opener per connector instead of swapping anything global.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::params::NamedArg;
use crate::value::Value;

/// Opens databases in read-only mode.
pub trait Opener: Send + Sync {
    /// Opens the database at `path` without creating it. Statements run on the
    /// returned handle must abort once `cancel` fires.
    fn open(&self, path: &Path, cancel: &CancellationToken)
        -> std::result::Result<Box<dyn Database>, EngineError>;
}

/// An open, read-only database handle.
pub trait Database: Send {
    /// Prepares `sql`, binds `args` by name and hands the live cursor to
    /// `consume`. The cursor is released before this returns.
    ///
    /// Preparation failures are reported as `Execution`, unbound parameters
    /// as `Binding`. Errors returned by `consume` are passed through.
    fn query(
        &self,
        sql: &str,
        args: &[NamedArg],
        consume: &mut dyn FnMut(&mut dyn Cursor) -> Result<()>,
    ) -> Result<()>;

    /// Releases the handle.
    fn close(self: Box<Self>) -> std::result::Result<(), EngineError>;
}

/// Forward-only cursor over a statement's rows.
pub trait Cursor {
    /// Column names in result order.
    fn column_names(&self) -> std::result::Result<Vec<String>, EngineError>;

    /// Moves to the next row. Returns `false` when rows are exhausted or the
    /// engine faulted; the fault is then available from [`terminal_error`].
    ///
    /// [`terminal_error`]: Cursor::terminal_error
    fn advance(&mut self) -> bool;

    /// Reads every cell of the current row.
    fn read_row(&mut self) -> std::result::Result<Vec<Value>, EngineError>;

    /// The fault that ended iteration, if any.
    fn terminal_error(&mut self) -> Option<EngineError>;
}
