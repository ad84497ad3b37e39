//! Read-only SQLite queries exposed as configuration data.
//!
//! # Intention
//!
//! - Run one SELECT against a local SQLite file per invocation and return the
//!   rows both as ordered string maps and as a JSON array of objects.
//! - Never write: files are opened read-only and never created, and queries
//!   must start with SELECT.
//!
//! # Architectural Boundaries
//!
//! - The host plugin protocol lives outside this crate; it hands in a
//!   [`QueryRequest`] and receives a [`QueryOutput`] or a [`QueryError`].
//! - The SQLite engine sits behind the [`Opener`] capability so callers and
//!   tests can supply their own.

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod mock;
pub mod params;
pub mod policy;
pub mod result;
pub mod sqlite;
pub mod value;

pub use config::{ConfigError, ConnectorConfig};
pub use connector::{Connector, DataSource, QueryRequest};
pub use engine::{Cursor, Database, Opener};
pub use error::{Diagnostic, EngineError, QueryError, Result};
pub use params::{NamedArg, Params};
pub use result::{QueryOutput, Row};
pub use sqlite::SqliteOpener;
pub use value::Value;

pub use tokio_util::sync::CancellationToken;
