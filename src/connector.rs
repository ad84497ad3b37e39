//! Single-shot query invocations.
//!
//! A [`Connector`] validates a [`QueryRequest`], opens the database through its
//! [`Opener`], binds the parameters, materializes the rows and closes the
//! handle again. Nothing survives between invocations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::engine::{Cursor, Opener};
use crate::error::{QueryError, Result};
use crate::params::Params;
use crate::policy::ensure_select;
use crate::result::{materialize, QueryOutput};
use crate::sqlite::SqliteOpener;

/// One read-only query against one database file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Path to the SQLite database file.
    pub db_path: String,

    /// SQL to run. Named parameters are written `:name`.
    pub query: String,

    /// Values for the query's named parameters.
    #[serde(default)]
    pub params: Params,
}

impl QueryRequest {
    pub fn new(db_path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            query: query.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params = self.params.with_value(name, value);
        self
    }

    /// Checks the request before any database work happens.
    ///
    /// An empty path is rejected because SQLite would open a private temporary
    /// database for it. The SELECT guard runs here too, so a non-SELECT query
    /// is reported even when the path is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(QueryError::open("database path must not be empty"));
        }
        ensure_select(&self.query)
    }
}

/// The boundary the orchestrating tool calls.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Runs `request` to completion. Cancelling `cancel`, or dropping the
    /// returned future, aborts the in-flight query and releases the handle.
    async fn read(&self, request: QueryRequest, cancel: CancellationToken) -> Result<QueryOutput>;
}

/// Runs query requests through an injected [`Opener`].
#[derive(Clone)]
pub struct Connector {
    opener: Arc<dyn Opener>,
    config: ConnectorConfig,
}

impl Connector {
    pub fn new(opener: impl Opener + 'static, config: ConnectorConfig) -> Self {
        Self {
            opener: Arc::new(opener),
            config,
        }
    }

    /// Creates a connector backed by rusqlite.
    pub fn sqlite(config: ConnectorConfig) -> Self {
        Self::new(SqliteOpener::new(&config), config)
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Runs one invocation on the calling thread.
    ///
    /// The handle is closed on every path once it has been opened; a close
    /// failure is logged and never replaces the invocation's own outcome.
    pub fn run(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<QueryOutput> {
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        debug!(db_path = %request.db_path, "opening database");
        let db = self
            .opener
            .open(Path::new(&request.db_path), cancel)
            .map_err(|e| QueryError::open(e.to_string()))?;

        let args = request.params.named_args();
        let mut output = None;
        let outcome = db.query(&request.query, &args, &mut |cursor: &mut dyn Cursor| {
            output = Some(materialize(cursor, cancel)?);
            Ok(())
        });

        if let Err(err) = db.close() {
            warn!(db_path = %request.db_path, error = %err, "failed to close database");
        }

        match outcome {
            // An interrupted statement surfaces as an engine error.
            Err(_) if cancel.is_cancelled() => Err(QueryError::Cancelled),
            Err(err) => Err(err),
            Ok(()) => output.ok_or_else(|| QueryError::internal("query produced no result")),
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for Connector {
    async fn read(&self, request: QueryRequest, cancel: CancellationToken) -> Result<QueryOutput> {
        let token = cancel.child_token();
        // Cancels the worker if this future is dropped before it finishes.
        let guard = token.clone().drop_guard();

        let connector = self.clone();
        let worker_token = token.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || connector.run(&request, &worker_token));

        let joined = match self.config.query_timeout() {
            None => (&mut handle).await,
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    token.cancel();
                    // Wait for the worker to release its handle.
                    let _ = handle.await;
                    guard.disarm();
                    return Err(QueryError::TimedOut(
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    ));
                }
            },
        };
        guard.disarm();

        joined.map_err(|e| QueryError::internal(format!("query worker failed: {e}")))?
    }
}
