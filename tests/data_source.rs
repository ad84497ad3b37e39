mod common;

use std::time::Duration;

use common::build_fish_db;
use futures::future::join;
use sqlite_query::mock::{MockOpener, ScriptedCursor};
use sqlite_query::{
    CancellationToken, Connector, ConnectorConfig, DataSource, QueryError, QueryRequest,
};

/// Never yields a row; only an interrupt stops it.
const ENDLESS_QUERY: &str = "SELECT (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
     SELECT count(*) FROM c) AS n";

async fn wait_for_close(opener: &MockOpener) {
    for _ in 0..200 {
        if opener.closed() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_read_returns_rows() -> anyhow::Result<()> {
    let db = build_fish_db()?;
    let connector = Connector::sqlite(ConnectorConfig::default());

    let output = connector
        .read(
            QueryRequest::new(db.path_str(), "SELECT name FROM fish WHERE color = :color")
                .with_param("color", "red"),
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(output.result_json, r#"[{"name":"red fish"}]"#);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reads_are_independent() -> anyhow::Result<()> {
    let db = build_fish_db()?;
    let connector = Connector::sqlite(ConnectorConfig::default());

    let (all, red) = join(
        connector.read(
            QueryRequest::new(db.path_str(), "SELECT name FROM fish"),
            CancellationToken::new(),
        ),
        connector.read(
            QueryRequest::new(db.path_str(), "SELECT name FROM fish WHERE color = :color")
                .with_param("color", "red"),
            CancellationToken::new(),
        ),
    )
    .await;

    assert_eq!(all?.rows.len(), 7);
    assert_eq!(red?.rows.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_aborts_running_query() -> anyhow::Result<()> {
    let db = build_fish_db()?;
    let connector = Connector::sqlite(ConnectorConfig::default());
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let result = connector
        .read(QueryRequest::new(db.path_str(), ENDLESS_QUERY), cancel)
        .await;
    canceller.await?;

    assert_eq!(result.unwrap_err(), QueryError::Cancelled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_interrupts_query() -> anyhow::Result<()> {
    let db = build_fish_db()?;
    let config = ConnectorConfig::default().with_query_timeout(Duration::from_millis(100));
    let connector = Connector::sqlite(config);

    let err = connector
        .read(
            QueryRequest::new(db.path_str(), ENDLESS_QUERY),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, QueryError::TimedOut(100));
    assert_eq!(err.summary(), "query timed out");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_future_releases_database() -> anyhow::Result<()> {
    let db = build_fish_db()?;
    let connector = Connector::sqlite(ConnectorConfig::default());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        connector.read(
            QueryRequest::new(db.path_str(), ENDLESS_QUERY),
            CancellationToken::new(),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    // The interrupted worker finishes; the file stays readable.
    let output = connector
        .read(
            QueryRequest::new(db.path_str(), "SELECT count(*) AS total FROM fish"),
            CancellationToken::new(),
        )
        .await?;
    assert_eq!(output.rows[0].get("total"), Some("7"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_future_closes_handle() {
    let opener = MockOpener::new(ScriptedCursor::new(["n"])).hanging();
    let connector = Connector::new(opener.clone(), ConnectorConfig::default());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        connector.read(
            QueryRequest::new("/tmp/any.db", "SELECT 1"),
            CancellationToken::new(),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    wait_for_close(&opener).await;
    assert_eq!(opener.opened(), 1);
    assert_eq!(opener.closed(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_returns_after_handle_closed() {
    let opener = MockOpener::new(ScriptedCursor::new(["n"])).hanging();
    let config = ConnectorConfig::default().with_query_timeout(Duration::from_millis(50));
    let connector = Connector::new(opener.clone(), config);

    let err = connector
        .read(
            QueryRequest::new("/tmp/any.db", "SELECT 1"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, QueryError::TimedOut(50));
    assert_eq!(opener.opened(), 1);
    assert_eq!(opener.closed(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_closes_handle() {
    let opener = MockOpener::new(ScriptedCursor::new(["n"])).hanging();
    let connector = Connector::new(opener.clone(), ConnectorConfig::default());
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };
    let result = connector
        .read(QueryRequest::new("/tmp/any.db", "SELECT 1"), cancel)
        .await;
    canceller.await.unwrap();

    assert_eq!(result.unwrap_err(), QueryError::Cancelled);
    assert_eq!(opener.closed(), 1);
}

#[tokio::test]
async fn test_failure_diagnostic() {
    let connector = Connector::sqlite(ConnectorConfig::default());

    let err = connector
        .read(
            QueryRequest::new("/path/does/not/exist.db", "SELECT 1"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let diag = err.diagnostic();
    assert_eq!(diag.summary, "open sqlite db failed");
    assert!(diag.detail.contains("unable to open database file"));
}
