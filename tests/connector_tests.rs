//! Integration tests for the manager running on the shipped connectors.

use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use stratum_config::config::{Config, Event, EventKind, Manager, Source, Value};
use stratum_config::sources::{FileSource, MemorySource, SqliteSource, priority};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(10);

type Observed = (Event, Option<Arc<Config>>);

fn observe(manager: &Manager) -> mpsc::UnboundedReceiver<Observed> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.on_change(move |event, _, current| {
        let _ = tx.send((event.clone(), current.cloned()));
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}

#[tokio::test]
async fn memory_defaults_sit_under_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"server": {"port": 9090}, "features": ["a", "b"]}"#).unwrap();

    let defaults = MemorySource::defaults().with_values([
        ("server.port", Value::from(8080i64)),
        ("server.host", Value::from("0.0.0.0")),
    ]);
    let manager = Manager::new();
    manager
        .add_source(FileSource::new(&path).unwrap())
        .add_source(defaults.clone());
    manager.load().await.unwrap();

    let config = manager.config();
    assert_eq!(config.get_int("server.port", 0), 9090);
    assert_eq!(config.get_string("server.host", ""), "0.0.0.0");
    assert_eq!(config.get_string_slice("features", vec![]), vec!["a", "b"]);
    assert_eq!(config.subset("server").len(), 2);
}

#[tokio::test]
async fn memory_mutations_republish() {
    let defaults = MemorySource::defaults().with_values([("mode", "dev")]);
    let manager = Manager::new();
    manager.add_source(defaults.clone());
    manager.load().await.unwrap();
    let mut seen = observe(&manager);
    assert_eq!(manager.watch().await.unwrap(), 1);

    defaults.set("mode", "prod");
    let (event, current) = next(&mut seen).await;
    assert_eq!(event.kind, EventKind::Update);
    assert_eq!(event.keys, vec!["mode"]);
    assert_eq!(current.unwrap().get_string("mode", ""), "prod");

    defaults.remove("mode");
    let (event, current) = next(&mut seen).await;
    assert_eq!(event.kind, EventKind::Delete);
    assert!(!current.unwrap().has("mode"));

    defaults.emit(Event::error("defaults", anyhow::anyhow!("simulated fault")));
    let (event, current) = next(&mut seen).await;
    assert!(event.is_error());
    assert!(current.is_none());

    manager.close().await.unwrap();
}

#[tokio::test]
async fn sqlite_changes_are_polled() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("config.db");
    let writer = Connection::open(&db).unwrap();
    writer
        .execute_batch(
            "CREATE TABLE app_config (key TEXT PRIMARY KEY, value);
             INSERT INTO app_config VALUES ('pool.size', 4);",
        )
        .unwrap();

    let source = SqliteSource::open(&db)
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    assert_eq!(source.priority(), priority::DATABASE);

    let manager = Manager::new();
    manager.add_source(source);
    manager.load().await.unwrap();
    assert_eq!(manager.config().get_int("pool.size", 0), 4);

    let mut seen = observe(&manager);
    assert_eq!(manager.watch().await.unwrap(), 1);

    writer
        .execute("INSERT INTO app_config VALUES ('pool.timeout', '2s')", [])
        .unwrap();
    let (event, current) = next(&mut seen).await;
    assert_eq!(event.kind, EventKind::Create);
    assert_eq!(event.keys, vec!["pool.timeout"]);
    assert_eq!(
        current.unwrap().get_duration("pool.timeout", Duration::ZERO),
        Duration::from_secs(2)
    );

    writer
        .execute("UPDATE app_config SET value = 8 WHERE key = 'pool.size'", [])
        .unwrap();
    let (event, current) = next(&mut seen).await;
    assert_eq!(event.kind, EventKind::Update);
    assert_eq!(current.unwrap().get_int("pool.size", 0), 8);

    manager.close().await.unwrap();
}

#[tokio::test]
async fn broken_file_reports_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.yaml");
    std::fs::write(&path, "level: info\n").unwrap();

    let manager = Manager::new();
    manager.add_source(
        FileSource::new(&path)
            .unwrap()
            .with_debounce(Duration::from_millis(50)),
    );
    manager.load().await.unwrap();
    let mut seen = observe(&manager);
    manager.watch().await.unwrap();

    std::fs::write(&path, "- not\n- a mapping\n").unwrap();

    let event = tokio::time::timeout(WAIT, async {
        loop {
            let (event, _) = seen.recv().await.expect("callback channel closed");
            if event.is_error() {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for error event");

    assert!(event.source.starts_with("file:"));
    let cause = format!("{:#}", event.error.unwrap());
    assert!(cause.contains("must be a mapping"));

    manager.close().await.unwrap();
}
