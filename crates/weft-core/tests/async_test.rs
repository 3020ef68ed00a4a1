//! Integration tests for the asynchronous entry points
//!
//! - Async predicates and transforms awaited on the async paths
//! - SYNC errors when they are reached synchronously
//! - Callbacks delivered from a spawned task, never on the caller's stack
//! - Deadlines from `EngineConfig`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::oneshot;
use weft_core::{BoxError, EngineConfig, Error, ErrorKind, Predicate, Registry, Schema, TransformFn};

fn registry() -> Registry {
    Registry::new()
        .predicate(
            "known_user",
            Predicate::from_async(|v: Value| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                match v.as_str() {
                    Some("ada") | Some("bob") => Ok(()),
                    _ => Err::<(), BoxError>("unknown user".into()),
                }
            }),
        )
        .transform(
            "lookup_id",
            TransformFn::from_async(|v: Value| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                match v.as_str() {
                    Some("ada") => Ok::<Value, BoxError>(json!(1)),
                    Some("bob") => Ok(json!(2)),
                    _ => Err("no such user".into()),
                }
            }),
        )
        .predicate(
            "never_finishes",
            Predicate::from_async(|_| async {
                std::future::pending::<()>().await;
                Ok::<(), BoxError>(())
            }),
        )
}

fn schema(raw: Value) -> Schema {
    Schema::compile(&raw, &registry()).unwrap()
}

#[tokio::test]
async fn test_async_report_awaits_predicates() {
    let s = schema(json!({"users": {".type": "array", ".all": {".eval": "known_user", ".async": true}}}));
    assert!(s.report_async(&json!({"users": ["ada", "bob"]})).await.is_empty());

    let errors = s.report_async(&json!({"users": ["ada", "eve", "mallory"]})).await;
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].cause[0].kind, ErrorKind::Invalid);
    assert_eq!(errors[0].cause[0].reason.as_deref(), Some("unknown user"));
}

#[test]
fn test_sync_report_flags_async_predicates() {
    let s = schema(json!({"user": {".eval": "known_user"}, "age": {".type": "number", ".min": 0}}));
    let errors = s.report(&json!({"user": "ada", "age": -1}));
    let mut kinds: Vec<ErrorKind> = errors.iter().map(|e| e.kind).collect();
    kinds.sort_by_key(|k| k.code());
    assert_eq!(kinds, vec![ErrorKind::Limit, ErrorKind::Sync]);
}

#[tokio::test]
async fn test_async_transform() {
    let s = schema(json!({"owner": {".transform": "lookup_id"}}));
    assert_eq!(
        s.transform_async(&json!({"owner": "bob"}), None).await.unwrap(),
        json!({"owner": 2})
    );
    match s.transform_async(&json!({"owner": "eve"}), None).await {
        Err(Error::Validation(e)) => {
            assert_eq!(e.kind, ErrorKind::Invalid);
            assert_eq!(e.reason.as_deref(), Some("no such user"));
        }
        other => panic!("unexpected {other:?}"),
    }
    match s.transform(&json!({"owner": "bob"}), None) {
        Err(Error::Validation(e)) => assert_eq!(e.kind, ErrorKind::Sync),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_report_callback_runs_after_return() {
    let s = schema(json!({"a": "number"}));
    let returned = Arc::new(AtomicBool::new(false));
    let seen_after_return = Arc::new(AtomicBool::new(false));
    let (tx, rx) = oneshot::channel();

    let flag = returned.clone();
    let seen = seen_after_return.clone();
    s.report_with(json!({"a": "x"}), move |errors| {
        seen.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
        let _ = tx.send(errors);
    })
    .unwrap();
    returned.store(true, Ordering::SeqCst);

    let errors = rx.await.unwrap();
    assert!(seen_after_return.load(Ordering::SeqCst));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Type);
}

#[tokio::test]
async fn test_transform_callback_called_once() {
    let s = schema(json!({"n": {".type": "number", ".add": true}}));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (tx, rx) = oneshot::channel();

    let handle = s
        .transform_with(json!({"n": 1}), Some(json!({"n": 2})), move |outcome| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(outcome);
        })
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let merged = rx.await.unwrap().unwrap();
    handle.await.unwrap();
    assert_eq!(merged, json!({"n": 3}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_needs_runtime() {
    let s = schema(json!({"a": "number"}));
    let result = s.report_with(json!({"a": 1}), |_| {});
    assert!(matches!(result, Err(Error::NoRuntime)));
}

#[tokio::test(start_paused = true)]
async fn test_deadline() {
    let s = schema(json!({"a": {".eval": "never_finishes"}})).with_config(EngineConfig {
        deadline_ms: Some(50),
        ..Default::default()
    });
    let errors = s.report_async(&json!({"a": 1})).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Invalid);
    assert_eq!(errors[0].path, "");

    match s.validate_async(&json!({"a": 1})).await {
        Err(Error::Validation(e)) => assert!(e.message.contains("deadline")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_siblings_run_concurrently() {
    let s = schema(json!({
        "a": {".eval": "known_user"},
        "b": {".eval": "known_user"},
        "c": {".eval": "known_user"},
        "d": {".eval": "known_user"}
    }))
    .with_config(EngineConfig {
        deadline_ms: Some(15),
        ..Default::default()
    });
    let doc = json!({"a": "ada", "b": "bob", "c": "ada", "d": "bob"});
    assert!(s.report_async(&doc).await.is_empty());
}
