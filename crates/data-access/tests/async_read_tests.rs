//! Callback-style reads on the callback pool.

mod common;

use std::time::Duration;

use helios_data_access::ErrorKind;
use helios_data_access::types::{Filter, OperatorSet, RangeOp};
use serde_json::json;
use tokio::sync::oneshot;

use common::{TestContext, record};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_receives_rows_on_pool_thread() {
    let ctx = TestContext::new();
    for (id, status) in [("u1", "active"), ("u2", "inactive"), ("u3", "active")] {
        ctx.access
            .insert_record("app", "users", &record(json!({"id": id, "status": status})))
            .await
            .unwrap();
    }

    let (tx, rx) = oneshot::channel();
    ctx.access.apply_operation_on_records_async(
        "app",
        "users",
        Filter::new().with("status", "active"),
        Some(&["id"]),
        move |outcome| {
            let thread = std::thread::current().name().map(String::from);
            let _ = tx.send((outcome, thread));
        },
    );

    let (outcome, thread) = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("callback within five seconds")
        .expect("callback invoked");
    let response = outcome.unwrap();
    assert_eq!(response.count, 2);
    assert!(thread.unwrap().starts_with("data-access-callback"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_validation_error_is_delivered_to_callback() {
    let ctx = TestContext::new();

    let (tx, rx) = oneshot::channel();
    ctx.access.apply_operation_on_records_async(
        "app",
        "users",
        Filter::new().with("age", OperatorSet::new().range(RangeOp::Gt, 3)),
        None,
        move |outcome| {
            let _ = tx.send(outcome);
        },
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("callback within five seconds")
        .expect("callback invoked");
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Validation);
}
