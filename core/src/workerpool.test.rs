use std::time::Duration;

use agent_error::ErrorExt;

use super::*;

fn spec(timeout: Duration) -> WorkerSpec {
    WorkerSpec {
        name: "explorer".to_string(),
        model: "gpt-4o-mini".to_string(),
        capabilities: vec!["read".to_string()],
        timeout,
        cost_tier: 1,
    }
}

#[tokio::test]
async fn dispatch_fails_when_no_slot_is_free() {
    let pool = WorkerPool::new(1);
    pool.dispatch(spec(Duration::from_secs(5)), None, "first", |_cancel| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            (true, "done".to_string())
        })
    })
    .unwrap();

    let err = pool
        .dispatch(spec(Duration::from_secs(5)), None, "second", |_cancel| {
            Box::pin(async { (true, "done".to_string()) })
        })
        .unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::ResourcesExhausted);
}

#[tokio::test]
async fn wait_for_any_returns_the_first_completion() {
    let pool = WorkerPool::new(2);
    pool.dispatch(spec(Duration::from_secs(5)), None, "fast", |_cancel| {
        Box::pin(async { (true, "fast result".to_string()) })
    })
    .unwrap();

    let completed = pool.wait_for_any().await.unwrap();
    assert!(completed.success);
    assert_eq!(completed.output, "fast result");
    assert_eq!(pool.inflight_count(), 0);
}

#[tokio::test]
async fn timed_out_worker_resolves_as_a_failed_result() {
    let pool = WorkerPool::new(1);
    pool.dispatch(spec(Duration::from_millis(20)), None, "slow", |_cancel| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (true, "too slow".to_string())
        })
    })
    .unwrap();

    let completed = pool.wait_for_any().await.unwrap();
    assert!(!completed.success);
}

#[tokio::test]
async fn wait_for_all_drains_every_dispatched_worker() {
    let pool = WorkerPool::new(4);
    for i in 0..3 {
        pool.dispatch(spec(Duration::from_secs(5)), None, format!("worker-{i}"), |_cancel| {
            Box::pin(async move { (true, "ok".to_string()) })
        })
        .unwrap();
    }
    let results = pool.wait_for_all().await;
    assert_eq!(results.len(), 3);
    assert_eq!(pool.inflight_count(), 0);
}

#[tokio::test]
async fn cancel_all_clears_inflight_and_cancels_tokens() {
    let pool = WorkerPool::new(2);
    pool.dispatch(spec(Duration::from_secs(30)), None, "long-runner", |cancel| {
        Box::pin(async move {
            cancel.cancelled().await;
            (false, "cancelled".to_string())
        })
    })
    .unwrap();

    pool.cancel_all().await;
    assert_eq!(pool.inflight_count(), 0);
}

fn specs_with_tiers() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec {
            name: "generalist".to_string(),
            model: "gpt-4o".to_string(),
            capabilities: vec!["read".to_string(), "write".to_string()],
            timeout: Duration::from_secs(30),
            cost_tier: 3,
        },
        WorkerSpec {
            name: "reader".to_string(),
            model: "gpt-4o-mini".to_string(),
            capabilities: vec!["read".to_string()],
            timeout: Duration::from_secs(30),
            cost_tier: 1,
        },
        WorkerSpec {
            name: "writer".to_string(),
            model: "gpt-4o-mini".to_string(),
            capabilities: vec!["read".to_string(), "write".to_string()],
            timeout: Duration::from_secs(30),
            cost_tier: 2,
        },
    ]
}

#[test]
fn select_worker_picks_the_cheapest_spec_covering_the_capabilities() {
    let specs = specs_with_tiers();
    let chosen = select_worker(&specs, &["read".to_string(), "write".to_string()]).unwrap();
    assert_eq!(chosen.name, "writer");
}

#[test]
fn select_worker_rejects_specs_missing_a_required_capability() {
    let specs = specs_with_tiers();
    let chosen = select_worker(&specs, &["execute".to_string()]);
    assert!(chosen.is_none());
}

#[tokio::test]
async fn dispatch_selected_fails_with_no_matching_spec_when_none_covers_the_capability() {
    let pool = WorkerPool::new(1).with_specs(specs_with_tiers());
    let err = pool
        .dispatch_selected(&["execute".to_string()], None, "needs exec", |_cancel| {
            Box::pin(async { (true, "done".to_string()) })
        })
        .unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvalidArguments);
}

#[tokio::test]
async fn dispatch_selected_uses_the_cheapest_matching_spec() {
    let pool = WorkerPool::new(1).with_specs(specs_with_tiers());
    pool.dispatch_selected(&["read".to_string()], None, "reading", |_cancel| {
        Box::pin(async { (true, "done".to_string()) })
    })
    .unwrap();

    let status = pool.status();
    assert_eq!(status[0].name, "reader");
    assert_eq!(status[0].model, "gpt-4o-mini");
}

#[tokio::test]
async fn status_reports_inflight_worker_metadata() {
    let pool = WorkerPool::new(2);
    pool.dispatch(
        spec(Duration::from_secs(5)),
        None,
        "investigate the bug",
        |_cancel| Box::pin(async { std::future::pending::<(bool, String)>().await }),
    )
    .unwrap();

    let status = pool.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].description, "investigate the bug");
    assert_eq!(status[0].model, "gpt-4o-mini");
    assert_eq!(status[0].name, "explorer");
}
