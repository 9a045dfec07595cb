use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use agent_error::ErrorExt;

use super::*;
use crate::protocol::Operation;

fn turn() -> Operation {
    Operation::UserTurn {
        content: "hi".into(),
    }
}

#[tokio::test]
async fn handler_failure_emits_error_event_and_keeps_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_task = Arc::clone(&calls);
    let handler: SubmissionHandler = Arc::new(move |_submission| {
        let calls = Arc::clone(&calls_task);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        })
    });

    let bridge = ProtocolBridge::new(handler);
    let q_in = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in), Arc::clone(&q_out)).unwrap();

    let sub_id = q_in.submit(turn(), None).await.unwrap();
    let sub_id2 = q_in.submit(turn(), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let recent = q_out.get_recent(10);
    assert_eq!(recent.len(), 2);
    let seen_submissions: std::collections::HashSet<_> =
        recent.iter().map(|e| e.submission_id.clone()).collect();
    assert_eq!(seen_submissions, [Some(sub_id), Some(sub_id2)].into_iter().collect());
    for envelope in &recent {
        match &envelope.event {
            AgentEvent::Error {
                code, recoverable, ..
            } => {
                assert_eq!(code, "OPERATION_HANDLER_ERROR");
                assert!(recoverable);
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    bridge.wait_for_stop().await;
}

#[tokio::test]
async fn a_slow_submission_does_not_block_the_one_behind_it() {
    let fast_done = Arc::new(AtomicUsize::new(0));
    let fast_done_task = Arc::clone(&fast_done);
    let handler: SubmissionHandler = Arc::new(move |submission| {
        let fast_done = Arc::clone(&fast_done_task);
        Box::pin(async move {
            match &submission.op {
                Operation::UserTurn { content } if content == "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                _ => {
                    fast_done.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
    });

    let bridge = ProtocolBridge::new(handler);
    let q_in = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in), Arc::clone(&q_out)).unwrap();

    q_in.submit(Operation::UserTurn { content: "slow".into() }, None).await.unwrap();
    q_in.submit(Operation::UserTurn { content: "fast".into() }, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fast_done.load(Ordering::SeqCst), 1, "the fast submission must not wait on the slow one");
}

#[tokio::test]
async fn start_twice_fails() {
    let handler: SubmissionHandler = Arc::new(|_| Box::pin(async { Ok(()) }));
    let bridge = ProtocolBridge::new(handler);
    let q_in = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in), Arc::clone(&q_out)).unwrap();

    let err = bridge
        .start(Arc::clone(&q_in), Arc::clone(&q_out))
        .unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvariantViolation);

    bridge.wait_for_stop().await;
}

#[tokio::test]
async fn emit_fails_before_start_and_after_stop() {
    let handler: SubmissionHandler = Arc::new(|_| Box::pin(async { Ok(()) }));
    let bridge = ProtocolBridge::new(handler);
    assert!(bridge.emit(None, AgentEvent::AgentMessage {
        content: "x".into(),
        done: true,
    }).is_err());

    let q_in = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in), Arc::clone(&q_out)).unwrap();
    assert!(bridge.emit(None, AgentEvent::AgentMessage {
        content: "x".into(),
        done: true,
    }).is_ok());

    bridge.wait_for_stop().await;
    assert!(bridge.emit(None, AgentEvent::AgentMessage {
        content: "x".into(),
        done: true,
    }).is_err());
}

#[tokio::test]
async fn stop_then_restart_with_fresh_queues() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_task = Arc::clone(&calls);
    let handler: SubmissionHandler = Arc::new(move |_| {
        let calls = Arc::clone(&calls_task);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    let bridge = ProtocolBridge::new(handler);

    let q_in1 = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out1 = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in1), q_out1).unwrap();
    q_in1.submit(turn(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    bridge.wait_for_stop().await;
    assert!(!bridge.is_running());

    let q_in2 = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q_out2 = Arc::new(EventQueue::new());
    bridge.start(Arc::clone(&q_in2), q_out2).unwrap();
    q_in2.submit(turn(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    bridge.wait_for_stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
