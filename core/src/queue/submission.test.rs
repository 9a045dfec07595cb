use std::sync::Arc;
use std::time::Duration;

use agent_error::ErrorExt;
use futures::StreamExt;

use super::*;
use crate::protocol::Operation;

fn turn(text: &str) -> Operation {
    Operation::UserTurn {
        content: text.to_string(),
    }
}

#[tokio::test]
async fn fifo_order_is_preserved() {
    let q = SubmissionQueue::new(SubmissionQueueConfig::default());
    let id1 = q.submit(turn("a"), None).await.unwrap();
    let id2 = q.submit(turn("b"), None).await.unwrap();
    let id3 = q.submit(turn("c"), None).await.unwrap();

    assert_eq!(q.take().await.unwrap().id, id1);
    assert_eq!(q.take().await.unwrap().id, id2);
    assert_eq!(q.take().await.unwrap().id, id3);
}

#[tokio::test]
async fn take_blocks_until_closed_then_returns_none() {
    let q = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    let q2 = Arc::clone(&q);
    let handle = tokio::spawn(async move { q2.take().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    q.close();
    assert!(handle.await.unwrap().is_none());
}

#[tokio::test]
async fn submit_and_take_after_close_with_pending_items_still_drains() {
    let q = SubmissionQueue::new(SubmissionQueueConfig::default());
    q.submit(turn("a"), None).await.unwrap();
    q.close();
    // Draining existing items is still allowed after close.
    assert!(q.take().await.is_some());
    assert!(q.take().await.is_none());
}

#[tokio::test]
async fn submit_after_close_fails() {
    let q = SubmissionQueue::new(SubmissionQueueConfig::default());
    q.close();
    let err = q.submit(turn("a"), None).await.unwrap_err();
    assert_eq!(
        err.status_code(),
        agent_error::StatusCode::QueueClosed
    );
}

#[tokio::test]
async fn try_take_is_non_blocking() {
    let q = SubmissionQueue::new(SubmissionQueueConfig::default());
    assert!(q.try_take().is_none());
    q.submit(turn("a"), None).await.unwrap();
    assert!(q.try_take().is_some());
    assert!(q.try_take().is_none());
}

#[tokio::test]
async fn submit_blocks_when_full_until_a_slot_opens() {
    let q = Arc::new(SubmissionQueue::new(SubmissionQueueConfig {
        capacity: 1,
        submit_timeout: None,
    }));
    q.submit(turn("a"), None).await.unwrap();

    let q2 = Arc::clone(&q);
    let producer = tokio::spawn(async move { q2.submit(turn("b"), None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    q.take().await.unwrap();
    producer.await.unwrap().unwrap();
}

#[tokio::test]
async fn submit_times_out_when_full_past_deadline() {
    let q = SubmissionQueue::new(SubmissionQueueConfig {
        capacity: 1,
        submit_timeout: Some(Duration::from_millis(20)),
    });
    q.submit(turn("a"), None).await.unwrap();
    let err = q.submit(turn("b"), None).await.unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::QueueTimeout);
}

#[tokio::test]
async fn timed_out_producer_leaves_queue_consistent() {
    let q = SubmissionQueue::new(SubmissionQueueConfig {
        capacity: 1,
        submit_timeout: Some(Duration::from_millis(10)),
    });
    q.submit(turn("a"), None).await.unwrap();
    assert!(q.submit(turn("b"), None).await.is_err());
    // Queue still holds exactly the original item; no phantom slot consumed.
    assert_eq!(q.len(), 1);
    q.take().await.unwrap();
    assert_eq!(q.len(), 0);
    q.submit(turn("c"), None).await.unwrap();
    assert_eq!(q.len(), 1);
}

#[tokio::test]
async fn stream_yields_until_close_and_drains() {
    let q = Arc::new(SubmissionQueue::new(SubmissionQueueConfig::default()));
    q.submit(turn("a"), None).await.unwrap();
    q.submit(turn("b"), None).await.unwrap();
    q.close();

    let items: Vec<_> = into_stream(q).collect().await;
    assert_eq!(items.len(), 2);
    let _ = items[0].id.to_string();
}
