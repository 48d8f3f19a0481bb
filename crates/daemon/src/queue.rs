// SPDX-License-Identifier: MIT

//! The Request Queue (specification §4.4): a bounded, per-project FIFO of
//! requests waiting for their project's worker to become ready.
//!
//! Ordering guarantee: items are *dispatched* to the worker in the order
//! they were accepted (§5 of the specification). Their upstream responses
//! may complete in any order once dispatched — only dispatch order is FIFO.

use axum::http::{HeaderMap, Method};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use oxhv_core::{HypervisorError, ProjectName};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// A request, fully buffered into memory so it can be replayed once its
/// project's worker is ready. Bodies larger than the configured cap are
/// truncated silently and proceed — pinned as a documented contract by the
/// specification's §9 Open Question, not treated as a 413.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub truncated: bool,
}

/// Read an incoming body into memory, capping at `max_bytes` and silently
/// discarding anything past the cap (the boundary is inclusive: a body of
/// exactly `max_bytes` is buffered whole; one byte more truncates to
/// `max_bytes`).
pub async fn buffer_body(body: axum::body::Body, max_bytes: usize) -> (Bytes, bool) {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    let mut truncated = false;

    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        let remaining = max_bytes.saturating_sub(buf.len());
        if remaining == 0 {
            if !chunk.is_empty() {
                truncated = true;
            }
            break;
        }
        if chunk.len() > remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    (buf.freeze(), truncated)
}

/// What a queued item resolves to once it reaches the front and its turn
/// comes: either the rendered response from an actual dispatch, or a
/// terminal error (overflow, timeout) the caller should render directly.
pub enum QueueOutcome {
    Dispatch(axum::response::Response),
    Failed(HypervisorError),
}

struct QueueItem {
    buffered: BufferedRequest,
    enqueued_at: Instant,
    max_wait: Duration,
    responder: Arc<Mutex<Option<oneshot::Sender<QueueOutcome>>>>,
}

#[derive(Default)]
struct ProjectQueue {
    items: VecDeque<QueueItem>,
}

/// Bounded per-project FIFO queues, guarded by one lock (mirroring
/// `oxhv-storage::StateManager`'s single-lock discipline: short, synchronous
/// critical sections, no `.await` held across the lock).
pub struct RequestQueue {
    max_items: usize,
    queues: Mutex<HashMap<ProjectName, ProjectQueue>>,
    flush_watchers: Mutex<HashSet<ProjectName>>,
}

impl RequestQueue {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items,
            queues: Mutex::new(HashMap::new()),
            flush_watchers: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a flush-watcher task is already running for `project`; if
    /// not, marks one as running and returns `true` so the caller spawns
    /// exactly one.
    pub fn claim_flush_watcher(&self, project: &ProjectName) -> bool {
        self.flush_watchers.lock().insert(project.clone())
    }

    pub fn release_flush_watcher(&self, project: &ProjectName) {
        self.flush_watchers.lock().remove(project);
    }

    /// Enqueue `buffered` for `project` and wait for its turn, a timeout, or
    /// immediate rejection if the queue is already full.
    pub async fn enqueue_and_wait(
        &self,
        project: &ProjectName,
        buffered: BufferedRequest,
        max_wait_ms: u64,
    ) -> QueueOutcome {
        let (tx, rx) = oneshot::channel();
        let responder = Arc::new(Mutex::new(Some(tx)));

        {
            let mut queues = self.queues.lock();
            let queue = queues.entry(project.clone()).or_default();
            if queue.items.len() >= self.max_items {
                return QueueOutcome::Failed(HypervisorError::QueueOverflow);
            }
            queue.items.push_back(QueueItem {
                buffered,
                enqueued_at: Instant::now(),
                max_wait: Duration::from_millis(max_wait_ms),
                responder: Arc::clone(&responder),
            });
        }

        match tokio::time::timeout(Duration::from_millis(max_wait_ms), rx).await {
            Ok(Ok(outcome)) => outcome,
            _ => {
                // Either the timer fired first or the sender was dropped
                // without resolving (shutdown). Claim the responder slot so
                // a racing flush can't dispatch this item after we've
                // already answered the caller.
                if responder.lock().take().is_some() {
                    debug!(project = %project.as_str(), "queue wait timed out");
                }
                QueueOutcome::Failed(HypervisorError::QueueTimeout)
            }
        }
    }

    /// Drain every ready-to-dispatch item for `project` in FIFO order,
    /// handing each one to `dispatch`. Expired items are resolved with a
    /// timeout error instead of being dispatched. `dispatch` returning
    /// establishes *dispatch order*; it does not need to wait for the
    /// upstream response to complete before the next item's dispatch call
    /// begins, matching the "dispatch order is FIFO, completion order is
    /// not" guarantee.
    pub async fn flush<F, Fut>(&self, project: &ProjectName, mut dispatch: F)
    where
        F: FnMut(BufferedRequest) -> Fut,
        Fut: std::future::Future<Output = QueueOutcome>,
    {
        loop {
            let item = {
                let mut queues = self.queues.lock();
                match queues.get_mut(project).and_then(|q| q.items.pop_front()) {
                    Some(item) => item,
                    None => return,
                }
            };

            let Some(tx) = item.responder.lock().take() else {
                // Already resolved by a racing timeout.
                continue;
            };

            if item.enqueued_at.elapsed() >= item.max_wait {
                let _ = tx.send(QueueOutcome::Failed(HypervisorError::QueueTimeout));
                continue;
            }

            let outcome = dispatch(item.buffered).await;
            let _ = tx.send(outcome);
        }
    }

    #[cfg(test)]
    fn depth(&self, project: &ProjectName) -> usize {
        self.queues.lock().get(project).map(|q| q.items.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffered() -> BufferedRequest {
        BufferedRequest {
            method: Method::GET,
            path_and_query: "/hello".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            truncated: false,
        }
    }

    #[tokio::test]
    async fn buffer_body_truncates_exactly_past_the_cap() {
        let body = axum::body::Body::from(vec![b'x'; 11]);
        let (bytes, truncated) = buffer_body(body, 10).await;
        assert_eq!(bytes.len(), 10);
        assert!(truncated);

        let body = axum::body::Body::from(vec![b'x'; 10]);
        let (bytes, truncated) = buffer_body(body, 10).await;
        assert_eq!(bytes.len(), 10);
        assert!(!truncated);
    }

    #[tokio::test]
    async fn overflow_rejects_immediately_once_depth_reaches_max_items() {
        let queue = RequestQueue::new(1);
        let project = ProjectName::new("alpha");

        // Fill the one slot with an item nobody will ever flush or time out
        // within this test, so the second enqueue observes `depth == max`.
        queue
            .queues
            .lock()
            .entry(project.clone())
            .or_default()
            .items
            .push_back(QueueItem {
                buffered: buffered(),
                enqueued_at: Instant::now(),
                max_wait: Duration::from_secs(5),
                responder: Arc::new(Mutex::new(None)),
            });
        assert_eq!(queue.depth(&project), 1);

        let outcome = queue.enqueue_and_wait(&project, buffered(), 5_000).await;
        assert!(matches!(outcome, QueueOutcome::Failed(HypervisorError::QueueOverflow)));
    }

    #[tokio::test]
    async fn wait_timeout_resolves_503_after_max_wait_ms_elapses() {
        let queue = Arc::new(RequestQueue::new(8));
        let project = ProjectName::new("alpha");
        let outcome = queue.enqueue_and_wait(&project, buffered(), 30).await;
        assert!(matches!(outcome, QueueOutcome::Failed(HypervisorError::QueueTimeout)));
    }

    #[tokio::test]
    async fn flush_dispatches_in_fifo_order() {
        let queue = Arc::new(RequestQueue::new(8));
        let project = ProjectName::new("alpha");

        let mut first = buffered();
        first.path_and_query = "/first".to_string();
        let mut second = buffered();
        second.path_and_query = "/second".to_string();

        let q1 = Arc::clone(&queue);
        let p1 = project.clone();
        let first_waiter = tokio::spawn(async move { q1.enqueue_and_wait(&p1, first, 5_000).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let q2 = Arc::clone(&queue);
        let p2 = project.clone();
        let second_waiter = tokio::spawn(async move { q2.enqueue_and_wait(&p2, second, 5_000).await });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let dispatch_order = Arc::new(Mutex::new(Vec::new()));
        let order = Arc::clone(&dispatch_order);
        queue
            .flush(&project, move |req| {
                order.lock().push(req.path_and_query.clone());
                async move { QueueOutcome::Dispatch(axum::response::Response::new(axum::body::Body::empty())) }
            })
            .await;

        let first_outcome = first_waiter.await.expect("join");
        let second_outcome = second_waiter.await.expect("join");
        assert!(matches!(first_outcome, QueueOutcome::Dispatch(_)));
        assert!(matches!(second_outcome, QueueOutcome::Dispatch(_)));
        assert_eq!(*dispatch_order.lock(), vec!["/first", "/second"]);
    }

    #[tokio::test]
    async fn an_item_already_claimed_by_timeout_is_skipped_by_flush() {
        let queue = Arc::new(RequestQueue::new(8));
        let project = ProjectName::new("alpha");

        let outcome = queue.enqueue_and_wait(&project, buffered(), 10).await;
        assert!(matches!(outcome, QueueOutcome::Failed(HypervisorError::QueueTimeout)));

        let mut dispatched = false;
        queue
            .flush(&project, |_req| {
                dispatched = true;
                async move { QueueOutcome::Dispatch(axum::response::Response::new(axum::body::Body::empty())) }
            })
            .await;
        assert!(!dispatched, "a timed-out item must never be dispatched");
    }
}
