//! Single-consumer task dispatcher.
//!
//! Submitted work is queued and executed by exactly one background consumer,
//! strictly in submission order and one unit at a time. Synchronous work runs on
//! tokio's blocking pool, but the consumer awaits each unit before dequeuing the
//! next, so callers that submit dependent tasks in sequence observe them in order.
//!
//! Failures (an `Err` or a panic) are logged and recorded as an absent result;
//! they never reach the submitter and never stop the consumer.

mod results;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tickline_model::TaskId;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::sync::lock;
use results::ResultSlots;

/// Zero-argument unit of work.
pub type Work = Box<dyn FnOnce() -> anyhow::Result<Value> + Send + 'static>;

/// Completion callback; invoked only when the work produced a value.
pub type Callback = Box<dyn FnOnce(&Value) + Send + 'static>;

/// How long [`Dispatcher::shutdown`] waits for the consumer before giving up on it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Envelope {
    id: TaskId,
    work: Work,
    callback: Option<Callback>,
}

struct Shared {
    results: ResultSlots,
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Handle to the dispatcher. Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    consumer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Start the dispatcher and its consumer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            results: ResultSlots::default(),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(consume(rx, Arc::clone(&shared), cancel.clone()));
        debug!("dispatcher consumer started");

        Self {
            tx,
            shared,
            cancel,
            consumer: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queue `work` under a generated id.
    pub fn submit<F>(&self, work: F) -> TaskId
    where
        F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
    {
        self.enqueue(TaskId::generate(), Box::new(work), None)
    }

    /// Queue `work` under a caller-chosen id. Ids are not deduplicated.
    pub fn submit_with_id<F>(&self, id: impl Into<TaskId>, work: F) -> TaskId
    where
        F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
    {
        self.enqueue(id.into(), Box::new(work), None)
    }

    /// Queue `work` and run `callback` with its value once it succeeds.
    pub fn submit_with_callback<F, C>(&self, id: Option<TaskId>, work: F, callback: C) -> TaskId
    where
        F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
        C: FnOnce(&Value) + Send + 'static,
    {
        let id = id.unwrap_or_else(TaskId::generate);
        self.enqueue(id, Box::new(work), Some(Box::new(callback)))
    }

    fn enqueue(&self, id: TaskId, work: Work, callback: Option<Callback>) -> TaskId {
        if self.cancel.is_cancelled() {
            warn!(task = %id, "dispatcher is shut down; task dropped");
            return id;
        }

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            id: id.clone(),
            work,
            callback,
        };
        if self.tx.send(envelope).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(task = %id, "dispatcher consumer is gone; task dropped");
        } else {
            trace!(task = %id, "task queued");
        }
        id
    }

    /// Whatever is currently recorded for `id`, without waiting.
    ///
    /// `None` both when the task has not run yet and when it failed.
    pub fn result(&self, id: &str) -> Option<Value> {
        self.shared.results.lookup(id).flatten()
    }

    /// Wait until a result is recorded for `id`, or until `timeout` elapses.
    ///
    /// A result left by an earlier submission with the same id satisfies the
    /// wait immediately. `timeout = None` waits indefinitely.
    pub async fn wait_result(&self, id: &str, timeout: Option<Duration>) -> Option<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.shared.results.wait(id, deadline).await
    }

    /// Number of tasks queued and not yet picked up by the consumer.
    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Returns `true` while a unit of work is executing.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) > 0
    }

    /// Returns `true` once [`Dispatcher::shutdown`] has been requested.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the consumer.
    ///
    /// Queued tasks that have not started are discarded. The consumer gets
    /// [`SHUTDOWN_GRACE`] to finish the unit in flight; after that it is
    /// aborted and shutdown completes regardless.
    #[instrument(level = "debug", skip(self))]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = lock(&self.consumer).take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(_) => debug!("dispatcher stopped within grace"),
            Err(_) => {
                warn!(
                    grace_ms = SHUTDOWN_GRACE.as_millis() as u64,
                    "dispatcher did not stop in time; abandoning in-flight task"
                );
                handle.abort();
                // Let the cancelled consumer drop its in-flight bookkeeping.
                let _ = handle.await;
            }
        }
    }
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };
        shared.queued.fetch_sub(1, Ordering::SeqCst);

        let _running = RunningGuard::enter(&shared.running);
        execute(&shared, envelope).await;
    }

    let dropped = shared.queued.swap(0, Ordering::SeqCst);
    if dropped > 0 {
        debug!(dropped, "dispatcher stopped with tasks still queued");
    } else {
        debug!("dispatcher consumer stopped");
    }
}

/// Counts a unit as running until dropped, including when the consumer is aborted.
struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(running: &'a AtomicUsize) -> Self {
        running.fetch_add(1, Ordering::SeqCst);
        Self(running)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn execute(shared: &Shared, envelope: Envelope) {
    let Envelope { id, work, callback } = envelope;
    trace!(task = %id, "task starting");

    let value = match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(task = %id, error = %e, "task failed");
            None
        }
        Err(e) => {
            error!(task = %id, error = %e, "task panicked");
            None
        }
    };
    shared.results.record(id.clone(), value.clone());

    if let (Some(callback), Some(value)) = (callback, value) {
        let ran = tokio::task::spawn_blocking(move || callback(&value)).await;
        if let Err(e) = ran {
            error!(task = %id, error = %e, "task callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_work_and_records_result() {
        let d = Dispatcher::spawn();
        let id = d.submit(|| Ok(Value::from(42)));

        assert_eq!(d.wait_result(id.as_str(), WAIT).await, Some(Value::from(42)));
        assert_eq!(d.result(id.as_str()), Some(Value::from(42)));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn executes_in_submission_order_one_at_a_time() {
        let d = Dispatcher::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        for i in 0..8 {
            let log = Arc::clone(&log);
            let busy = Arc::clone(&busy);
            let overlapped = Arc::clone(&overlapped);
            d.submit_with_id(format!("job-{i}"), move || {
                if busy.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(5));
                log.lock().unwrap().push(i);
                busy.store(false, Ordering::SeqCst);
                Ok(Value::Null)
            });
        }

        d.wait_result("job-7", WAIT).await;
        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
        assert!(!overlapped.load(Ordering::SeqCst));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_is_absent_and_consumer_survives() {
        let d = Dispatcher::spawn();
        d.submit_with_id("bad", || Err(anyhow::anyhow!("boom")));
        d.submit_with_id("panics", || panic!("kaboom"));
        d.submit_with_id("good", || Ok(Value::from("ok")));

        assert_eq!(d.wait_result("good", WAIT).await, Some(Value::from("ok")));
        assert_eq!(d.result("bad"), None);
        assert_eq!(d.result("panics"), None);
        assert_eq!(d.shared.results.lookup("bad"), Some(None));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callback_receives_value() {
        let d = Dispatcher::spawn();
        let (tx, rx) = tokio::sync::oneshot::channel();
        d.submit_with_callback(
            Some(TaskId::from("cb")),
            || Ok(Value::from(7)),
            move |v| {
                let _ = tx.send(v.clone());
            },
        );

        let got = tokio::time::timeout(Duration::from_secs(5), rx).await;
        assert_eq!(got.unwrap().unwrap(), Value::from(7));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn same_id_is_overwritten_by_later_submission() {
        let d = Dispatcher::spawn();
        d.submit_with_id("dup", || Ok(Value::from(1)));
        d.submit_with_id("dup", || Ok(Value::from(2)));
        d.submit_with_id("marker", || Ok(Value::Null));

        d.wait_result("marker", WAIT).await;
        assert_eq!(d.result("dup"), Some(Value::from(2)));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_waiting_lookup_returns_immediately() {
        let d = Dispatcher::spawn();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        d.submit_with_id("blocker", move || {
            let _ = gate.recv_timeout(Duration::from_secs(5));
            Ok(Value::Null)
        });
        let id = d.submit(|| Ok(Value::from(1)));

        assert_eq!(d.result(id.as_str()), None);
        assert_eq!(
            d.wait_result(id.as_str(), Some(Duration::from_millis(50))).await,
            None
        );

        release.send(()).unwrap();
        assert_eq!(d.wait_result(id.as_str(), WAIT).await, Some(Value::from(1)));
        d.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_discards_queue_and_refuses_new_work() {
        let d = Dispatcher::spawn();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        d.submit_with_id("blocker", move || {
            let _ = gate.recv_timeout(Duration::from_secs(5));
            Ok(Value::Null)
        });
        for i in 0..3 {
            d.submit_with_id(format!("queued-{i}"), || Ok(Value::Null));
        }
        while !d.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let stopper = d.clone();
        let stop = tokio::spawn(async move { stopper.shutdown().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = release.send(());
        stop.await.unwrap();

        assert!(d.is_shut_down());
        assert_eq!(d.result("queued-2"), None);

        let late = d.submit(|| Ok(Value::from(1)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(d.result(late.as_str()), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn aborted_shutdown_clears_running() {
        let d = Dispatcher::spawn();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        d.submit_with_id("stuck", move || {
            let _ = gate.recv_timeout(SHUTDOWN_GRACE * 3);
            Ok(Value::Null)
        });
        while !d.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        d.shutdown().await;
        assert!(d.is_shut_down());
        assert!(!d.is_running());
        assert_eq!(d.result("stuck"), None);
        let _ = release.send(());
    }
}
