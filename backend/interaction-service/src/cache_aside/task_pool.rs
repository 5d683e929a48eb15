/// Bounded background task pool
///
/// Cache maintenance and counter propagation run here instead of on the
/// request path.
///
/// Architecture:
/// - Bounded MPSC channel; `submit` never waits for capacity
/// - Fixed number of workers draining the channel
/// - Each task runs on its own tokio task, so a panic is contained and a
///   cancelled request never aborts work it already handed off
/// - `wait_idle` and `shutdown` for tests and graceful shutdown
use futures::future::BoxFuture;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static METRICS: OnceLock<TaskPoolMetrics> = OnceLock::new();

struct TaskPoolMetrics {
    submitted: IntCounterVec,
    rejected: IntCounterVec,
    failed: IntCounterVec,
    in_flight: IntGauge,
}

impl TaskPoolMetrics {
    fn new() -> Self {
        Self {
            submitted: IntCounterVec::new(
                Opts::new(
                    "background_tasks_submitted_total",
                    "Background tasks accepted by the task pool",
                ),
                &["task"],
            )
            .expect("valid metric definition"),
            rejected: IntCounterVec::new(
                Opts::new(
                    "background_tasks_rejected_total",
                    "Background tasks dropped because the queue was full or closed",
                ),
                &["task"],
            )
            .expect("valid metric definition"),
            failed: IntCounterVec::new(
                Opts::new(
                    "background_tasks_panicked_total",
                    "Background tasks that panicked",
                ),
                &["task"],
            )
            .expect("valid metric definition"),
            in_flight: IntGauge::new(
                "background_tasks_in_flight",
                "Accepted background tasks not yet finished",
            )
            .expect("valid metric definition"),
        }
    }
}

fn metrics() -> &'static TaskPoolMetrics {
    METRICS.get_or_init(TaskPoolMetrics::new)
}

/// Register task pool metrics with a Prometheus registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    let m = metrics();
    registry.register(Box::new(m.submitted.clone()))?;
    registry.register(Box::new(m.rejected.clone()))?;
    registry.register(Box::new(m.failed.clone()))?;
    registry.register(Box::new(m.in_flight.clone()))?;
    Ok(())
}

struct Job {
    label: &'static str,
    task: BoxFuture<'static, ()>,
}

struct Shared {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        metrics().in_flight.dec();
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the pool; cheap to clone.
#[derive(Clone)]
pub struct TaskPool {
    shared: Arc<Shared>,
}

impl TaskPool {
    /// Start `workers` workers draining a queue of `capacity` tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(workers)),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker_id| spawn_worker(worker_id, receiver.clone(), shared.clone()))
            .collect();
        shared
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);

        info!(workers, capacity, "Background task pool started");
        Self { shared }
    }

    /// Queue a task without waiting.
    ///
    /// Returns false when the task was rejected (queue full or pool shut down).
    /// Rejected tasks are dropped; callers treat them like a failed task.
    pub fn submit<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = match self
            .shared
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            Some(sender) => sender.clone(),
            None => {
                warn!(task = label, "Task pool is shut down, background task dropped");
                metrics().rejected.with_label_values(&[label]).inc();
                return false;
            }
        };

        // Count before sending so wait_idle never misses a queued task
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        metrics().in_flight.inc();

        match sender.try_send(Job {
            label,
            task: Box::pin(task),
        }) {
            Ok(()) => {
                metrics().submitted.with_label_values(&[label]).inc();
                true
            }
            Err(err) => {
                self.shared.finish_one();
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                warn!(task = label, reason, "Background task rejected");
                metrics().rejected.with_label_values(&[label]).inc();
                false
            }
        }
    }

    /// Accepted tasks not yet finished.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until every accepted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting tasks, finish everything queued, then stop the workers.
    pub async fn shutdown(&self) {
        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = self
            .shared
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        info!(pending = self.pending(), "Draining background task pool");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task pool worker exited abnormally");
            }
        }
        info!("Background task pool stopped");
    }
}

fn spawn_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(worker_id, "Task pool worker started");

        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(job) = job else {
                break;
            };

            if let Err(e) = tokio::spawn(job.task).await {
                warn!(task = job.label, error = %e, "Background task panicked");
                metrics().failed.with_label_values(&[job.label]).inc();
            }
            shared.finish_one();
        }

        debug!(worker_id, "Task pool worker stopped (channel closed)");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_submitted_tasks() {
        let pool = TaskPool::new(2, 16);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = done.clone();
            assert!(pool.submit("test", async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let pool = TaskPool::new(1, 1);
        let gate = Arc::new(Notify::new());

        // Occupies the only worker
        let blocker = gate.clone();
        assert!(pool.submit("blocker", async move { blocker.notified().await }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fills the queue
        assert!(pool.submit("queued", async {}));
        // Rejected
        assert!(!pool.submit("overflow", async {}));

        gate.notify_one();
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let pool = TaskPool::new(1, 4);
        let ran = Arc::new(AtomicBool::new(false));

        assert!(pool.submit("panics", async { panic!("boom") }));
        let flag = ran.clone();
        assert!(pool.submit("after", async move { flag.store(true, Ordering::SeqCst) }));

        pool.wait_idle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let pool = TaskPool::new(2, 16);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = done.clone();
            pool.submit("slow", async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(!pool.submit("late", async {}));
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_empty() {
        let pool = TaskPool::new(1, 1);
        tokio::time::timeout(Duration::from_millis(100), pool.wait_idle())
            .await
            .expect("idle pool should not block");
    }
}
