//! Background tasks that live alongside the server.
//!
//! A [`BackgroundTask`] is usually a middleware that needs periodic
//! maintenance independent of request traffic (the cookie session sweeper is
//! the in-tree example). [`BackgroundWorker`] drives one task on its own named
//! OS thread:
//!
//! ```text
//! Idle --start()--> Starting --on_start()--> Running --stop()--> Stopping --on_stop()--> Idle
//! ```
//!
//! Transitions are compare-and-swap on an `AtomicU8`, so racing `start` or
//! `stop` calls never run a hook twice.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Lifecycle hooks for periodic maintenance work
pub trait BackgroundTask: Send + Sync {
    /// Thread name suffix and log label
    fn name(&self) -> &str {
        "task"
    }

    /// Period between `on_update` calls
    fn delay(&self) -> Duration;

    /// Called once before the first update
    fn on_start(&self) {}

    /// Called at a fixed rate, first immediately after `on_start`
    fn on_update(&self);

    /// Called once after the last update
    fn on_stop(&self) {}
}

const IDLE: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const STOPPING: u8 = 3;

/// Shortest period a task may run at
const MIN_DELAY: Duration = Duration::from_millis(1);

struct Control {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Runs one [`BackgroundTask`] on a dedicated thread
pub struct BackgroundWorker {
    task: Arc<dyn BackgroundTask>,
    state: AtomicU8,
    control: Mutex<Option<Control>>,
}

impl BackgroundWorker {
    pub fn new(task: Arc<dyn BackgroundTask>) -> Self {
        Self {
            task,
            state: AtomicU8::new(IDLE),
            control: Mutex::new(None),
        }
    }

    /// Start the schedule
    ///
    /// Returns `Ok(false)` without side effects when the worker is already
    /// starting or running.
    ///
    /// # Errors
    ///
    /// The OS refused to spawn the timer thread. `on_stop` is still called so
    /// the task can undo `on_start`, and the worker returns to idle.
    pub fn start(&self) -> io::Result<bool> {
        if self
            .state
            .compare_exchange(IDLE, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(task = self.task.name(), "Worker already active, start ignored");
            return Ok(false);
        }

        self.task.on_start();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let task = Arc::clone(&self.task);
        let spawned = thread::Builder::new()
            .name(format!("strata-worker-{}", self.task.name()))
            .spawn(move || {
                let delay = task.delay().max(MIN_DELAY);
                let mut next = Instant::now();
                loop {
                    task.on_update();
                    next += delay;
                    let now = Instant::now();
                    // Behind schedule: run again now rather than in a burst
                    if next < now {
                        next = now;
                    }
                    match stop_rx.recv_timeout(next - now) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        match spawned {
            Ok(thread) => {
                *self.control.lock() = Some(Control { stop_tx, thread });
                self.state.store(RUNNING, Ordering::Release);
                info!(
                    task = self.task.name(),
                    delay = ?self.task.delay(),
                    "Background worker started"
                );
                Ok(true)
            }
            Err(err) => {
                error!(task = self.task.name(), error = %err, "Failed to spawn worker thread");
                self.task.on_stop();
                self.state.store(IDLE, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Cancel the schedule, wait for the thread, then run `on_stop`
    ///
    /// Returns `false` (and calls nothing) when the worker is not running,
    /// including when it was never started. A stop that arrives while
    /// `start` is still in `on_start` waits for the start to finish and then
    /// stops the worker.
    pub fn stop(&self) -> bool {
        loop {
            match self.state.compare_exchange(
                RUNNING,
                STOPPING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(STARTING) => thread::yield_now(),
                Err(_) => return false,
            }
        }

        if let Some(Control { stop_tx, thread }) = self.control.lock().take() {
            if stop_tx.send(()).is_err() {
                debug!(task = self.task.name(), "Worker thread already exited");
            }
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                error!(task = self.task.name(), "Worker thread panicked");
            }
        }

        self.task.on_stop();
        self.state.store(IDLE, Ordering::Release);
        info!(task = self.task.name(), "Background worker stopped");
        true
    }

    /// True while the update schedule is live
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    #[must_use]
    pub fn task(&self) -> &Arc<dyn BackgroundTask> {
        &self.task
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("task", &self.task.name())
            .field("active", &self.is_active())
            .finish()
    }
}

/// The workers registered on an app, started and stopped together
#[derive(Debug, Default)]
pub struct WorkerGroup {
    workers: Vec<BackgroundWorker>,
}

impl WorkerGroup {
    pub fn push(&mut self, worker: BackgroundWorker) {
        self.workers.push(worker);
    }

    pub fn extend(&mut self, other: WorkerGroup) {
        let mut other = other;
        self.workers.append(&mut other.workers);
    }

    /// Start every worker in registration order
    ///
    /// # Errors
    ///
    /// Stops the workers already started and returns the spawn error.
    pub fn start_all(&self) -> io::Result<()> {
        for (idx, worker) in self.workers.iter().enumerate() {
            if let Err(err) = worker.start() {
                for started in &self.workers[..idx] {
                    started.stop();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stop every worker in reverse registration order
    pub fn stop_all(&self) {
        for worker in self.workers.iter().rev() {
            worker.stop();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundWorker> {
        self.workers.iter()
    }
}
