//! Single-slot background jobs harvested from the flight loop.
//!
//! The flight loop must never block, so each network round-trip runs on its
//! own worker thread and hands its result back over a channel. The owner
//! checks the [`Task`] once per tick. How many tasks may exist at once is the
//! caller's policy.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// Raised by [`Task::cancel`]; jobs may check it between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("worker {label} terminated without a result")]
    Lost { label: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum TaskPoll<T> {
    Running,
    Completed(T),
    Failed(TaskError),
}

/// Handle to one scheduled job.
pub struct Task<T> {
    label:   String,
    rx:      mpsc::Receiver<T>,
    cancel:  CancelToken,
    worker:  JoinHandle<()>,
    started: Instant,
}

/// Run `job` on a named worker thread and return at once.
pub fn schedule<T, F>(label: &str, job: F) -> io::Result<Task<T>>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::default();
    let token = cancel.clone();

    let worker = thread::Builder::new()
        .name(format!("hoppie-{label}"))
        .spawn(move || {
            let result = job(&token);
            // The receiver is gone if the task was dropped; nothing to report.
            let _ = tx.send(result);
        })?;

    debug!(label, "task scheduled");
    Ok(Task { label: label.to_string(), rx, cancel, worker, started: Instant::now() })
}

impl<T> Task<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking check. After `Completed` has been returned once, further
    /// calls report `Failed`.
    pub fn poll(&self) -> TaskPoll<T> {
        match self.rx.try_recv() {
            Ok(result) => TaskPoll::Completed(result),
            Err(TryRecvError::Empty) => TaskPoll::Running,
            Err(TryRecvError::Disconnected) => {
                TaskPoll::Failed(TaskError::Lost { label: self.label.clone() })
            }
        }
    }

    /// Ask the job to stop. Never waits.
    pub fn cancel(&self) {
        debug!(label = %self.label, "task cancelled");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn wait<T>(task: &Task<T>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !task.is_finished() {
            assert!(Instant::now() < deadline, "worker did not finish");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn completes_with_job_result() {
        let task = schedule("add", |_| 40 + 2).unwrap();
        wait(&task);
        assert_eq!(task.poll(), TaskPoll::Completed(42));
        assert!(matches!(task.poll(), TaskPoll::Failed(_)));
    }

    #[test]
    fn reports_label_and_elapsed() {
        let task = schedule("nap", |_| thread::sleep(Duration::from_millis(20))).unwrap();
        wait(&task);
        assert_eq!(task.label(), "nap");
        assert!(task.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn running_until_job_returns() {
        let (release, gate) = sync_channel::<()>(0);
        let task = schedule("gated", move |_| {
            let _ = gate.recv();
            "done"
        })
        .unwrap();

        assert_eq!(task.poll(), TaskPoll::Running);
        assert!(!task.is_finished());
        release.send(()).unwrap();
        wait(&task);
        assert_eq!(task.poll(), TaskPoll::Completed("done"));
    }

    #[test]
    fn panicking_job_is_reported_as_failed() {
        let task: Task<u8> = schedule("boom", |_| panic!("boom")).unwrap();
        wait(&task);
        assert_eq!(task.poll(), TaskPoll::Failed(TaskError::Lost { label: "boom".into() }));
    }

    #[test]
    fn cancel_is_visible_to_job() {
        let (release, gate) = sync_channel::<()>(0);
        let task = schedule("cancel", move |token: &CancelToken| {
            let _ = gate.recv();
            token.is_cancelled()
        })
        .unwrap();

        task.cancel();
        assert!(task.is_cancelled());
        release.send(()).unwrap();
        wait(&task);
        assert_eq!(task.poll(), TaskPoll::Completed(true));
    }
}
