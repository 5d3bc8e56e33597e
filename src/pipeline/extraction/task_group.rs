//! Structured concurrency for page extraction.
//!
//! A `TaskGroup` owns a set of spawned tasks, each under its own timeout, and
//! hands back their outcomes in completion order until a group deadline.
//! Tasks still running when the deadline passes, or when the group is
//! dropped, are aborted.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use super::ExtractionError;

/// How a single task ended. A task that overran its timeout is `Failed`
/// with `ExtractionError::Timeout`.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(ExtractionError),
}

/// Outcome of the task spawned under `key`.
#[derive(Debug)]
pub struct Settled<T> {
    pub key: usize,
    pub outcome: TaskOutcome<T>,
}

#[derive(Debug)]
pub enum GroupEvent<T> {
    Settled(Settled<T>),
    /// The group deadline passed; `abandoned` tasks were aborted.
    DeadlineElapsed { abandoned: usize },
    /// Every task has been collected.
    Exhausted,
}

pub struct TaskGroup<T> {
    tasks: JoinSet<(usize, TaskOutcome<T>)>,
    task_timeout: Duration,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(task_timeout: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            task_timeout,
        }
    }

    /// Spawn `future` under this group's per-task timeout.
    pub fn spawn<F>(&mut self, key: usize, future: F)
    where
        F: Future<Output = Result<T, ExtractionError>> + Send + 'static,
    {
        let timeout = self.task_timeout;
        self.tasks.spawn(async move {
            let outcome = match tokio::time::timeout(timeout, future).await {
                Ok(Ok(value)) => TaskOutcome::Completed(value),
                Ok(Err(e)) => TaskOutcome::Failed(e),
                Err(_) => TaskOutcome::Failed(ExtractionError::Timeout {
                    page: key,
                    secs: timeout.as_secs(),
                }),
            };
            (key, outcome)
        });
    }

    /// Wait for the next task to settle, or for `deadline`.
    ///
    /// A task that panicked or was cancelled outside the group surfaces as
    /// `ExtractionError::TaskFailed`; the remaining tasks keep running.
    pub async fn next_until(&mut self, deadline: Instant) -> Result<GroupEvent<T>, ExtractionError> {
        if self.tasks.is_empty() {
            return Ok(GroupEvent::Exhausted);
        }

        match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
            Err(_) => {
                let abandoned = self.tasks.len();
                self.tasks.abort_all();
                Ok(GroupEvent::DeadlineElapsed { abandoned })
            }
            Ok(None) => Ok(GroupEvent::Exhausted),
            Ok(Some(Ok((key, outcome)))) => Ok(GroupEvent::Settled(Settled { key, outcome })),
            Ok(Some(Err(join_error))) => Err(ExtractionError::TaskFailed(join_error.to_string())),
        }
    }
}
