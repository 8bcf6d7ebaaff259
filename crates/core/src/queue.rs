//! Bounded job queue with scoped membership.
//!
//! [`JobQueue`] tracks which jobs are admitted and not yet finished. The
//! membership list sits behind a short-held [`std::sync::Mutex`] that is
//! never held across an `.await`. Execution ordering is not decided here;
//! the pipeline's serialization gate does that.
//!
//! Admission hands back a [`QueueTicket`]. Dropping the ticket removes the
//! job, so membership is released on every exit path: success, error,
//! timeout, or the request future being cancelled.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::CoreError;
use crate::types::JobId;

/// Where an admitted job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted and waiting for the serialization gate.
    Admitted,
    /// Holding the gate; the backend is working on it.
    Running,
}

/// A queued job as seen by [`JobQueue::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub state: JobState,
}

#[derive(Debug)]
struct Inner {
    max: usize,
    entries: Mutex<Vec<QueueEntry>>,
}

/// FIFO membership list with a fixed capacity.
///
/// Cheaply cloneable; clones share the same list.
#[derive(Debug, Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max,
                entries: Mutex::new(Vec::with_capacity(max)),
            }),
        }
    }

    /// Configured capacity.
    pub fn max(&self) -> usize {
        self.inner.max
    }

    /// Number of admitted jobs that have not finished.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current entries in admission order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lock().clone()
    }

    /// Admit a job, or reject it with [`CoreError::QueueFull`] when the
    /// queue already holds `max` jobs.
    ///
    /// The length check and the append happen under one lock acquisition.
    pub fn admit(&self, job_id: JobId) -> Result<QueueTicket, CoreError> {
        let mut entries = self.lock();
        if entries.len() >= self.inner.max {
            return Err(CoreError::QueueFull {
                max: self.inner.max,
            });
        }
        entries.push(QueueEntry {
            job_id,
            state: JobState::Admitted,
        });
        Ok(QueueTicket {
            queue: self.clone(),
            job_id,
        })
    }

    fn set_state(&self, job_id: JobId, state: JobState) {
        if let Some(entry) = self.lock().iter_mut().find(|e| e.job_id == job_id) {
            entry.state = state;
        }
    }

    fn remove(&self, job_id: JobId) {
        self.lock().retain(|e| e.job_id != job_id);
    }

    /// Lock the entry list, recovering from poisoning.
    ///
    /// The list is always left consistent between statements, so a panic
    /// in another holder does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, Vec<QueueEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of admission. Removes the job from its queue when dropped.
#[derive(Debug)]
pub struct QueueTicket {
    queue: JobQueue,
    job_id: JobId,
}

impl QueueTicket {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Record that the job now holds the serialization gate.
    pub fn mark_running(&self) {
        self.queue.set_state(self.job_id, JobState::Running);
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.queue.remove(self.job_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
