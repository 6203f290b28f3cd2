use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use cardroom_engine::poker::Phase;
use cardroom_engine::RoomId;

/// Deferred work the tables hand back to themselves.
///
/// Jobs carry enough to detect that the world moved on: the dispatcher
/// re-reads room state under the room lock and drops stale jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum ScheduledJob {
    StartPokerHand {
        room_id: RoomId,
    },
    AdvancePokerStage {
        room_id: RoomId,
        hand_id: String,
        phase: Phase,
    },
    StartBlotHand {
        room_id: RoomId,
    },
}

impl ScheduledJob {
    pub fn room_id(&self) -> RoomId {
        match self {
            ScheduledJob::StartPokerHand { room_id }
            | ScheduledJob::AdvancePokerStage { room_id, .. }
            | ScheduledJob::StartBlotHand { room_id } => *room_id,
        }
    }
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, job: ScheduledJob, delay: Duration);
}

pub type JobReceiver = mpsc::UnboundedReceiver<ScheduledJob>;

/// Delivers jobs into a channel after their delay, using tokio timers.
///
/// Timers run on the runtime given at construction, so jobs can be
/// scheduled from any thread.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<ScheduledJob>,
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, runtime }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, job: ScheduledJob, delay: Duration) {
        tracing::debug!(
            room_id = job.room_id(),
            delay_ms = delay.as_millis() as u64,
            job = ?job,
            "job scheduled"
        );
        if delay.is_zero() {
            if self.tx.send(job).is_err() {
                tracing::warn!("job dispatcher has stopped");
            }
            return;
        }
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(job).is_err() {
                tracing::warn!("job dispatcher has stopped");
            }
        });
    }
}

/// Collects jobs so tests can run them by hand.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    jobs: Mutex<Vec<(ScheduledJob, Duration)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains pending jobs in the order they were scheduled.
    pub fn take_jobs(&self) -> Vec<ScheduledJob> {
        self.take_with_delays().into_iter().map(|(j, _)| j).collect()
    }

    pub fn take_with_delays(&self) -> Vec<(ScheduledJob, Duration)> {
        std::mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn pending(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, job: ScheduledJob, delay: Duration) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job, delay));
    }
}
