use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub(crate) type Callback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct JobHandle {
  pub(crate) id: uuid::Uuid,
}

#[derive(Debug, Error)]
pub(crate) enum ScheduleError {
  #[error("Job interval must be positive")]
  ZeroInterval,

  #[error("Scheduler was cancelled")]
  Cancelled,
}

/// Fires callbacks at fixed intervals.
#[async_trait::async_trait]
pub(crate) trait Scheduler: Send + Sync {
  async fn add_interval_job(
    &self,
    callback: Callback,
    interval: std::time::Duration,
    run_immediately: bool,
  ) -> Result<JobHandle, ScheduleError>;
}

/// [`Scheduler`] running every job on its own tokio interval.
///
/// Each tick spawns the callback. A tick that fires while the previous run of
/// the same job is still in flight is skipped.
#[derive(Clone, Debug, Default)]
pub(crate) struct Interval {
  token: CancellationToken,
  jobs: Arc<Mutex<HashMap<uuid::Uuid, tokio::task::JoinHandle<()>>>>,
}

impl Interval {
  pub(crate) async fn len(&self) -> usize {
    self.jobs.lock().await.len()
  }

  #[tracing::instrument(skip(self))]
  pub(crate) async fn cancel(&self) {
    self.token.cancel();

    let jobs = {
      let mut jobs = self.jobs.lock().await;
      jobs.drain().collect::<Vec<_>>()
    };

    for (id, join) in jobs {
      if let Err(error) = join.await {
        tracing::error! {
          %error,
          %id,
          "Joining job handle on cancel failed"
        }
      }
    }
  }
}

#[async_trait::async_trait]
impl Scheduler for Interval {
  async fn add_interval_job(
    &self,
    callback: Callback,
    interval: std::time::Duration,
    run_immediately: bool,
  ) -> Result<JobHandle, ScheduleError> {
    if interval.is_zero() {
      return Err(ScheduleError::ZeroInterval);
    }
    if self.token.is_cancelled() {
      return Err(ScheduleError::Cancelled);
    }

    let id = uuid::Uuid::new_v4();
    let child_token = self.token.child_token();
    let join = tokio::spawn(async move {
      let start = if run_immediately {
        tokio::time::Instant::now()
      } else {
        tokio::time::Instant::now() + interval
      };
      let mut interval = tokio::time::interval_at(start, interval);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      let running = Arc::new(AtomicBool::new(false));
      loop {
        tokio::select! {
          _ = child_token.cancelled() => { return; },
          _ = interval.tick() => {
            match InFlight::acquire(&running) {
              Some(in_flight) => {
                let tick = callback();
                let tick_token = child_token.clone();
                tokio::spawn(async move {
                  let _in_flight = in_flight;
                  tokio::select! {
                    _ = tick_token.cancelled() => { },
                    _ = tick => { },
                  }
                });
              }
              None => {
                tracing::debug!(%id, "Previous run still in flight - skipping tick");
              }
            }
          }
        }
      }
    });

    self.jobs.lock().await.insert(id, join);
    tracing::trace!(%id, ?interval, run_immediately, "Added interval job");

    Ok(JobHandle { id })
  }
}

/// Marks one run of a job as in flight until dropped.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
  fn acquire(running: &Arc<AtomicBool>) -> Option<Self> {
    running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(running.clone()))
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}
