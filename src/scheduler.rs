//! Delayed one-shot jobs.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

/// A job run once by the scheduler.
pub type Job = BoxFuture<'static, ()>;

/// Fire-and-forget delayed execution.
pub trait JobScheduler: Send + Sync {
    /// Run `job` once after `delay`. Jobs cannot be cancelled and are not
    /// retried; a job reports its own failures.
    fn delayed_job(&self, job: Job, delay: Duration);
}

/// Scheduler backed by tokio tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Spawn `job` after `delay`, returning the task handle.
    pub fn spawn_delayed(job: Job, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        })
    }
}

impl JobScheduler for TokioScheduler {
    fn delayed_job(&self, job: Job, delay: Duration) {
        debug!(delay_secs = delay.as_secs(), "Scheduling delayed job");
        let _handle = Self::spawn_delayed(job, delay);
    }
}

/// Captures delayed jobs so tests can run them on demand.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ManualScheduler {
    jobs: std::sync::Mutex<Vec<(Job, Duration)>>,
}

#[cfg(test)]
impl ManualScheduler {
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.jobs.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub(crate) async fn run_all(&self) {
        let jobs: Vec<(Job, Duration)> = self.jobs.lock().unwrap().drain(..).collect();
        for (job, _) in jobs {
            job.await;
        }
    }
}

#[cfg(test)]
impl JobScheduler for ManualScheduler {
    fn delayed_job(&self, job: Job, delay: Duration) {
        self.jobs.lock().unwrap().push((job, delay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn delayed_job_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = TokioScheduler::spawn_delayed(
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
        );

        assert!(!ran.load(Ordering::SeqCst));
        handle.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
