//! Recurring background jobs.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

struct Job {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Named periodic tasks, independent of each other and of the write lock.
///
/// Every job runs its first tick immediately. Jobs are aborted on
/// [`BackgroundJobs::shutdown`] or when this value is dropped.
#[derive(Default)]
pub struct BackgroundJobs {
    jobs: Vec<Job>,
}

impl BackgroundJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period` until shutdown. A tick that overruns delays
    /// the next one instead of bunching them up.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        tracing::debug!("Started background job {name} every {period:?}");
        self.jobs.push(Job { name, handle });
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Abort every job.
    pub fn shutdown(&mut self) {
        for job in self.jobs.drain(..) {
            tracing::debug!("Stopping background job {}", job.name);
            job.handle.abort();
        }
    }
}

impl Drop for BackgroundJobs {
    fn drop(&mut self) {
        self.shutdown();
    }
}
