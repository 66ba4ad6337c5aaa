//! Single-threaded delayed execution.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::debug;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// Announces a queued job to the timer. `None` never becomes due.
struct Timer {
    seq: u64,
    due: Option<Instant>,
}

struct State {
    /// Jobs that have not started, keyed by submission sequence.
    jobs: BTreeMap<u64, Job>,
    next_seq: u64,
    /// Dropped on shutdown, which stops the timer thread.
    timers: Option<UnboundedSender<Timer>>,
}

struct Shared {
    state: Mutex<State>,
}

/// One timer thread running delayed jobs strictly one at a time.
///
/// A job never starts before its delay elapsed. When several jobs are due,
/// the earliest submitted one runs first.
///
/// The thread drives a current-thread tokio runtime for its timers and runs
/// each job outside of it. Shutting down never waits for a job that is
/// already running.
pub(crate) struct DelayedScheduler {
    shared: Arc<Shared>,
}

impl DelayedScheduler {
    pub(crate) fn start(thread_name: String) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                jobs: BTreeMap::new(),
                next_seq: 0,
                timers: Some(sender),
            }),
        });

        let worker_shared = shared.clone();
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(&runtime, receiver, &worker_shared))?;

        Ok(Self { shared })
    }

    /// Queues `job`; it is dropped unrun if the scheduler was shut down.
    pub(crate) fn submit(&self, delay: Duration, job: Job) {
        let due = Instant::now().checked_add(delay);
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;

        let announced = state
            .timers
            .as_ref()
            .is_some_and(|timers| timers.send(Timer { seq, due }).is_ok());
        if !announced {
            drop(state);
            drop(job);
            return;
        }

        state.next_seq += 1;
        state.jobs.insert(seq, job);
    }

    /// Number of jobs waiting for their delay or for the worker.
    pub(crate) fn pending(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    /// Stops the worker; jobs that never started are dropped.
    pub(crate) fn shutdown(&self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.timers = None;
            std::mem::take(&mut state.jobs)
        };
        if !abandoned.is_empty() {
            debug!(abandoned = abandoned.len(), "Dropping scheduled work on shutdown");
        }
        drop(abandoned);
    }
}

impl Drop for DelayedScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(runtime: &Runtime, mut receiver: UnboundedReceiver<Timer>, shared: &Shared) {
    let mut timers = BTreeMap::new();
    while let Some(job) = runtime.block_on(next_job(&mut timers, &mut receiver, shared)) {
        job();
    }
    debug!("Scheduler thread stopped");
}

/// Waits until the earliest submitted due job can run.
///
/// Returns `None` once the scheduler was shut down.
async fn next_job(
    timers: &mut BTreeMap<u64, Option<Instant>>,
    receiver: &mut UnboundedReceiver<Timer>,
    shared: &Shared,
) -> Option<Job> {
    loop {
        while let Ok(timer) = receiver.try_recv() {
            timers.insert(timer.seq, timer.due);
        }

        let now = Instant::now();
        let ready = timers
            .iter()
            .find(|(_, due)| due.is_some_and(|due| due <= now))
            .map(|(seq, _)| *seq);
        if let Some(seq) = ready {
            timers.remove(&seq);
            match shared.state.lock().jobs.remove(&seq) {
                Some(job) => return Some(job),
                None => continue,
            }
        }

        let next_due = timers.values().flatten().min().copied();
        tokio::select! {
            biased;
            timer = receiver.recv() => match timer {
                Some(timer) => {
                    timers.insert(timer.seq, timer.due);
                }
                None => return None,
            },
            () = sleep_until(next_due) => {}
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
