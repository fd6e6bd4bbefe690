//! Fan-out coordinator — runs independent series pipelines on a fixed-size
//! worker pool.
//!
//! Each worker thread owns a state slot (its adapters, built on first use)
//! that no other thread touches. Every task runs behind its own boundary:
//! an `Err` becomes an `Error` outcome and a panic becomes a `Panicked`
//! outcome after the worker's state is discarded. Nothing a task does can
//! abort its siblings or the coordinator.

use crate::outcome::{OutcomeStatus, OutcomeSummary, TaskOutcome};
use crate::pipeline::SeriesOutcome;
use marketwalk_core::AcquireError;
use rayon::prelude::*;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, info_span};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("failed to build worker pool: {0}")]
    Build(String),
}

/// Progress callbacks, called from worker threads.
pub trait FanOutProgress: Sync {
    fn on_start(&self, series: &str, index: usize, total: usize);

    fn on_complete(&self, outcome: &TaskOutcome, completed: usize, total: usize);

    fn on_batch_complete(&self, summary: &OutcomeSummary);
}

/// Logs progress through `tracing`.
pub struct LogProgress;

impl FanOutProgress for LogProgress {
    fn on_start(&self, series: &str, index: usize, total: usize) {
        info!(%series, task = index + 1, total, "starting series");
    }

    fn on_complete(&self, outcome: &TaskOutcome, completed: usize, total: usize) {
        outcome.log();
        info!(completed, total, "progress");
    }

    fn on_batch_complete(&self, summary: &OutcomeSummary) {
        summary.log_summary();
    }
}

/// Fixed-size pool of worker threads.
pub struct FanOut {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl FanOut {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("marketwalk-worker-{i}"))
            .build()
            .map_err(|e| PoolError::Build(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` once per task and block until every task has an outcome.
    ///
    /// `init` builds a worker's state the first time that worker picks up a
    /// task (and again after a panic). Outcomes are returned in task order.
    pub fn run<T, S, I, J>(
        &self,
        tasks: &[T],
        init: I,
        job: J,
        progress: &dyn FanOutProgress,
    ) -> Vec<TaskOutcome>
    where
        T: fmt::Display + Sync,
        S: Send,
        I: Fn() -> S + Sync,
        J: Fn(&mut S, &T) -> Result<SeriesOutcome, AcquireError> + Sync,
    {
        let total = tasks.len();
        let slots: Vec<Mutex<Option<S>>> = (0..self.workers).map(|_| Mutex::new(None)).collect();
        let completed = AtomicUsize::new(0);

        let outcomes: Vec<TaskOutcome> = self.pool.install(|| {
            tasks
                .par_iter()
                .enumerate()
                .with_max_len(1)
                .map(|(index, task)| {
                    let label = task.to_string();
                    let span = info_span!("series", series = %label);
                    let _guard = span.enter();
                    progress.on_start(&label, index, total);

                    let worker = rayon::current_thread_index().unwrap_or(0) % slots.len();
                    let mut slot = slots[worker].lock().unwrap_or_else(PoisonError::into_inner);

                    let started = Instant::now();
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        let state = slot.get_or_insert_with(&init);
                        job(state, task)
                    }));
                    let status = match result {
                        Ok(result) => OutcomeStatus::from_result(result),
                        Err(payload) => {
                            *slot = None;
                            OutcomeStatus::Panicked {
                                message: panic_message(payload.as_ref()),
                            }
                        }
                    };
                    drop(slot);

                    let outcome = TaskOutcome {
                        series: label,
                        status,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    };
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.on_complete(&outcome, done, total);
                    outcome
                })
                .collect()
        });

        progress.on_batch_complete(&OutcomeSummary::from_outcomes(&outcomes));
        outcomes
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Progress that only counts callbacks.
    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        completed: AtomicUsize,
        batches: AtomicUsize,
    }

    impl FanOutProgress for Counting {
        fn on_start(&self, _: &str, _: usize, _: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self, _: &TaskOutcome, _: usize, _: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, _: &OutcomeSummary) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ok(n: usize) -> Result<SeriesOutcome, AcquireError> {
        Ok(SeriesOutcome {
            fetched: n,
            saved: n,
            partial: None,
        })
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(FanOut::new(0), Err(PoolError::NoWorkers)));
    }

    #[test]
    fn outcomes_come_back_in_task_order() {
        let fan = FanOut::new(3).unwrap();
        let tasks: Vec<u32> = (0..20).collect();
        let progress = Counting::default();
        let outcomes = fan.run(&tasks, || (), |_, t| ok(*t as usize), &progress);

        let names: Vec<String> = outcomes.iter().map(|o| o.series.clone()).collect();
        let expected: Vec<String> = tasks.iter().map(ToString::to_string).collect();
        assert_eq!(names, expected);
        assert_eq!(outcomes[0].status, OutcomeStatus::NoData);
        assert_eq!(progress.started.load(Ordering::SeqCst), 20);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 20);
        assert_eq!(progress.batches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn state_is_built_at_most_once_per_worker() {
        let fan = FanOut::new(2).unwrap();
        let builds = AtomicUsize::new(0);
        let tasks: Vec<u32> = (1..=16).collect();
        let outcomes = fan.run(
            &tasks,
            || {
                builds.fetch_add(1, Ordering::SeqCst);
                0usize
            },
            |calls, _| {
                *calls += 1;
                ok(1)
            },
            &LogProgress,
        );
        assert_eq!(outcomes.len(), 16);
        assert!(builds.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn errors_and_panics_are_contained() {
        let fan = FanOut::new(2).unwrap();
        let tasks = vec!["good", "bad", "boom", "also-good"];
        let outcomes = fan.run(
            &tasks,
            || (),
            |_, t| match *t {
                "bad" => Err(AcquireError::Config("exchange not recognized".into())),
                "boom" => panic!("driver crashed"),
                _ => ok(5),
            },
            &LogProgress,
        );

        assert!(matches!(outcomes[0].status, OutcomeStatus::Success { records: 5, .. }));
        assert!(matches!(outcomes[1].status, OutcomeStatus::Error { .. }));
        assert_eq!(
            outcomes[2].status,
            OutcomeStatus::Panicked {
                message: "driver crashed".into()
            }
        );
        assert!(matches!(outcomes[3].status, OutcomeStatus::Success { .. }));
    }

    #[test]
    fn worker_state_is_rebuilt_after_a_panic() {
        let fan = FanOut::new(1).unwrap();
        let builds = AtomicUsize::new(0);
        let tasks = vec![1, 2, 3];
        fan.run(
            &tasks,
            || {
                builds.fetch_add(1, Ordering::SeqCst);
            },
            |_, t| {
                if *t == 2 {
                    panic!("task 2");
                }
                ok(1)
            },
            &LogProgress,
        );
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}
