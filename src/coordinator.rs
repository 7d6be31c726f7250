//! Bounded worker pool with order-preserving results.
//!
//! Jobs go through a FIFO channel, so items are started in input order: the
//! ordered confirmation queue depends on that (the lowest unsettled item is
//! always already running). Results are slotted back by index.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use thiserror::Error;

use crate::throttle::{Pace, Throttle};

/// Per-item failure captured by the pool. Sibling items are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker produced no result")]
    Lost,
}

#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    max_workers: usize,
}

impl Coordinator {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Run `worker(index, item)` for every item on at most `max_workers` threads.
    /// The output has one entry per input, in input order.
    pub fn run<T, R, E, F>(&self, items: Vec<T>, worker: F) -> Vec<Result<R, WorkerError>>
    where
        T: Send,
        R: Send,
        E: Display,
        F: Fn(usize, T) -> Result<R, E> + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.max_workers.min(total);

        let (job_tx, job_rx) = bounded::<(usize, T)>(workers);
        let (out_tx, out_rx) = unbounded::<(usize, Result<R, WorkerError>)>();

        thread::scope(|s| {
            for _ in 0..workers {
                let rx = job_rx.clone();
                let tx = out_tx.clone();
                let worker = &worker;
                s.spawn(move || worker_loop::<T, R, E, F>(rx, tx, worker));
            }
            drop(job_rx);
            drop(out_tx); // collector finishes when workers close

            for job in items.into_iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);

            let mut slots: Vec<Option<Result<R, WorkerError>>> = (0..total).map(|_| None).collect();
            for (index, result) in out_rx.iter() {
                slots[index] = Some(result);
            }

            slots
                .into_iter()
                .map(|slot| slot.unwrap_or(Err(WorkerError::Lost)))
                .collect()
        })
    }

    /// Like `run`, but every invocation starts holding a `throttle` slot.
    /// Workers that send more than one request wait on the pace again.
    pub fn run_throttled<T, R, E, F>(
        &self,
        items: Vec<T>,
        throttle: &Throttle,
        worker: F,
    ) -> Vec<Result<R, WorkerError>>
    where
        T: Send,
        R: Send,
        E: Display,
        F: Fn(usize, T, &mut Pace<'_>) -> Result<R, E> + Sync,
    {
        self.run(items, |index, item| {
            let mut pace = throttle.pace();
            pace.hold();
            worker(index, item, &mut pace)
        })
    }
}

fn worker_loop<T, R, E, F>(rx: Receiver<(usize, T)>, tx: Sender<(usize, Result<R, WorkerError>)>, worker: &F)
where
    E: Display,
    F: Fn(usize, T) -> Result<R, E>,
{
    while let Ok((index, item)) = rx.recv() {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| worker(index, item))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WorkerError::Failed(e.to_string())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(index, "Worker panicked: {}", message);
                Err(WorkerError::Panicked(message))
            }
        };
        if tx.send((index, result)).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
