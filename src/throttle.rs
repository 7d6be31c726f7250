//! Per-service request spacing.
//!
//! One `Throttle` exists per outbound service and is shared by reference
//! between all workers talking to that service. Services never share a
//! throttle, so scraping does not slow down catalog searches.
//!
//! Clients that send several requests for one logical call (pagination,
//! token refresh, batched writes) take a `Pace` and wait on it before each
//! request.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Throttle {
    name: &'static str,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(name: &'static str, min_interval: Duration) -> Self {
        Self {
            name,
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Block until this caller may issue its request.
    ///
    /// The slot is reserved under the lock and the sleep happens outside it,
    /// so concurrent callers queue up at `min_interval` spacing instead of
    /// serializing on the mutex for the whole wait.
    pub fn wait(&self) {
        let slot = {
            let mut next = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            let wait_time = slot - now;
            tracing::trace!(service = self.name, "Rate limiting: waiting {:?}", wait_time);
            thread::sleep(wait_time);
        }
    }

    pub fn pace(&self) -> Pace<'_> {
        Pace {
            throttle: self,
            held: false,
        }
    }
}

/// Slot bookkeeping for one call that may send several requests.
#[derive(Debug)]
pub struct Pace<'a> {
    throttle: &'a Throttle,
    held: bool,
}

impl Pace<'_> {
    /// Wait for a slot now and keep it for the next request. Lets a caller
    /// check for cancellation between the wait and the request.
    pub fn hold(&mut self) {
        if !self.held {
            self.throttle.wait();
            self.held = true;
        }
    }

    /// Call right before sending a request: spends the held slot or waits
    /// for a new one.
    pub fn wait(&mut self) {
        if self.held {
            self.held = false;
        } else {
            self.throttle.wait();
        }
    }
}
