/*
 * Created on Sat Nov 08 2025
 *
 * This file is a part of Strata
 * Strata is a free and open-source versioned in-memory dataset engine that
 * lets a producer publish whole datasets as compact snapshots and deltas
 * while consumers follow the version chain with strongly-typed reads.
 *
 * Copyright (c) 2025, the Strata developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

#![deny(unused_crate_dependencies)]
#![deny(unused_imports)]

//! # Fanout
//!
//! A [`FanoutPool`] is a bounded work-stealing pool used wherever the engine
//! needs to run one unit of work per type-state and wait for all of them.
//! Unlike a fire-and-forget pool, every dispatch here is a barrier: the
//! calling thread blocks until every submitted unit has completed, and the
//! first unit that fails decides the outcome of the whole dispatch.

use {
    std::sync::Mutex,
    std::{fmt, panic::AssertUnwindSafe},
};

/// The error surfaced when one of the fanned-out units fails
#[derive(Debug)]
pub struct UnitFailure {
    cause: String,
}

impl UnitFailure {
    fn new(cause: String) -> Self {
        Self { cause }
    }
    pub fn cause(&self) -> &str {
        &self.cause
    }
    pub fn into_cause(self) -> String {
        self.cause
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fanout unit failed: {}", self.cause)
    }
}

impl std::error::Error for UnitFailure {}

/// # FanoutPool
///
/// A thin, long-lived wrapper over a work-stealing thread pool. Construct one
/// per engine and reuse it for every cycle; worker threads outlive individual
/// dispatches.
///
/// ## Barrier semantics
///
/// [`FanoutPool::run_all`] submits one closure per unit and parks the caller
/// until all of them have run to completion. If any unit returns an error (or
/// panics), the first such failure is captured and returned once the barrier
/// is crossed; the remaining units still run to completion so that no unit is
/// ever silently abandoned mid-flight.
pub struct FanoutPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl FanoutPool {
    /// Create a pool with an explicit worker count
    ///
    /// ## Panics
    ///
    /// Panics if `workers` is zero
    pub fn new(workers: usize) -> Self {
        assert_ne!(workers, 0, "bad value `0` for fanout worker count");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fanout-worker-{i}"))
            .build()
            .expect("failed to spawn fanout workers");
        log::trace!("initialized fanout pool with {workers} workers");
        Self { pool, workers }
    }
    /// Create a pool sized to the machine (one worker per logical CPU)
    pub fn new_default_threads() -> Self {
        Self::new(num_cpus::get())
    }
    pub fn worker_count(&self) -> usize {
        self.workers
    }
}

impl FanoutPool {
    /// Run every unit to completion, returning the first failure (if any)
    ///
    /// The units are scheduled on the pool's workers and stolen freely
    /// between them; the calling thread blocks until the last unit finishes.
    pub fn run_all<'s, U, F>(&self, units: U) -> Result<(), UnitFailure>
    where
        U: IntoIterator<Item = F> + Send,
        F: FnOnce() -> Result<(), String> + Send + 's,
    {
        let first_failure: Mutex<Option<String>> = Mutex::new(None);
        self.pool.scope(|scope| {
            for unit in units {
                let first_failure = &first_failure;
                scope.spawn(move |_| {
                    let outcome =
                        match std::panic::catch_unwind(AssertUnwindSafe(unit)) {
                            Ok(r) => r,
                            Err(payload) => Err(panic_message(payload)),
                        };
                    if let Err(cause) = outcome {
                        let mut slot = first_failure.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(cause);
                        }
                    }
                });
            }
        });
        match first_failure.into_inner().unwrap() {
            Some(cause) => {
                log::error!("fanout dispatch failed: {cause}");
                Err(UnitFailure::new(cause))
            }
            None => Ok(()),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::FanoutPool,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn barrier_waits_for_every_unit() {
        let pool = FanoutPool::new(4);
        let done = AtomicUsize::new(0);
        pool.run_all((0..64).map(|_| {
            || -> Result<(), String> {
                done.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }))
        .unwrap();
        assert_eq!(done.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn first_failure_wins_but_all_units_run() {
        let pool = FanoutPool::new(2);
        let done = AtomicUsize::new(0);
        let outcome = pool.run_all((0..16).map(|i| {
            let done = &done;
            move || -> Result<(), String> {
                done.fetch_add(1, Ordering::Relaxed);
                if i % 2 == 0 {
                    Err(format!("unit {i} refused"))
                } else {
                    Ok(())
                }
            }
        }));
        assert_eq!(done.load(Ordering::Relaxed), 16);
        assert!(outcome.unwrap_err().cause().contains("refused"));
    }

    #[test]
    fn panicking_unit_is_reported_as_failure() {
        let pool = FanoutPool::new(2);
        let outcome = pool.run_all([
            (|| Ok(())) as fn() -> Result<(), String>,
            || panic!("boom"),
        ]);
        assert!(outcome.unwrap_err().cause().contains("boom"));
    }

    #[test]
    fn empty_dispatch_is_a_noop() {
        let pool = FanoutPool::new(1);
        pool.run_all(std::iter::empty::<fn() -> Result<(), String>>())
            .unwrap();
    }
}
