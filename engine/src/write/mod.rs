/*
 * Created on Mon Dec 15 2025
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

//! The write-side state engine. Owns one [`TypeWriteState`] per registered
//! type and drives them through the cycle state machine:
//!
//! ```text
//!          add / add_all_objects_from_previous_cycle
//!        +------------------+   prepare_for_write   +---------+
//!        |  AddingRecords   | --------------------> | Writing |
//!        +------------------+ <-------------------- +---------+
//!                              prepare_for_next_cycle
//! ```
//!
//! Cross-type fan-outs run on the engine's fanout pool and block on barrier
//! completion; the first failing unit aborts the cycle.

mod typestate;

pub use typestate::{TypeWriteState, EMPTY_ORDINAL};

use {
    crate::{
        error::{EngineError, EngineResult},
        hash::HashCodeFinder,
        read::ReadStateEngine,
        record::WriteRecord,
        schema::Schema,
        HEADER_TAG_HASH_CODES_DEFINED,
    },
    libfanout::FanoutPool,
    parking_lot::{Mutex, RwLock},
    std::{
        collections::{BTreeMap, HashMap},
        sync::{
            atomic::{AtomicU64, AtomicU8, Ordering},
            Arc,
        },
        time::Instant,
    },
};

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CyclePhase {
    AddingRecords = 0,
    Writing = 1,
}

impl CyclePhase {
    const fn dscr(&self) -> u8 {
        *self as u8
    }
    fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::AddingRecords
        } else {
            Self::Writing
        }
    }
}

/// The write-side state engine
pub struct WriteStateEngine {
    ordered: RwLock<Vec<Arc<TypeWriteState>>>,
    by_name: RwLock<HashMap<Box<str>, Arc<TypeWriteState>>>,
    finder: Arc<HashCodeFinder>,
    pool: FanoutPool,
    phase: AtomicU8,
    previous_tag: AtomicU64,
    next_tag: AtomicU64,
    header_tags: Mutex<BTreeMap<String, String>>,
    restored: Mutex<Vec<Box<str>>>,
}

impl WriteStateEngine {
    pub fn new() -> Self {
        Self::with_hasher(HashCodeFinder::new())
    }
    /// An engine whose record identity uses the given finder
    pub fn with_hasher(finder: HashCodeFinder) -> Self {
        let initial = fresh_tag(&[]);
        Self {
            ordered: RwLock::new(Vec::new()),
            by_name: RwLock::new(HashMap::new()),
            finder: Arc::new(finder),
            pool: FanoutPool::new_default_threads(),
            phase: AtomicU8::new(CyclePhase::AddingRecords.dscr()),
            previous_tag: AtomicU64::new(initial),
            next_tag: AtomicU64::new(fresh_tag(&[initial])),
            header_tags: Mutex::new(BTreeMap::new()),
            restored: Mutex::new(Vec::new()),
        }
    }
    pub fn hash_code_finder(&self) -> &HashCodeFinder {
        &self.finder
    }
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_raw(self.phase.load(Ordering::Acquire))
    }
    /// True iff the engine is accepting records (i.e. the last transition was
    /// `prepare_for_next_cycle` or the engine is brand new)
    pub fn is_prepared_for_next_cycle(&self) -> bool {
        self.phase() == CyclePhase::AddingRecords
    }
}

// registration
impl WriteStateEngine {
    /// Register a type-state; one registration per type, before its first
    /// record
    pub fn add_type_state(&self, state: TypeWriteState) -> EngineResult<()> {
        let name: Box<str> = state.name().into();
        let state = Arc::new(state);
        let mut by_name = self.by_name.write();
        if by_name.contains_key(&name) {
            return Err(EngineError::DuplicateType(name));
        }
        by_name.insert(name, state.clone());
        self.ordered.write().push(state);
        Ok(())
    }
    /// Shorthand: construct and register a type-state for `schema`
    pub fn register(&self, schema: Schema) -> EngineResult<()> {
        self.add_type_state(TypeWriteState::new(schema))
    }
    /// Type-states in registration order (the order sub-blobs are written)
    pub fn ordered_type_states(&self) -> Vec<Arc<TypeWriteState>> {
        self.ordered.read().clone()
    }
    pub fn get_type_state(&self, name: &str) -> Option<Arc<TypeWriteState>> {
        self.by_name.read().get(name).cloned()
    }
}

// adding
impl WriteStateEngine {
    /// Add one record to the named type's current cycle; callable from many
    /// threads at once during `AddingRecords`
    pub fn add(&self, type_name: &str, record: WriteRecord) -> EngineResult<u32> {
        if self.phase() != CyclePhase::AddingRecords {
            return Err(EngineError::PhaseViolation("add"));
        }
        let state = self
            .get_type_state(type_name)
            .ok_or_else(|| EngineError::UnknownType(type_name.into()))?;
        Ok(state.add(record, &self.finder))
    }
    /// Re-add the whole previous cycle unchanged, across every type
    pub fn add_all_objects_from_previous_cycle(&self) -> EngineResult<()> {
        if self.phase() != CyclePhase::AddingRecords {
            return Err(EngineError::PhaseViolation(
                "add_all_objects_from_previous_cycle",
            ));
        }
        let states = self.ordered_type_states();
        let finder = &self.finder;
        self.pool.run_all(states.iter().map(|state| {
            move || -> Result<(), String> {
                state.add_all_objects_from_previous_cycle(finder);
                Ok(())
            }
        }))?;
        Ok(())
    }
}

// cycle transitions
impl WriteStateEngine {
    /// Compile every type-state for emission and advance to `Writing`.
    /// No-op outside `AddingRecords`.
    pub fn prepare_for_write(&self) -> EngineResult<()> {
        if self.phase() != CyclePhase::AddingRecords {
            return Ok(());
        }
        let start = Instant::now();
        self.add_header_tag(
            HEADER_TAG_HASH_CODES_DEFINED,
            self.finder.non_default_summary(),
        );
        let states = self.ordered_type_states();
        self.pool.run_all(states.iter().map(|state| {
            move || -> Result<(), String> {
                state.prepare_for_write();
                Ok(())
            }
        }))?;
        self.phase
            .store(CyclePhase::Writing.dscr(), Ordering::Release);
        log::info!(
            "prepared {} type-state(s) for write in {:?} ({:#018x} -> {:#018x})",
            states.len(),
            start.elapsed(),
            self.previous_state_randomized_tag(),
            self.next_state_randomized_tag(),
        );
        Ok(())
    }
    /// Rotate the cycle: the just-written state becomes the previous one and
    /// a fresh destination tag is drawn. No-op outside `Writing`.
    pub fn prepare_for_next_cycle(&self) -> EngineResult<()> {
        if self.phase() != CyclePhase::Writing {
            return Ok(());
        }
        let settled = self.next_tag.load(Ordering::Acquire);
        self.previous_tag.store(settled, Ordering::Release);
        self.next_tag
            .store(fresh_tag(&[settled]), Ordering::Release);
        let states = self.ordered_type_states();
        self.pool.run_all(states.iter().map(|state| {
            move || -> Result<(), String> {
                state.prepare_for_next_cycle();
                Ok(())
            }
        }))?;
        self.restored.lock().clear();
        self.phase
            .store(CyclePhase::AddingRecords.dscr(), Ordering::Release);
        log::info!(
            "cycle rotated; next state is {:#018x}",
            self.next_state_randomized_tag()
        );
        Ok(())
    }
    /// Abort the cycle in flight: every type-state returns to the population
    /// it had right after the last `prepare_for_next_cycle`, and the
    /// destination tag is re-rolled so nothing can chain onto the aborted
    /// version. Callable from either phase.
    pub fn reset_to_last_prepare_for_next_cycle(&self) -> EngineResult<()> {
        let states = self.ordered_type_states();
        self.pool.run_all(states.iter().map(|state| {
            move || -> Result<(), String> {
                state.reset_to_last_prepare_for_next_cycle();
                Ok(())
            }
        }))?;
        let stale = self.next_tag.load(Ordering::Acquire);
        self.next_tag.store(
            fresh_tag(&[stale, self.previous_tag.load(Ordering::Acquire)]),
            Ordering::Release,
        );
        self.phase
            .store(CyclePhase::AddingRecords.dscr(), Ordering::Release);
        log::info!("cycle aborted; next state re-rolled to {:#018x}", self.next_state_randomized_tag());
        Ok(())
    }
}

// restore
impl WriteStateEngine {
    /// Import a previously published state so the producer can continue the
    /// delta chain after a restart
    pub fn restore_from(&self, source: &ReadStateEngine) -> EngineResult<()> {
        if self.phase() != CyclePhase::AddingRecords {
            return Err(EngineError::PhaseViolation("restore_from"));
        }
        if !source.is_listening_for_all_populated_ordinals() {
            return Err(EngineError::RestoreRejected);
        }
        let start = Instant::now();
        let states = self.ordered_type_states();
        let transferable: Vec<(Arc<TypeWriteState>, &crate::read::TypeReadState)> = states
            .iter()
            .filter_map(|state| {
                source
                    .get_type_state(state.name())
                    .map(|read_state| (state.clone(), read_state))
            })
            .collect();
        let finder = &self.finder;
        self.pool.run_all(transferable.iter().map(|(state, read_state)| {
            move || -> Result<(), String> {
                state.restore_from(read_state, finder);
                Ok(())
            }
        }))?;
        let mut restored = self.restored.lock();
        restored.clear();
        restored.extend(transferable.iter().map(|(state, _)| Box::from(state.name())));
        self.previous_tag
            .store(source.current_randomized_tag(), Ordering::Release);
        self.next_tag.store(
            fresh_tag(&[source.current_randomized_tag()]),
            Ordering::Release,
        );
        log::info!(
            "restored {} of {} type-state(s) from {:#018x} in {:?}",
            transferable.len(),
            states.len(),
            self.previous_state_randomized_tag(),
            start.elapsed()
        );
        Ok(())
    }
    /// True iff a delta produced now would chain correctly: either the engine
    /// was never restored, or every restored type bound all of its prior
    /// ordinals
    pub fn can_produce_delta(&self) -> bool {
        let restored = self.restored.lock();
        restored.iter().all(|name| {
            self.by_name
                .read()
                .get(name)
                .map(|state| state.is_restored())
                .unwrap_or(false)
        })
    }
}

// queries & tags
impl WriteStateEngine {
    pub fn has_changed_since_last_cycle(&self) -> bool {
        self.ordered
            .read()
            .iter()
            .any(|state| state.has_changed_since_last_cycle())
    }
    pub fn add_header_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.header_tags.lock().insert(key.into(), value.into());
    }
    pub fn header_tags(&self) -> BTreeMap<String, String> {
        self.header_tags.lock().clone()
    }
    pub fn previous_state_randomized_tag(&self) -> u64 {
        self.previous_tag.load(Ordering::Acquire)
    }
    pub fn next_state_randomized_tag(&self) -> u64 {
        self.next_tag.load(Ordering::Acquire)
    }
    /// Force the origin tag of the next emission
    ///
    /// ## Safety
    ///
    /// This bypasses the delta-chain verification that keeps consumers from
    /// applying a delta onto the wrong state. Intended for tests and manual
    /// operational recovery only.
    pub unsafe fn override_previous_state_randomized_tag(&self, tag: u64) {
        self.previous_tag.store(tag, Ordering::Release);
    }
    /// Force the destination tag of the next emission
    ///
    /// ## Safety
    ///
    /// See [`Self::override_previous_state_randomized_tag`].
    pub unsafe fn override_next_state_randomized_tag(&self, tag: u64) {
        self.next_tag.store(tag, Ordering::Release);
    }
}

impl Default for WriteStateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a random 64-bit tag distinct from every tag in `avoid`
fn fresh_tag(avoid: &[u64]) -> u64 {
    loop {
        let tag = rand::random::<u64>();
        if !avoid.contains(&tag) {
            return tag;
        }
    }
}
