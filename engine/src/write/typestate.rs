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

use {
    crate::{
        codec,
        error::{EngineError, EngineResult},
        hash::HashCodeFinder,
        read::TypeReadState,
        record::WriteRecord,
        schema::Schema,
    },
    bytes::Bytes,
    parking_lot::{Mutex, RwLock},
    std::{
        collections::{BTreeMap, HashMap},
        sync::atomic::{AtomicU32, Ordering},
    },
};

/// The reserved marker for "no record here"
pub const EMPTY_ORDINAL: u32 = u32::MAX;

const SHARD_COUNT: usize = 16;

/// The frozen population of one completed cycle
#[derive(Debug, Default)]
struct Population {
    by_record: HashMap<Bytes, u32>,
    by_ordinal: BTreeMap<u32, Bytes>,
}

impl Population {
    fn len(&self) -> usize {
        self.by_ordinal.len()
    }
    fn max_ordinal(&self) -> Option<u32> {
        self.by_ordinal.keys().next_back().copied()
    }
    fn insert(&mut self, ordinal: u32, record: Bytes) {
        self.by_record.insert(record.clone(), ordinal);
        self.by_ordinal.insert(ordinal, record);
    }
}

/// The payload plans compiled by `prepare_for_write`
#[derive(Debug)]
struct CompiledCycle {
    /// every populated (ordinal, record) of the current cycle, ordinal-sorted
    snapshot: Vec<(u32, Bytes)>,
    /// previous-cycle records that are gone this cycle
    removals: Vec<(u32, Bytes)>,
    /// current-cycle records the previous cycle did not have
    additions: Vec<(u32, Bytes)>,
}

/// Outcome of a one-shot identity transfer from a read type-state
#[derive(Debug)]
struct RestoredCycle {
    /// true iff every prior ordinal was bound (the source was unfiltered)
    complete: bool,
    /// previous-ordinal -> original identity hash
    identity_hashes: HashMap<u32, u64>,
}

/// Per-type write state: accumulates the current cycle's records, remembers
/// the previous cycle's, and compiles snapshot/delta payloads at the write
/// boundary.
///
/// `add` is safe against concurrent callers (sharded content-addressed maps,
/// atomic ordinal allocation). The cycle-boundary operations are exclusive:
/// callers must not overlap them with `add` or with each other.
pub struct TypeWriteState {
    schema: Schema,
    shards: Vec<RwLock<HashMap<Bytes, u32>>>,
    previous: RwLock<Population>,
    next_ordinal: AtomicU32,
    cycle_floor: AtomicU32,
    compiled: Mutex<Option<CompiledCycle>>,
    restored: Mutex<Option<RestoredCycle>>,
}

impl TypeWriteState {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            previous: RwLock::new(Population::default()),
            next_ordinal: AtomicU32::new(0),
            cycle_floor: AtomicU32::new(0),
            compiled: Mutex::new(None),
            restored: Mutex::new(None),
        }
    }
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
    pub fn name(&self) -> &str {
        self.schema.name()
    }
    fn shard_for(&self, hash: u64) -> &RwLock<HashMap<Bytes, u32>> {
        &self.shards[hash as usize % SHARD_COUNT]
    }
}

// adding
impl TypeWriteState {
    /// Record the given payload in the current cycle, returning its ordinal
    ///
    /// Byte-identical submissions collapse to a single ordinal; a record the
    /// previous cycle held keeps the ordinal it held there, which is what
    /// keeps deltas minimal across unchanged populations.
    pub fn add(&self, record: WriteRecord, finder: &HashCodeFinder) -> u32 {
        let payload = record.payload().clone();
        let hash = finder.hash(self.name(), &payload);
        let shard = self.shard_for(hash);
        if let Some(&ordinal) = shard.read().get(&payload) {
            return ordinal;
        }
        let mut shard = shard.write();
        if let Some(&ordinal) = shard.get(&payload) {
            return ordinal;
        }
        let ordinal = match self.previous.read().by_record.get(&payload) {
            Some(&held) => held,
            None => self.allocate_ordinal(),
        };
        shard.insert(payload, ordinal);
        ordinal
    }
    fn allocate_ordinal(&self) -> u32 {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::AcqRel);
        debug_assert_ne!(ordinal, EMPTY_ORDINAL, "ordinal space exhausted");
        ordinal
    }
    /// Number of records in the current cycle
    pub fn current_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
    /// Number of records in the previous cycle
    pub fn previous_count(&self) -> usize {
        self.previous.read().len()
    }
}

// cycle boundaries (exclusive)
impl TypeWriteState {
    /// Compile the accumulated records into the payload plans the blob
    /// writer consumes
    pub fn prepare_for_write(&self) {
        let current = self.gather_current();
        let previous = self.previous.read();
        let removals: Vec<(u32, Bytes)> = previous
            .by_ordinal
            .iter()
            .filter(|(ordinal, _)| !current.by_ordinal.contains_key(ordinal))
            .map(|(&ordinal, record)| (ordinal, record.clone()))
            .collect();
        let additions: Vec<(u32, Bytes)> = current
            .by_ordinal
            .iter()
            .filter(|(ordinal, _)| !previous.by_ordinal.contains_key(ordinal))
            .map(|(&ordinal, record)| (ordinal, record.clone()))
            .collect();
        let snapshot: Vec<(u32, Bytes)> = current
            .by_ordinal
            .iter()
            .map(|(&ordinal, record)| (ordinal, record.clone()))
            .collect();
        log::debug!(
            "compiled `{}`: {} populated, {} added, {} removed",
            self.name(),
            snapshot.len(),
            additions.len(),
            removals.len()
        );
        *self.compiled.lock() = Some(CompiledCycle {
            snapshot,
            removals,
            additions,
        });
    }
    /// Rotate current -> previous and empty the current cycle
    pub fn prepare_for_next_cycle(&self) {
        let current = self.gather_current();
        for shard in &self.shards {
            shard.write().clear();
        }
        *self.previous.write() = current;
        self.cycle_floor
            .store(self.next_ordinal.load(Ordering::Acquire), Ordering::Release);
        *self.compiled.lock() = None;
        *self.restored.lock() = None;
    }
    /// Copy every previous-cycle record into the current cycle unchanged
    pub fn add_all_objects_from_previous_cycle(&self, finder: &HashCodeFinder) {
        // snapshot the previous population first so no shard lock is ever
        // taken while the previous-cycle lock is held (concurrent `add`s
        // nest the two in the opposite order)
        let entries: Vec<(Bytes, u32)> = {
            let previous = self.previous.read();
            previous
                .by_record
                .iter()
                .map(|(record, &ordinal)| (record.clone(), ordinal))
                .collect()
        };
        for (record, ordinal) in entries {
            let hash = finder.hash(self.name(), &record);
            self.shard_for(hash).write().entry(record).or_insert(ordinal);
        }
    }
    /// Discard everything added since the last cycle boundary
    pub fn reset_to_last_prepare_for_next_cycle(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        self.next_ordinal
            .store(self.cycle_floor.load(Ordering::Acquire), Ordering::Release);
        *self.compiled.lock() = None;
    }
    /// One-shot identity import from a materialized read state; the copied
    /// population becomes this state's previous cycle
    pub fn restore_from(&self, source: &TypeReadState, finder: &HashCodeFinder) {
        let mut previous = Population::default();
        let mut identity_hashes = HashMap::new();
        for (ordinal, record) in source.extract_population() {
            identity_hashes.insert(ordinal, finder.hash(self.name(), &record));
            previous.insert(ordinal, record);
        }
        let complete = !source.is_filtered();
        let floor = previous.max_ordinal().map(|o| o + 1).unwrap_or(0);
        for shard in &self.shards {
            shard.write().clear();
        }
        *self.previous.write() = previous;
        self.next_ordinal.store(floor, Ordering::Release);
        self.cycle_floor.store(floor, Ordering::Release);
        *self.compiled.lock() = None;
        *self.restored.lock() = Some(RestoredCycle {
            complete,
            identity_hashes,
        });
        if !complete {
            log::warn!(
                "restore of `{}` is incomplete: the source state is filtered",
                self.name()
            );
        }
    }
    fn gather_current(&self) -> Population {
        let mut population = Population::default();
        for shard in &self.shards {
            for (record, &ordinal) in shard.read().iter() {
                population.insert(ordinal, record.clone());
            }
        }
        population
    }
}

// queries
impl TypeWriteState {
    /// True iff the current population differs from the previous one
    pub fn has_changed_since_last_cycle(&self) -> bool {
        let previous = self.previous.read();
        if self.current_count() != previous.len() {
            return true;
        }
        for shard in &self.shards {
            for (record, &ordinal) in shard.read().iter() {
                if previous.by_record.get(record) != Some(&ordinal) {
                    return true;
                }
            }
        }
        false
    }
    /// True iff the last restore bound every prior ordinal
    pub fn is_restored(&self) -> bool {
        self.restored
            .lock()
            .as_ref()
            .map(|r| r.complete)
            .unwrap_or(false)
    }
    /// The identity hash a previous-cycle ordinal had at restore time
    pub fn restored_identity_hash(&self, ordinal: u32) -> Option<u64> {
        self.restored
            .lock()
            .as_ref()
            .and_then(|r| r.identity_hashes.get(&ordinal).copied())
    }
}

// payload emission
impl TypeWriteState {
    /// Write the compiled snapshot payload
    pub(crate) fn write_snapshot_payload(&self, buf: &mut Vec<u8>) -> EngineResult<()> {
        let guard = self.compiled.lock();
        let compiled = guard
            .as_ref()
            .ok_or(EngineError::PhaseViolation("write_snapshot_payload"))?;
        encode_records(buf, &compiled.snapshot);
        Ok(())
    }
    /// Write the compiled delta payload (previous -> current)
    pub(crate) fn write_delta_payload(&self, buf: &mut Vec<u8>) -> EngineResult<()> {
        let guard = self.compiled.lock();
        let compiled = guard
            .as_ref()
            .ok_or(EngineError::PhaseViolation("write_delta_payload"))?;
        encode_ordinals(buf, &compiled.removals);
        encode_records(buf, &compiled.additions);
        Ok(())
    }
    /// Write the compiled reverse delta payload (current -> previous)
    pub(crate) fn write_reverse_delta_payload(&self, buf: &mut Vec<u8>) -> EngineResult<()> {
        let guard = self.compiled.lock();
        let compiled = guard
            .as_ref()
            .ok_or(EngineError::PhaseViolation("write_reverse_delta_payload"))?;
        encode_ordinals(buf, &compiled.additions);
        encode_records(buf, &compiled.removals);
        Ok(())
    }
}

fn encode_ordinals(buf: &mut Vec<u8>, records: &[(u32, Bytes)]) {
    codec::encode_varint(buf, records.len() as u64);
    for (ordinal, _) in records {
        codec::encode_varint(buf, *ordinal as u64);
    }
}

fn encode_records(buf: &mut Vec<u8>, records: &[(u32, Bytes)]) {
    codec::encode_varint(buf, records.len() as u64);
    for (ordinal, record) in records {
        codec::encode_varint(buf, *ordinal as u64);
        codec::encode_bytes(buf, record);
    }
}
