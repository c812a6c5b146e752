/*
 * Created on Tue Dec 02 2025
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

/*
    Record identity hashing. The default policy is FNV-1a (64-bit); producers
    that need a domain hash for specific types (usually to pin set/map
    iteration order across schema changes) register a strategy per type name.
    The finder is immutable after construction and shared read-only by every
    type-state.
*/

use std::{collections::BTreeMap, sync::Arc};

pub type DefaultHash = Fnv1A<Fnv1APolicy64A>;

pub trait HashPolicy {
    const PRIME: u64;
    const OFFSET: u64;
}

pub struct Fnv1APolicy64A;
impl HashPolicy for Fnv1APolicy64A {
    const OFFSET: u64 = 0xCBF29CE484222325;
    const PRIME: u64 = 0x100000001B3;
}

pub struct Fnv1A<P: HashPolicy> {
    _m: core::marker::PhantomData<P>,
}

impl<P: HashPolicy> Fnv1A<P> {
    pub const fn hash(src: &[u8]) -> u64 {
        let mut hash = P::OFFSET;
        let mut i = 0;
        while i < src.len() {
            hash ^= src[i] as u64;
            hash = hash.wrapping_mul(P::PRIME);
            i += 1;
        }
        hash
    }
}

/// A per-type record identity hash
///
/// Implementations must be deterministic: the same record bytes always hash
/// to the same value, across processes and across runs.
pub trait RecordHashStrategy: Send + Sync {
    fn hash(&self, record: &[u8]) -> u64;
}

/// Resolves the identity hash for a (type, record) pair
///
/// Supplied at engine construction and shared read-only from then on. Types
/// without a registered strategy fall back to FNV-1a over the record bytes.
pub struct HashCodeFinder {
    overrides: BTreeMap<Box<str>, Arc<dyn RecordHashStrategy>>,
}

impl HashCodeFinder {
    pub fn new() -> Self {
        Self {
            overrides: BTreeMap::new(),
        }
    }
    /// Register a non-default strategy for `type_name`, replacing any earlier
    /// registration
    pub fn with_strategy(
        mut self,
        type_name: impl Into<Box<str>>,
        strategy: Arc<dyn RecordHashStrategy>,
    ) -> Self {
        self.overrides.insert(type_name.into(), strategy);
        self
    }
    pub fn hash(&self, type_name: &str, record: &[u8]) -> u64 {
        match self.overrides.get(type_name) {
            Some(strategy) => strategy.hash(record),
            None => DefaultHash::hash(record),
        }
    }
    pub fn is_non_default(&self, type_name: &str) -> bool {
        self.overrides.contains_key(type_name)
    }
    /// The type names with non-default hashing, comma-separated and sorted.
    /// Byte-identical across runs for a given registration set.
    pub fn non_default_summary(&self) -> String {
        let mut out = String::new();
        for name in self.overrides.keys() {
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(name);
        }
        out
    }
}

impl Default for HashCodeFinder {
    fn default() -> Self {
        Self::new()
    }
}
