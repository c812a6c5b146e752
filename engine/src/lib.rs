/*
 * Created on Mon Nov 10 2025
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

//! # Strata engine
//!
//! The substrate beneath the record-mapping and consumer APIs: a write-side
//! state engine that accumulates strongly-typed records across producer
//! cycles, a read-side state engine that materializes published states, and
//! the blob codec that links the two.
//!
//! One producer iteration (a *cycle*) looks like this:
//!
//! ```text
//! add records -> prepare_for_write -> write snapshot/delta -> prepare_for_next_cycle
//! ```
//!
//! Every published state carries a pair of randomized 64-bit tags (origin and
//! destination); a consumer at tag T applies a delta iff the delta's origin
//! is T, and moves to the delta's destination. Snapshots replace everything
//! and establish the tag from scratch.

pub mod blob;
pub mod codec;
pub mod error;
pub mod hash;
pub mod mem;
pub mod read;
pub mod record;
pub mod schema;
pub mod write;
// tests
#[cfg(test)]
mod tests;

pub use {
    blob::{
        filter::{FilterConfig, TypeFilter},
        reader::BlobReader,
        writer::BlobWriter,
    },
    error::{EngineError, EngineResult},
    hash::HashCodeFinder,
    read::ReadStateEngine,
    record::WriteRecord,
    schema::Schema,
    write::WriteStateEngine,
};

/// The reserved header tag carrying the sorted, comma-separated list of type
/// names whose record identity uses non-default hashing
pub const HEADER_TAG_HASH_CODES_DEFINED: &str = "HashCodesDefined";
/// Header tag stamped by the blob writer with the RFC 3339 production time
pub const HEADER_TAG_PRODUCED_AT: &str = "ProducedAt";
