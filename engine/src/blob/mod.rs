/*
 * Created on Mon Jan 19 2026
 *
 * This file is a part of Strata
 * Strata is a free and open-source versioned in-memory dataset engine that
 * lets a producer publish whole datasets as compact snapshots and deltas
 * while consumers follow the version chain with strongly-typed reads.
 *
 * Copyright (c) 2026, the Strata developers
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

//! The blob codec: multi-type framing that links the write and read engines.
//!
//! ```text
//! blob   := header, varint(N), N × type-sub-blob
//! header := magic u64 LE, varint(version), kind u8,
//!           u64 LE origin tag, u64 LE destination tag,
//!           varint(tagCount), tagCount × (string, string)
//! type-sub-blob := schema, varint(padLen), padLen bytes, payload
//!                  (the pad is omitted in the legacy framing)
//! ```
//!
//! The pad bytes are forward-compat room: a reader always skips them, so a
//! future writer can smuggle additive per-type bytes past today's readers.

pub mod filter;
pub mod header;
pub mod reader;
pub mod writer;

use crate::error::{EngineError, EngineResult};

/// Leading magic of every Strata blob
pub const BLOB_MAGIC: u64 = u64::from_le_bytes(*b"STRATA\x00\x01");

/// The legacy framing: no forward-compat pad between schema and payload
pub const BLOB_VERSION_LEGACY: u64 = 1;
/// The current framing
pub const BLOB_VERSION_CURRENT: u64 = 2;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// What a blob does to consumer state
pub enum BlobKind {
    /// fully replaces consumer state
    Snapshot = 0,
    /// transforms origin state into destination state
    Delta = 1,
    /// transforms destination state back into origin state
    ReverseDelta = 2,
}

impl BlobKind {
    pub const fn dscr(&self) -> u8 {
        *self as u8
    }
    pub(crate) fn try_from_raw(raw: u8) -> EngineResult<Self> {
        Ok(match raw {
            0 => Self::Snapshot,
            1 => Self::Delta,
            2 => Self::ReverseDelta,
            _ => return Err(EngineError::CorruptedPayload("unknown blob kind")),
        })
    }
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Delta => "delta",
            Self::ReverseDelta => "reverse delta",
        }
    }
}

/// Validate a header version, answering whether the framing carries the
/// forward-compat pad
pub(crate) fn version_has_pad(version: u64) -> EngineResult<bool> {
    match version {
        BLOB_VERSION_LEGACY => Ok(false),
        BLOB_VERSION_CURRENT => Ok(true),
        other => Err(EngineError::VersionUnsupported(other)),
    }
}
