/*
 * Created on Tue Feb 03 2026
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

use {
    super::{header::BlobHeader, BlobKind, BLOB_VERSION_CURRENT},
    crate::{
        codec,
        error::{EngineError, EngineResult},
        write::{CyclePhase, WriteStateEngine},
        HEADER_TAG_PRODUCED_AT,
    },
    std::{io::Write, time::Instant},
};

/// Emits snapshot, delta and reverse delta blobs for a prepared write engine
///
/// The engine must be in the `Writing` phase (i.e. after `prepare_for_write`
/// and before `prepare_for_next_cycle`); any number of blobs may be written
/// from the same prepared cycle.
pub struct BlobWriter<'a> {
    engine: &'a WriteStateEngine,
}

impl<'a> BlobWriter<'a> {
    pub fn new(engine: &'a WriteStateEngine) -> Self {
        Self { engine }
    }
    /// Write the complete current state
    pub fn write_snapshot(&self, out: &mut impl Write) -> EngineResult<()> {
        self.write_blob(BlobKind::Snapshot, out)
    }
    /// Write the transition previous state -> current state
    pub fn write_delta(&self, out: &mut impl Write) -> EngineResult<()> {
        self.write_blob(BlobKind::Delta, out)
    }
    /// Write the transition current state -> previous state
    pub fn write_reverse_delta(&self, out: &mut impl Write) -> EngineResult<()> {
        self.write_blob(BlobKind::ReverseDelta, out)
    }
    fn write_blob(&self, kind: BlobKind, out: &mut impl Write) -> EngineResult<()> {
        if self.engine.phase() != CyclePhase::Writing {
            return Err(EngineError::PhaseViolation("write_blob"));
        }
        if kind != BlobKind::Snapshot && !self.engine.can_produce_delta() {
            log::warn!(
                "emitting a {} from an incompletely restored engine; consumers \
                 of this chain should be steered to a snapshot",
                kind.as_str()
            );
        }
        let start = Instant::now();
        let previous_tag = self.engine.previous_state_randomized_tag();
        let next_tag = self.engine.next_state_randomized_tag();
        let (origin, destination) = match kind {
            BlobKind::Snapshot | BlobKind::Delta => (previous_tag, next_tag),
            BlobKind::ReverseDelta => (next_tag, previous_tag),
        };
        let mut tags = self.engine.header_tags();
        tags.insert(
            HEADER_TAG_PRODUCED_AT.to_owned(),
            chrono::Utc::now().to_rfc3339(),
        );
        let mut buf = Vec::new();
        BlobHeader {
            version: BLOB_VERSION_CURRENT,
            kind,
            origin_randomized_tag: origin,
            destination_randomized_tag: destination,
            tags,
        }
        .encode(&mut buf);
        let states = self.engine.ordered_type_states();
        codec::encode_varint(&mut buf, states.len() as u64);
        for state in &states {
            state.schema().encode(&mut buf);
            // forward-compat pad: this writer has nothing to smuggle
            codec::encode_varint(&mut buf, 0);
            match kind {
                BlobKind::Snapshot => state.write_snapshot_payload(&mut buf)?,
                BlobKind::Delta => state.write_delta_payload(&mut buf)?,
                BlobKind::ReverseDelta => state.write_reverse_delta_payload(&mut buf)?,
            }
        }
        out.write_all(&buf)?;
        log::info!(
            "wrote {} ({} type(s), {} byte(s)) {:#018x} -> {:#018x} in {:?}",
            kind.as_str(),
            states.len(),
            buf.len(),
            origin,
            destination,
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::BlobWriter,
        crate::{
            error::EngineError,
            schema::{ListSchema, Schema},
            write::WriteStateEngine,
        },
    };

    #[test]
    fn writing_before_prepare_is_a_phase_violation() {
        let engine = WriteStateEngine::new();
        engine
            .register(Schema::List(ListSchema::new("ListOfMovie", "Movie")))
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(
            BlobWriter::new(&engine)
                .write_snapshot(&mut out)
                .unwrap_err(),
            EngineError::PhaseViolation("write_blob")
        );
        assert!(out.is_empty());
    }
}
