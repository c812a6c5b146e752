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
    super::{header::BlobHeader, BlobKind},
    crate::{
        codec,
        error::{EngineError, EngineResult},
        mem::Scanner,
        read::{ReadStateEngine, TypeReadState},
        schema::Schema,
    },
    std::{io::Read, time::Instant},
};

/// Drives snapshot and delta streams into a read state engine
///
/// The engine's filter decides, per type (and per object field), whether a
/// sub-blob is materialized or drained; either way the stream is consumed
/// exactly, so the next sub-blob always starts aligned.
pub struct BlobReader<'a> {
    engine: &'a mut ReadStateEngine,
}

impl<'a> BlobReader<'a> {
    pub fn new(engine: &'a mut ReadStateEngine) -> Self {
        Self { engine }
    }
    /// Load a snapshot: construct and populate a type-state per materialized
    /// sub-blob, then wire references, notify listeners and run post-init
    /// hooks
    pub fn read_snapshot(&mut self, data: &[u8]) -> EngineResult<()> {
        let start = Instant::now();
        let mut scanner = Scanner::new(data);
        let header = BlobHeader::decode(&mut scanner)?;
        if header.kind != BlobKind::Snapshot {
            return Err(EngineError::CorruptedPayload("expected a snapshot blob"));
        }
        let type_count = codec::decode_len(&mut scanner)?;
        let mut materialized = 0usize;
        for _ in 0..type_count {
            let schema = Schema::decode(&mut scanner)?;
            skip_forward_compat_pad(&header, &mut scanner)?;
            if self.engine.filter().includes_type(schema.name()) {
                let filter = self.engine.filter();
                let keep: Vec<Box<str>> = match &schema {
                    Schema::Object(object) => object
                        .fields()
                        .iter()
                        .filter(|f| filter.keeps_field(schema.name(), &f.name))
                        .map(|f| f.name.clone())
                        .collect(),
                    _ => Vec::new(),
                };
                let mut state = TypeReadState::new_filtered(schema, |field| {
                    keep.iter().any(|kept| &**kept == field)
                });
                state.read_snapshot(&mut scanner, self.engine.memory_recycler())?;
                self.engine.memory_recycler().swap();
                self.engine.add_type_state(state)?;
                materialized += 1;
            } else {
                log::debug!("draining filtered-out snapshot sub-blob");
                TypeReadState::discard_snapshot(&mut scanner)?;
            }
        }
        self.engine
            .set_current_randomized_tag(header.destination_randomized_tag);
        self.engine.set_header_tags(header.tags);
        self.engine.wire_type_states_to_schemas();
        for state in self.engine.type_states() {
            state.notify_end();
        }
        self.engine.after_initialization();
        log::info!(
            "loaded snapshot {:#018x}: {materialized} of {type_count} type(s) materialized in {:?}",
            self.engine.current_randomized_tag(),
            start.elapsed()
        );
        Ok(())
    }
    /// Apply a delta (or reverse delta): the blob's origin tag must equal the
    /// engine's current tag, otherwise nothing is mutated
    pub fn read_delta(&mut self, data: &[u8]) -> EngineResult<()> {
        let start = Instant::now();
        let mut scanner = Scanner::new(data);
        let header = BlobHeader::decode(&mut scanner)?;
        if header.kind == BlobKind::Snapshot {
            return Err(EngineError::CorruptedPayload("expected a delta blob"));
        }
        if header.origin_randomized_tag != self.engine.current_randomized_tag() {
            return Err(EngineError::DeltaMismatch {
                expected: self.engine.current_randomized_tag(),
                found: header.origin_randomized_tag,
            });
        }
        self.engine
            .set_current_randomized_tag(header.destination_randomized_tag);
        self.engine.set_header_tags(header.tags.clone());
        let type_count = codec::decode_len(&mut scanner)?;
        let mut touched = Vec::new();
        for _ in 0..type_count {
            let schema = Schema::decode(&mut scanner)?;
            skip_forward_compat_pad(&header, &mut scanner)?;
            match self.engine.state_index(schema.name()) {
                Some(index) => {
                    let (states, recycler) = self.engine.split_mut();
                    states[index].apply_delta(&mut scanner, recycler)?;
                    // a type's freed buffers become available to the next type
                    recycler.swap();
                    touched.push(index);
                }
                None => {
                    log::debug!("draining delta sub-blob for unmaterialized type");
                    TypeReadState::discard_delta(&mut scanner)?;
                }
            }
        }
        for index in touched {
            if let Some(state) = self.engine.type_state_at(index) {
                state.notify_end();
            }
        }
        log::info!(
            "applied {} {:#018x} -> {:#018x} in {:?}",
            header.kind.as_str(),
            header.origin_randomized_tag,
            header.destination_randomized_tag,
            start.elapsed()
        );
        Ok(())
    }
    /// Slurp-and-load conveniences for stream transports
    pub fn read_snapshot_from(&mut self, source: &mut impl Read) -> EngineResult<()> {
        let mut data = self.engine.memory_recycler().take_buffer();
        source.read_to_end(&mut data)?;
        let outcome = self.read_snapshot(&data);
        self.engine.memory_recycler().give_back(data);
        self.engine.memory_recycler().swap();
        outcome
    }
    pub fn read_delta_from(&mut self, source: &mut impl Read) -> EngineResult<()> {
        let mut data = self.engine.memory_recycler().take_buffer();
        source.read_to_end(&mut data)?;
        let outcome = self.read_delta(&data);
        self.engine.memory_recycler().give_back(data);
        self.engine.memory_recycler().swap();
        outcome
    }
}

fn skip_forward_compat_pad(header: &BlobHeader, scanner: &mut Scanner) -> EngineResult<()> {
    if header.has_forward_compat_pad() {
        let pad = codec::decode_len(scanner)?;
        scanner.try_skip(pad)?;
    }
    Ok(())
}
