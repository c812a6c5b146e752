/*
 * Created on Mon Jan 12 2026
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
    super::recycler::MemoryRecycler,
    crate::{
        codec,
        error::EngineResult,
        mem::{OrdinalSet, Scanner},
        record::ObjectRecordView,
        schema::{ListSchema, MapSchema, ObjectSchema, Schema, SchemaKind, SetSchema},
    },
    bytes::Bytes,
    std::mem,
};

/// Span marker for an unpopulated ordinal
const EMPTY_SPAN: OrdinalSpan = OrdinalSpan {
    start: u32::MAX,
    len: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrdinalSpan {
    start: u32,
    len: u32,
}

#[derive(Debug, Default)]
/// Ordinal-indexed columnar record storage: one contiguous data plane plus a
/// per-ordinal span plane
struct ColumnarStore {
    data: Vec<u8>,
    spans: Vec<OrdinalSpan>,
}

impl ColumnarStore {
    fn with_buffer(data: Vec<u8>) -> Self {
        Self {
            data,
            spans: Vec::new(),
        }
    }
    fn get(&self, ordinal: u32) -> Option<&[u8]> {
        let span = self.spans.get(ordinal as usize)?;
        if span.start == EMPTY_SPAN.start {
            return None;
        }
        Some(&self.data[span.start as usize..(span.start + span.len) as usize])
    }
    fn set_span(&mut self, ordinal: u32, start: usize, len: usize) {
        let slot = ordinal as usize;
        if slot >= self.spans.len() {
            self.spans.resize(slot + 1, EMPTY_SPAN);
        }
        self.spans[slot] = OrdinalSpan {
            start: start as u32,
            len: len as u32,
        };
    }
}

/// Fan-out notification for consumers observing a read type-state
///
/// `begin_update` fires when a load starts touching the type;
/// `end_update` fires once the whole blob has been applied, with the
/// populated and previous-populated ordinal sets (their symmetric difference
/// is exactly the ordinal-level change set).
pub trait TypeStateListener: Send + Sync {
    fn begin_update(&self) {}
    fn end_update(&self, populated: &OrdinalSet, previous_populated: &OrdinalSet);
}

/// State shared by the four type-state shapes
struct TypeStateCore {
    store: ColumnarStore,
    populated: OrdinalSet,
    previous_populated: OrdinalSet,
    listeners: Vec<Box<dyn TypeStateListener>>,
    /// direct links established by `wire_type_states_to_schemas`: indices
    /// into the engine's ordered state table. Layout depends on the shape:
    /// one slot per object field, one for list/set elements, key then value
    /// for maps.
    wiring: Vec<Option<usize>>,
}

impl TypeStateCore {
    fn new() -> Self {
        Self {
            store: ColumnarStore::default(),
            populated: OrdinalSet::new(),
            previous_populated: OrdinalSet::new(),
            listeners: Vec::new(),
            wiring: Vec::new(),
        }
    }
    /// Fully replace contents from a snapshot payload
    fn read_snapshot_with(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
        rewrite: impl Fn(&[u8], &mut Vec<u8>) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut store = ColumnarStore::with_buffer(recycler.take_buffer());
        let mut populated = OrdinalSet::new();
        let count = codec::decode_len(scanner)?;
        for _ in 0..count {
            let ordinal = codec::decode_ordinal(scanner)?;
            let raw = codec::decode_bytes(scanner)?;
            let start = store.data.len();
            rewrite(raw, &mut store.data)?;
            let len = store.data.len() - start;
            store.set_span(ordinal, start, len);
            populated.insert(ordinal);
        }
        let old = mem::replace(&mut self.store, store);
        recycler.give_back(old.data);
        self.previous_populated = mem::replace(&mut self.populated, populated);
        Ok(())
    }
    /// Mutate contents toward the next published state from a delta payload
    fn apply_delta_with(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
        rewrite: impl Fn(&[u8], &mut Vec<u8>) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let removal_count = codec::decode_len(scanner)?;
        let mut removed = OrdinalSet::new();
        for _ in 0..removal_count {
            removed.insert(codec::decode_ordinal(scanner)?);
        }
        // survivors move into a recycled buffer, compacting out the removed
        // records' bytes
        let mut store = ColumnarStore::with_buffer(recycler.take_buffer());
        let mut populated = OrdinalSet::new();
        for ordinal in self.populated.iter() {
            if removed.contains(ordinal) {
                continue;
            }
            if let Some(bytes) = self.store.get(ordinal) {
                let start = store.data.len();
                store.data.extend_from_slice(bytes);
                store.set_span(ordinal, start, bytes.len());
                populated.insert(ordinal);
            }
        }
        let addition_count = codec::decode_len(scanner)?;
        for _ in 0..addition_count {
            let ordinal = codec::decode_ordinal(scanner)?;
            let raw = codec::decode_bytes(scanner)?;
            let start = store.data.len();
            rewrite(raw, &mut store.data)?;
            let len = store.data.len() - start;
            store.set_span(ordinal, start, len);
            populated.insert(ordinal);
        }
        let old = mem::replace(&mut self.store, store);
        recycler.give_back(old.data);
        self.previous_populated = mem::replace(&mut self.populated, populated);
        Ok(())
    }
}

/*
    the four sibling shapes
*/

/// Object records, optionally field-filtered: `schema` is what is
/// materialized, `unfiltered_schema` is the wire schema the decoder uses to
/// keep positions while skipping excluded fields
pub struct ObjectTypeReadState {
    schema: ObjectSchema,
    unfiltered_schema: ObjectSchema,
    keep_mask: Vec<bool>,
    core: TypeStateCore,
}

impl ObjectTypeReadState {
    pub fn new(wire_schema: ObjectSchema, keep: impl Fn(&str) -> bool) -> Self {
        let keep_mask: Vec<bool> = wire_schema
            .fields()
            .iter()
            .map(|f| keep(&f.name))
            .collect();
        let schema = wire_schema.filtered(keep);
        Self {
            schema,
            unfiltered_schema: wire_schema,
            keep_mask,
            core: TypeStateCore::new(),
        }
    }
    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }
    pub fn unfiltered_schema(&self) -> &ObjectSchema {
        &self.unfiltered_schema
    }
    fn is_filtered(&self) -> bool {
        self.keep_mask.iter().any(|keep| !keep)
    }
    pub fn read_snapshot(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
    ) -> EngineResult<()> {
        let (schema, mask, core) = (&self.unfiltered_schema, &self.keep_mask, &mut self.core);
        let filtered = mask.iter().any(|keep| !keep);
        core.read_snapshot_with(scanner, recycler, |raw, out| {
            rewrite_object(schema, mask, filtered, raw, out)
        })
    }
    pub fn apply_delta(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
    ) -> EngineResult<()> {
        let (schema, mask, core) = (&self.unfiltered_schema, &self.keep_mask, &mut self.core);
        let filtered = mask.iter().any(|keep| !keep);
        core.apply_delta_with(scanner, recycler, |raw, out| {
            rewrite_object(schema, mask, filtered, raw, out)
        })
    }
    /// A typed view over one populated record (filtered schema)
    pub fn object_view(&self, ordinal: u32) -> Option<ObjectRecordView<'_>> {
        self.core
            .store
            .get(ordinal)
            .map(|data| ObjectRecordView::new(&self.schema, data))
    }
}

fn rewrite_object(
    schema: &ObjectSchema,
    keep_mask: &[bool],
    filtered: bool,
    raw: &[u8],
    out: &mut Vec<u8>,
) -> EngineResult<()> {
    if !filtered {
        out.extend_from_slice(raw);
        return Ok(());
    }
    let mut scanner = Scanner::new(raw);
    for (field, keep) in schema.fields().iter().zip(keep_mask) {
        if *keep {
            field.ty.copy_value(&mut scanner, out)?;
        } else {
            field.ty.skip_value(&mut scanner)?;
        }
    }
    Ok(())
}

pub struct ListTypeReadState {
    schema: ListSchema,
    core: TypeStateCore,
}

pub struct SetTypeReadState {
    schema: SetSchema,
    core: TypeStateCore,
}

pub struct MapTypeReadState {
    schema: MapSchema,
    core: TypeStateCore,
}

macro_rules! verbatim_state {
    ($ty:ty, $schema:ty) => {
        impl $ty {
            pub fn new(schema: $schema) -> Self {
                Self {
                    schema,
                    core: TypeStateCore::new(),
                }
            }
            pub fn schema(&self) -> &$schema {
                &self.schema
            }
            pub fn read_snapshot(
                &mut self,
                scanner: &mut Scanner,
                recycler: &mut MemoryRecycler,
            ) -> EngineResult<()> {
                self.core.read_snapshot_with(scanner, recycler, copy_verbatim)
            }
            pub fn apply_delta(
                &mut self,
                scanner: &mut Scanner,
                recycler: &mut MemoryRecycler,
            ) -> EngineResult<()> {
                self.core.apply_delta_with(scanner, recycler, copy_verbatim)
            }
        }
    };
}

verbatim_state!(ListTypeReadState, ListSchema);
verbatim_state!(SetTypeReadState, SetSchema);
verbatim_state!(MapTypeReadState, MapSchema);

fn copy_verbatim(raw: &[u8], out: &mut Vec<u8>) -> EngineResult<()> {
    out.extend_from_slice(raw);
    Ok(())
}

/// One materialized per-type container on the read side
pub enum TypeReadState {
    Object(ObjectTypeReadState),
    List(ListTypeReadState),
    Set(SetTypeReadState),
    Map(MapTypeReadState),
}

impl TypeReadState {
    /// Materialize the wire schema in full
    pub fn new(schema: Schema) -> Self {
        Self::new_filtered(schema, |_| true)
    }
    /// Materialize the wire schema keeping only the object fields `keep`
    /// selects (non-object shapes have no field granularity)
    pub fn new_filtered(schema: Schema, keep: impl Fn(&str) -> bool) -> Self {
        match schema {
            Schema::Object(s) => Self::Object(ObjectTypeReadState::new(s, keep)),
            Schema::List(s) => Self::List(ListTypeReadState::new(s)),
            Schema::Set(s) => Self::Set(SetTypeReadState::new(s)),
            Schema::Map(s) => Self::Map(MapTypeReadState::new(s)),
        }
    }
    pub fn name(&self) -> &str {
        match self {
            Self::Object(s) => s.schema.name(),
            Self::List(s) => s.schema.name(),
            Self::Set(s) => s.schema.name(),
            Self::Map(s) => s.schema.name(),
        }
    }
    pub fn kind(&self) -> SchemaKind {
        match self {
            Self::Object(_) => SchemaKind::Object,
            Self::List(_) => SchemaKind::List,
            Self::Set(_) => SchemaKind::Set,
            Self::Map(_) => SchemaKind::Map,
        }
    }
    /// The materialized (possibly filtered) schema
    pub fn schema(&self) -> Schema {
        match self {
            Self::Object(s) => Schema::Object(s.schema.clone()),
            Self::List(s) => Schema::List(s.schema.clone()),
            Self::Set(s) => Schema::Set(s.schema.clone()),
            Self::Map(s) => Schema::Map(s.schema.clone()),
        }
    }
    fn core(&self) -> &TypeStateCore {
        match self {
            Self::Object(s) => &s.core,
            Self::List(s) => &s.core,
            Self::Set(s) => &s.core,
            Self::Map(s) => &s.core,
        }
    }
    fn core_mut(&mut self) -> &mut TypeStateCore {
        match self {
            Self::Object(s) => &mut s.core,
            Self::List(s) => &mut s.core,
            Self::Set(s) => &mut s.core,
            Self::Map(s) => &mut s.core,
        }
    }
}

// loading
impl TypeReadState {
    pub fn read_snapshot(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
    ) -> EngineResult<()> {
        self.notify_begin();
        match self {
            Self::Object(s) => s.read_snapshot(scanner, recycler),
            Self::List(s) => s.read_snapshot(scanner, recycler),
            Self::Set(s) => s.read_snapshot(scanner, recycler),
            Self::Map(s) => s.read_snapshot(scanner, recycler),
        }
    }
    pub fn apply_delta(
        &mut self,
        scanner: &mut Scanner,
        recycler: &mut MemoryRecycler,
    ) -> EngineResult<()> {
        self.notify_begin();
        match self {
            Self::Object(s) => s.apply_delta(scanner, recycler),
            Self::List(s) => s.apply_delta(scanner, recycler),
            Self::Set(s) => s.apply_delta(scanner, recycler),
            Self::Map(s) => s.apply_delta(scanner, recycler),
        }
    }
    /// Drain a snapshot payload for a type the filter excludes; no read-state
    /// instance is needed (records are length-prefixed on the wire)
    pub fn discard_snapshot(scanner: &mut Scanner) -> EngineResult<()> {
        let count = codec::decode_len(scanner)?;
        for _ in 0..count {
            codec::decode_ordinal(scanner)?;
            codec::decode_bytes(scanner)?;
        }
        Ok(())
    }
    /// Drain a delta payload for a type the filter excludes
    pub fn discard_delta(scanner: &mut Scanner) -> EngineResult<()> {
        let removal_count = codec::decode_len(scanner)?;
        for _ in 0..removal_count {
            codec::decode_ordinal(scanner)?;
        }
        Self::discard_snapshot(scanner)
    }
}

// ordinals & records
impl TypeReadState {
    pub fn populated_ordinals(&self) -> &OrdinalSet {
        &self.core().populated
    }
    pub fn previous_populated_ordinals(&self) -> &OrdinalSet {
        &self.core().previous_populated
    }
    pub fn populated_count(&self) -> usize {
        self.core().populated.len()
    }
    /// The stored encoding of one populated record
    pub fn record(&self, ordinal: u32) -> Option<&[u8]> {
        self.core().store.get(ordinal)
    }
    /// Copy out the full population (used by the one-shot restore transfer)
    pub fn extract_population(&self) -> Vec<(u32, Bytes)> {
        self.core()
            .populated
            .iter()
            .filter_map(|ordinal| {
                self.record(ordinal)
                    .map(|bytes| (ordinal, Bytes::copy_from_slice(bytes)))
            })
            .collect()
    }
    /// True iff materialized contents differ from the wire encoding (a
    /// field-filtered object type); such a state cannot seed a restore
    pub fn is_filtered(&self) -> bool {
        match self {
            Self::Object(s) => s.is_filtered(),
            _ => false,
        }
    }
}

// listeners & wiring
impl TypeReadState {
    pub fn add_listener(&mut self, listener: Box<dyn TypeStateListener>) {
        self.core_mut().listeners.push(listener);
    }
    fn notify_begin(&self) {
        for listener in &self.core().listeners {
            listener.begin_update();
        }
    }
    pub(crate) fn notify_end(&self) {
        let core = self.core();
        for listener in &core.listeners {
            listener.end_update(&core.populated, &core.previous_populated);
        }
    }
    pub(crate) fn set_wiring(&mut self, wiring: Vec<Option<usize>>) {
        self.core_mut().wiring = wiring;
    }
    /// The engine-table index a wiring slot resolved to (see
    /// `ReadStateEngine::wire_type_states_to_schemas` for the slot layout)
    pub fn wired_target(&self, slot: usize) -> Option<usize> {
        self.core().wiring.get(slot).copied().flatten()
    }
    pub(crate) fn after_initialization(&self) {
        log::debug!(
            "`{}` initialized: {} populated ordinal(s), {} byte(s)",
            self.name(),
            self.core().populated.len(),
            self.core().store.data.len()
        );
    }
}
