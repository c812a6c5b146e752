/*
 * Created on Tue Jan 06 2026
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

//! The read-side state engine: owns the materialized type-states, the memory
//! recycler they compact through, the current randomized tag and the header
//! tags of the last applied blob. Loading is driven by
//! [`crate::blob::reader::BlobReader`].

mod recycler;
mod typestate;

pub use {
    recycler::MemoryRecycler,
    typestate::{
        ListTypeReadState, MapTypeReadState, ObjectTypeReadState, SetTypeReadState,
        TypeReadState, TypeStateListener,
    },
};

use {
    crate::{
        blob::filter::FilterConfig,
        error::{EngineError, EngineResult},
        schema::Schema,
    },
    std::collections::{BTreeMap, HashMap},
};

/// The read-side state engine
pub struct ReadStateEngine {
    states: Vec<TypeReadState>,
    by_name: HashMap<Box<str>, usize>,
    recycler: MemoryRecycler,
    current_tag: u64,
    header_tags: BTreeMap<String, String>,
    filter: FilterConfig,
}

impl ReadStateEngine {
    /// An engine materializing every type and field
    pub fn new() -> Self {
        Self::with_filter(FilterConfig::All)
    }
    /// An engine materializing only what `filter` selects; the filter
    /// persists across every snapshot and delta this engine loads
    pub fn with_filter(filter: FilterConfig) -> Self {
        Self {
            states: Vec::new(),
            by_name: HashMap::new(),
            recycler: MemoryRecycler::new(),
            current_tag: 0,
            header_tags: BTreeMap::new(),
            filter,
        }
    }
    /// True iff this engine tracks every populated ordinal of the dataset,
    /// i.e. nothing is filtered away. Restoring a write engine requires this.
    pub fn is_listening_for_all_populated_ordinals(&self) -> bool {
        self.filter.materializes_everything()
    }
    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }
}

// type-states
impl ReadStateEngine {
    /// Register a type-state materialized during a snapshot load
    pub fn add_type_state(&mut self, state: TypeReadState) -> EngineResult<()> {
        let name: Box<str> = state.name().into();
        if self.by_name.contains_key(&name) {
            return Err(EngineError::DuplicateType(name));
        }
        self.by_name.insert(name, self.states.len());
        self.states.push(state);
        Ok(())
    }
    pub fn get_type_state(&self, name: &str) -> Option<&TypeReadState> {
        self.by_name.get(name).map(|&i| &self.states[i])
    }
    pub fn get_type_state_mut(&mut self, name: &str) -> Option<&mut TypeReadState> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.states[index])
    }
    pub fn type_states(&self) -> &[TypeReadState] {
        &self.states
    }
    pub fn type_state_at(&self, index: usize) -> Option<&TypeReadState> {
        self.states.get(index)
    }
    pub(crate) fn state_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
    pub(crate) fn split_mut(
        &mut self,
    ) -> (&mut Vec<TypeReadState>, &mut MemoryRecycler) {
        (&mut self.states, &mut self.recycler)
    }
    pub fn memory_recycler(&mut self) -> &mut MemoryRecycler {
        &mut self.recycler
    }
}

// wiring & lifecycle
impl ReadStateEngine {
    /// Resolve every schema-level type reference to a direct index into the
    /// engine's ordered state table so object-graph traversal does not go
    /// through name lookups.
    ///
    /// Slot layout per shape: objects get one slot per (materialized) field,
    /// with `None` for non-reference fields and for reference targets that
    /// are not materialized; lists and sets get a single element slot; maps
    /// get the key slot then the value slot.
    pub fn wire_type_states_to_schemas(&mut self) {
        let mut wirings: Vec<Vec<Option<usize>>> = Vec::with_capacity(self.states.len());
        for state in &self.states {
            let wiring = match state.schema() {
                Schema::Object(schema) => schema
                    .fields()
                    .iter()
                    .map(|field| match &field.ty {
                        crate::schema::FieldType::Reference(target) => self.state_index(target),
                        _ => None,
                    })
                    .collect(),
                Schema::List(schema) => vec![self.state_index(schema.element_type())],
                Schema::Set(schema) => vec![self.state_index(schema.element_type())],
                Schema::Map(schema) => vec![
                    self.state_index(schema.key_type()),
                    self.state_index(schema.value_type()),
                ],
            };
            wirings.push(wiring);
        }
        for (state, wiring) in self.states.iter_mut().zip(wirings) {
            state.set_wiring(wiring);
        }
        log::debug!("wired {} type-state(s) to their schemas", self.states.len());
    }
    /// Signal completion of a snapshot load: post-init hooks run on every
    /// type-state
    pub fn after_initialization(&self) {
        for state in &self.states {
            state.after_initialization();
        }
    }
}

// tags
impl ReadStateEngine {
    pub fn current_randomized_tag(&self) -> u64 {
        self.current_tag
    }
    pub fn set_current_randomized_tag(&mut self, tag: u64) {
        self.current_tag = tag;
    }
    pub fn header_tags(&self) -> &BTreeMap<String, String> {
        &self.header_tags
    }
    pub fn set_header_tags(&mut self, tags: BTreeMap<String, String>) {
        self.header_tags = tags;
    }
}

impl Default for ReadStateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{ReadStateEngine, TypeReadState},
        crate::{
            error::EngineError,
            schema::{FieldType, ListSchema, ObjectField, ObjectSchema, Schema},
        },
    };

    fn movie_schema() -> Schema {
        Schema::Object(ObjectSchema::new(
            "Movie",
            vec![
                ObjectField::new("id", FieldType::Long),
                ObjectField::new("studio", FieldType::Reference("Studio".into())),
            ],
            vec!["id".into()],
        ))
    }

    #[test]
    fn duplicate_type_state_is_rejected() {
        let mut engine = ReadStateEngine::new();
        engine
            .add_type_state(TypeReadState::new(movie_schema()))
            .unwrap();
        assert_eq!(
            engine
                .add_type_state(TypeReadState::new(movie_schema()))
                .unwrap_err(),
            EngineError::DuplicateType("Movie".into())
        );
    }

    #[test]
    fn wiring_resolves_references_to_indices() {
        let mut engine = ReadStateEngine::new();
        engine
            .add_type_state(TypeReadState::new(movie_schema()))
            .unwrap();
        engine
            .add_type_state(TypeReadState::new(Schema::Object(ObjectSchema::new(
                "Studio",
                vec![ObjectField::new("name", FieldType::String)],
                vec![],
            ))))
            .unwrap();
        engine
            .add_type_state(TypeReadState::new(Schema::List(ListSchema::new(
                "ListOfMovie",
                "Movie",
            ))))
            .unwrap();
        engine.wire_type_states_to_schemas();
        let movie = engine.get_type_state("Movie").unwrap();
        assert_eq!(movie.wired_target(0), None); // id: not a reference
        assert_eq!(movie.wired_target(1), Some(1)); // studio -> index of Studio
        let list = engine.get_type_state("ListOfMovie").unwrap();
        assert_eq!(list.wired_target(0), Some(0)); // element -> Movie
    }

    #[test]
    fn wiring_to_a_missing_type_is_none() {
        let mut engine = ReadStateEngine::new();
        engine
            .add_type_state(TypeReadState::new(movie_schema()))
            .unwrap();
        engine.wire_type_states_to_schemas();
        assert_eq!(
            engine.get_type_state("Movie").unwrap().wired_target(1),
            None
        );
    }
}
