/*
 * Created on Tue Feb 10 2026
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

/*
    End-to-end producer/consumer scenarios over the full engine surface:
    cycles, blob emission, loads, delta chaining, filtering, restore.
*/

use {
    crate::{
        blob::{filter::FilterConfig, reader::BlobReader, writer::BlobWriter},
        codec,
        error::EngineError,
        hash::{HashCodeFinder, RecordHashStrategy},
        mem::OrdinalSet,
        read::{ReadStateEngine, TypeReadState, TypeStateListener},
        record::{FieldValue, ObjectRecordBuilder, WriteRecord},
        schema::{FieldType, ListSchema, ObjectField, ObjectSchema, Schema},
        write::WriteStateEngine,
        HEADER_TAG_HASH_CODES_DEFINED,
    },
    std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

fn testenv() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int_object_schema(name: &str) -> ObjectSchema {
    ObjectSchema::new(
        name,
        vec![ObjectField::new("x", FieldType::Int)],
        vec!["x".into()],
    )
}

fn int_record(schema: &ObjectSchema, x: i32) -> WriteRecord {
    ObjectRecordBuilder::new(schema)
        .append(FieldValue::Int(x))
        .finish()
}

fn producer_with_type(name: &str) -> (WriteStateEngine, ObjectSchema) {
    let schema = int_object_schema(name);
    let engine = WriteStateEngine::new();
    engine.register(Schema::Object(schema.clone())).unwrap();
    (engine, schema)
}

fn snapshot_bytes(engine: &WriteStateEngine) -> Vec<u8> {
    let mut out = Vec::new();
    BlobWriter::new(engine).write_snapshot(&mut out).unwrap();
    out
}

fn delta_bytes(engine: &WriteStateEngine) -> Vec<u8> {
    let mut out = Vec::new();
    BlobWriter::new(engine).write_delta(&mut out).unwrap();
    out
}

fn populated_of(consumer: &ReadStateEngine, type_name: &str) -> Vec<u32> {
    consumer
        .get_type_state(type_name)
        .unwrap()
        .populated_ordinals()
        .iter()
        .collect()
}

fn int_field_of(consumer: &ReadStateEngine, type_name: &str, ordinal: u32) -> Option<i32> {
    let TypeReadState::Object(state) = consumer.get_type_state(type_name)? else {
        return None;
    };
    match state.object_view(ordinal)?.field("x").unwrap() {
        Some(FieldValue::Int(x)) => Some(x),
        _ => None,
    }
}

#[test]
fn scenario_empty_cycle() {
    testenv();
    let (producer, _schema) = producer_with_type("A");
    producer.prepare_for_write().unwrap();
    let s0_destination = producer.next_state_randomized_tag();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();
    producer.prepare_for_write().unwrap();
    let d1_destination = producer.next_state_randomized_tag();
    let d1 = delta_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    assert_eq!(populated_of(&consumer, "A"), Vec::<u32>::new());
    assert_eq!(consumer.current_randomized_tag(), s0_destination);

    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(populated_of(&consumer, "A"), Vec::<u32>::new());
    assert_eq!(consumer.current_randomized_tag(), d1_destination);
}

#[test]
fn scenario_single_record() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 42)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    let populated = populated_of(&consumer, "A");
    assert_eq!(populated.len(), 1);
    assert_eq!(int_field_of(&consumer, "A", populated[0]), Some(42));
}

#[test]
fn scenario_idempotent_cycle() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 42)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    let s0_destination = producer.next_state_randomized_tag();
    producer.prepare_for_next_cycle().unwrap();

    producer.add_all_objects_from_previous_cycle().unwrap();
    assert!(!producer.has_changed_since_last_cycle());
    producer.prepare_for_write().unwrap();
    let d1_destination = producer.next_state_randomized_tag();
    let d1 = delta_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    assert_eq!(consumer.current_randomized_tag(), s0_destination);
    let populated_before: Vec<u32> = populated_of(&consumer, "A");

    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(consumer.current_randomized_tag(), d1_destination);
    assert_eq!(populated_of(&consumer, "A"), populated_before);
    // zero additions and zero removals: the change set is empty
    let state = consumer.get_type_state("A").unwrap();
    assert!(state
        .populated_ordinals()
        .symmetric_difference(state.previous_populated_ordinals())
        .is_empty());
}

#[test]
fn scenario_remove() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 42)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();

    // add nothing this cycle
    producer.prepare_for_write().unwrap();
    let d1 = delta_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    let removed = populated_of(&consumer, "A");
    assert_eq!(removed.len(), 1);

    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(populated_of(&consumer, "A"), Vec::<u32>::new());
    let state = consumer.get_type_state("A").unwrap();
    assert!(state.previous_populated_ordinals().contains(removed[0]));
}

struct ListenerProbe {
    begins: Arc<AtomicUsize>,
    ends: Arc<AtomicUsize>,
}

impl TypeStateListener for ListenerProbe {
    fn begin_update(&self) {
        self.begins.fetch_add(1, Ordering::Relaxed);
    }
    fn end_update(&self, _: &OrdinalSet, _: &OrdinalSet) {
        self.ends.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn scenario_delta_mismatch() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    let settled_tag = consumer.current_randomized_tag();

    let begins = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));
    consumer
        .get_type_state_mut("A")
        .unwrap()
        .add_listener(Box::new(ListenerProbe {
            begins: begins.clone(),
            ends: ends.clone(),
        }));

    // a second producer cycle whose origin is forced off-chain
    producer.prepare_for_next_cycle().unwrap();
    producer.add("A", int_record(&schema, 2)).unwrap();
    unsafe {
        producer.override_previous_state_randomized_tag(settled_tag.wrapping_add(1));
    }
    producer.prepare_for_write().unwrap();
    let stray = delta_bytes(&producer);

    let outcome = BlobReader::new(&mut consumer).read_delta(&stray);
    assert!(matches!(
        outcome.unwrap_err(),
        EngineError::DeltaMismatch { expected, found }
            if expected == settled_tag && found == settled_tag.wrapping_add(1)
    ));
    // consumer tag and state untouched, listeners never invoked
    assert_eq!(consumer.current_randomized_tag(), settled_tag);
    assert_eq!(populated_of(&consumer, "A").len(), 1);
    assert_eq!(begins.load(Ordering::Relaxed), 0);
    assert_eq!(ends.load(Ordering::Relaxed), 0);
}

#[test]
fn scenario_filtered_type() {
    let schema_a = int_object_schema("A");
    let schema_b = int_object_schema("B");
    let producer = WriteStateEngine::new();
    producer.register(Schema::Object(schema_a.clone())).unwrap();
    producer.register(Schema::Object(schema_b.clone())).unwrap();
    producer.add("A", int_record(&schema_a, 1)).unwrap();
    producer.add("B", int_record(&schema_b, 2)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();

    let mut consumer = ReadStateEngine::with_filter(FilterConfig::types(["A"]));
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    assert!(consumer.get_type_state("A").is_some());
    assert!(consumer.get_type_state("B").is_none());

    // the next delta still positions correctly past B's sub-blob
    producer.add("A", int_record(&schema_a, 1)).unwrap();
    producer.add("A", int_record(&schema_a, 3)).unwrap();
    producer.add("B", int_record(&schema_b, 4)).unwrap();
    producer.prepare_for_write().unwrap();
    let d1 = delta_bytes(&producer);
    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(populated_of(&consumer, "A").len(), 2);
}

#[test]
fn field_filter_drops_excluded_columns() {
    let schema = ObjectSchema::new(
        "Movie",
        vec![
            ObjectField::new("id", FieldType::Long),
            ObjectField::new("title", FieldType::String),
            ObjectField::new("x", FieldType::Int),
        ],
        vec!["id".into()],
    );
    let producer = WriteStateEngine::new();
    producer.register(Schema::Object(schema.clone())).unwrap();
    producer
        .add(
            "Movie",
            ObjectRecordBuilder::new(&schema)
                .append(FieldValue::Long(512))
                .append(FieldValue::Str("Stalker"))
                .append(FieldValue::Int(1979))
                .finish(),
        )
        .unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);

    let filter = FilterConfig::parse_yaml("Select:\n  Movie:\n    fields: [id, x]\n").unwrap();
    let mut consumer = ReadStateEngine::with_filter(filter);
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    let TypeReadState::Object(state) = consumer.get_type_state("Movie").unwrap() else {
        unreachable!()
    };
    let ordinal = consumer
        .get_type_state("Movie")
        .unwrap()
        .populated_ordinals()
        .iter()
        .next()
        .unwrap();
    let view = state.object_view(ordinal).unwrap();
    assert_eq!(view.field("id").unwrap(), Some(FieldValue::Long(512)));
    assert_eq!(view.field("title").unwrap(), None);
    assert_eq!(view.field("x").unwrap(), Some(FieldValue::Int(1979)));
    // and such a consumer cannot seed a restore
    assert!(!consumer.is_listening_for_all_populated_ordinals());
}

#[test]
fn delta_chain_equals_direct_snapshot() {
    testenv();
    let (producer, schema) = producer_with_type("A");
    let mut consumer = ReadStateEngine::new();

    // cycle 1: {1, 2} -> snapshot
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.add("A", int_record(&schema, 2)).unwrap();
    producer.prepare_for_write().unwrap();
    BlobReader::new(&mut consumer)
        .read_snapshot(&snapshot_bytes(&producer))
        .unwrap();
    producer.prepare_for_next_cycle().unwrap();

    // cycles 2..4 mutate the population and chain deltas
    let cycles: [&[i32]; 3] = [&[1, 2, 3], &[3, 4], &[4, 5, 6, 7]];
    let mut final_snapshot = Vec::new();
    for (i, population) in cycles.iter().enumerate() {
        for &x in *population {
            producer.add("A", int_record(&schema, x)).unwrap();
        }
        producer.prepare_for_write().unwrap();
        BlobReader::new(&mut consumer)
            .read_delta(&delta_bytes(&producer))
            .unwrap();
        if i == cycles.len() - 1 {
            final_snapshot = snapshot_bytes(&producer);
        }
        producer.prepare_for_next_cycle().unwrap();
    }

    // a fresh consumer loading the last snapshot sees the same state
    let mut direct = ReadStateEngine::new();
    BlobReader::new(&mut direct)
        .read_snapshot(&final_snapshot)
        .unwrap();
    assert_eq!(direct.current_randomized_tag(), consumer.current_randomized_tag());
    let chained_values: Vec<Option<i32>> = populated_of(&consumer, "A")
        .into_iter()
        .map(|o| int_field_of(&consumer, "A", o))
        .collect();
    let direct_values: Vec<Option<i32>> = populated_of(&direct, "A")
        .into_iter()
        .map(|o| int_field_of(&direct, "A", o))
        .collect();
    assert_eq!(populated_of(&consumer, "A"), populated_of(&direct, "A"));
    assert_eq!(chained_values, direct_values);
    assert_eq!(chained_values.len(), 4);
}

#[test]
fn reverse_delta_steps_back_one_version() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    let s0_destination = producer.next_state_randomized_tag();
    producer.prepare_for_next_cycle().unwrap();

    producer.add_all_objects_from_previous_cycle().unwrap();
    producer.add("A", int_record(&schema, 2)).unwrap();
    producer.prepare_for_write().unwrap();
    let d1 = delta_bytes(&producer);
    let mut r1 = Vec::new();
    BlobWriter::new(&producer)
        .write_reverse_delta(&mut r1)
        .unwrap();

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(populated_of(&consumer, "A").len(), 2);

    BlobReader::new(&mut consumer).read_delta(&r1).unwrap();
    assert_eq!(consumer.current_randomized_tag(), s0_destination);
    let populated = populated_of(&consumer, "A");
    assert_eq!(populated.len(), 1);
    assert_eq!(int_field_of(&consumer, "A", populated[0]), Some(1));
}

#[test]
fn reset_discards_the_aborted_cycle() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();

    // an aborted cycle: records added, then thrown away
    producer.add("A", int_record(&schema, 99)).unwrap();
    producer.reset_to_last_prepare_for_next_cycle().unwrap();

    // the cycle that actually ships re-adds the previous population
    producer.add_all_objects_from_previous_cycle().unwrap();
    producer.prepare_for_write().unwrap();
    let d1 = delta_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    let populated = populated_of(&consumer, "A");
    assert_eq!(populated.len(), 1);
    assert_eq!(int_field_of(&consumer, "A", populated[0]), Some(1));
}

#[test]
fn restore_continues_the_delta_chain() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.add("A", int_record(&schema, 2)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();

    // a restarted producer picks the chain up from the consumer's state
    let restarted = WriteStateEngine::new();
    restarted.register(Schema::Object(schema.clone())).unwrap();
    restarted.restore_from(&consumer).unwrap();
    assert!(restarted.can_produce_delta());
    assert_eq!(
        restarted.previous_state_randomized_tag(),
        consumer.current_randomized_tag()
    );

    // identical re-adds keep their ordinals, so the delta only removes {2}
    restarted.add("A", int_record(&schema, 1)).unwrap();
    restarted.prepare_for_write().unwrap();
    let d1 = delta_bytes(&restarted);
    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    let populated = populated_of(&consumer, "A");
    assert_eq!(populated.len(), 1);
    assert_eq!(int_field_of(&consumer, "A", populated[0]), Some(1));
}

#[test]
fn restore_requires_a_fully_listening_consumer() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 1)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);

    let mut filtered = ReadStateEngine::with_filter(FilterConfig::types(["A"]));
    BlobReader::new(&mut filtered).read_snapshot(&s0).unwrap();

    let restarted = WriteStateEngine::new();
    restarted.register(Schema::Object(schema)).unwrap();
    assert_eq!(
        restarted.restore_from(&filtered).unwrap_err(),
        EngineError::RestoreRejected
    );
}

#[test]
fn hash_codes_header_tag_is_sorted_and_stable() {
    struct FirstByte;
    impl RecordHashStrategy for FirstByte {
        fn hash(&self, record: &[u8]) -> u64 {
            record.first().copied().unwrap_or(0) as u64
        }
    }
    let emit = || {
        let finder = HashCodeFinder::new()
            .with_strategy("SetOfActor", Arc::new(FirstByte))
            .with_strategy("ListOfMovie", Arc::new(FirstByte));
        let engine = WriteStateEngine::with_hasher(finder);
        engine
            .register(Schema::List(ListSchema::new("ListOfMovie", "Movie")))
            .unwrap();
        engine.prepare_for_write().unwrap();
        let mut consumer = ReadStateEngine::new();
        BlobReader::new(&mut consumer)
            .read_snapshot(&snapshot_bytes(&engine))
            .unwrap();
        consumer
            .header_tags()
            .get(HEADER_TAG_HASH_CODES_DEFINED)
            .cloned()
    };
    let first = emit().unwrap();
    assert_eq!(first, "ListOfMovie,SetOfActor");
    assert_eq!(emit().unwrap(), first);
}

#[test]
fn forward_compat_padding_is_skipped() {
    // hand-framed snapshot: one list type whose sub-blob carries pad bytes a
    // present-day reader must ignore
    let schema = Schema::List(ListSchema::new("ListOfMovie", "Movie"));
    let mut blob = Vec::new();
    crate::blob::header::BlobHeader {
        version: crate::blob::BLOB_VERSION_CURRENT,
        kind: crate::blob::BlobKind::Snapshot,
        origin_randomized_tag: 11,
        destination_randomized_tag: 12,
        tags: Default::default(),
    }
    .encode(&mut blob);
    codec::encode_varint(&mut blob, 1); // one type
    schema.encode(&mut blob);
    codec::encode_varint(&mut blob, 4); // forward-compat pad
    blob.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    codec::encode_varint(&mut blob, 1); // one record
    codec::encode_varint(&mut blob, 0); // ordinal 0
    codec::encode_bytes(&mut blob, &[0x01, 0x05]);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&blob).unwrap();
    assert_eq!(consumer.current_randomized_tag(), 12);
    assert_eq!(populated_of(&consumer, "ListOfMovie"), vec![0]);
}

#[test]
fn listeners_are_notified_per_load() {
    let (producer, schema) = producer_with_type("A");
    producer.add("A", int_record(&schema, 5)).unwrap();
    producer.prepare_for_write().unwrap();
    let s0 = snapshot_bytes(&producer);
    producer.prepare_for_next_cycle().unwrap();
    producer.add_all_objects_from_previous_cycle().unwrap();
    producer.prepare_for_write().unwrap();
    let d1 = delta_bytes(&producer);

    let mut consumer = ReadStateEngine::new();
    BlobReader::new(&mut consumer).read_snapshot(&s0).unwrap();
    let begins = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));
    consumer
        .get_type_state_mut("A")
        .unwrap()
        .add_listener(Box::new(ListenerProbe {
            begins: begins.clone(),
            ends: ends.clone(),
        }));
    BlobReader::new(&mut consumer).read_delta(&d1).unwrap();
    assert_eq!(begins.load(Ordering::Relaxed), 1);
    assert_eq!(ends.load(Ordering::Relaxed), 1);
}
