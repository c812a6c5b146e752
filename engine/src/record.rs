/*
 * Created on Tue Dec 09 2025
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

//! The record model: a [`WriteRecord`] is the opaque, canonical encoding of
//! one record, built by the object-to-record mapper through the typed
//! builders here and submitted by value to the write engine. The same byte
//! layout is what read type-states store and what the views decode.

use {
    crate::{
        codec,
        error::EngineResult,
        mem::Scanner,
        schema::{FieldType, ObjectSchema},
    },
    bytes::Bytes,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// One fully-encoded record
///
/// The payload is refcounted: cloning a record (between the current and
/// previous cycle populations, or into the dedup maps) never copies bytes.
pub struct WriteRecord {
    data: Bytes,
}

impl WriteRecord {
    pub fn from_bytes(data: Bytes) -> Self {
        Self { data }
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn payload(&self) -> &Bytes {
        &self.data
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A single typed field value, borrowed for encode and borrowed out of
/// record storage on decode
pub enum FieldValue<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Bytes(&'a [u8]),
    Str(&'a str),
    /// `None` encodes the null reference
    Reference(Option<u32>),
}

impl<'a> FieldValue<'a> {
    fn matches(&self, ty: &FieldType) -> bool {
        matches!(
            (self, ty),
            (Self::Int(_), FieldType::Int)
                | (Self::Long(_), FieldType::Long)
                | (Self::Float(_), FieldType::Float)
                | (Self::Double(_), FieldType::Double)
                | (Self::Boolean(_), FieldType::Boolean)
                | (Self::Bytes(_), FieldType::Bytes)
                | (Self::Str(_), FieldType::String)
                | (Self::Reference(_), FieldType::Reference(_))
        )
    }
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Int(v) => codec::encode_zigzag(buf, *v as i64),
            Self::Long(v) => codec::encode_zigzag(buf, *v),
            Self::Float(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Self::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Self::Boolean(v) => buf.push(*v as u8),
            Self::Bytes(v) => codec::encode_bytes(buf, v),
            Self::Str(v) => codec::encode_string(buf, v),
            Self::Reference(ordinal) => codec::encode_varint(buf, ref_word(*ordinal)),
        }
    }
    pub(crate) fn decode(scanner: &mut Scanner<'a>, ty: &FieldType) -> EngineResult<Self> {
        Ok(match ty {
            FieldType::Int => Self::Int(codec::decode_zigzag(scanner)? as i32),
            FieldType::Long => Self::Long(codec::decode_zigzag(scanner)?),
            FieldType::Float => {
                let raw: [u8; 4] = scanner
                    .try_next_block(4)?
                    .try_into()
                    .expect("sliced exactly 4 bytes");
                Self::Float(f32::from_le_bytes(raw))
            }
            FieldType::Double => {
                let raw: [u8; 8] = scanner
                    .try_next_block(8)?
                    .try_into()
                    .expect("sliced exactly 8 bytes");
                Self::Double(f64::from_le_bytes(raw))
            }
            FieldType::Boolean => Self::Boolean(scanner.try_next_byte()? != 0),
            FieldType::Bytes => Self::Bytes(codec::decode_bytes(scanner)?),
            FieldType::String => {
                let raw = codec::decode_bytes(scanner)?;
                Self::Str(core::str::from_utf8(raw).map_err(|_| {
                    crate::error::EngineError::CorruptedPayload("string field is not valid UTF-8")
                })?)
            }
            FieldType::Reference(_) => Self::Reference(unref_word(codec::decode_varint(scanner)?)?),
        })
    }
}

const fn ref_word(ordinal: Option<u32>) -> u64 {
    match ordinal {
        Some(o) => o as u64 + 1,
        None => 0,
    }
}

fn unref_word(word: u64) -> EngineResult<Option<u32>> {
    match word {
        0 => Ok(None),
        w => u32::try_from(w - 1)
            .map(Some)
            .map_err(|_| crate::error::EngineError::CorruptedPayload("reference ordinal overflow")),
    }
}

/*
    object records
*/

/// Builds one object record, field by field, in schema wire order
///
/// ## Panics
///
/// `append` panics if the value's type does not match the next schema field
/// or if every field has already been written; `finish` panics if fields are
/// missing. Record assembly against the declared schema is a mapper contract,
/// so a mismatch is a programming error, not a runtime condition.
pub struct ObjectRecordBuilder<'a> {
    schema: &'a ObjectSchema,
    buf: Vec<u8>,
    next_field: usize,
}

impl<'a> ObjectRecordBuilder<'a> {
    pub fn new(schema: &'a ObjectSchema) -> Self {
        Self {
            schema,
            buf: Vec::new(),
            next_field: 0,
        }
    }
    pub fn append(mut self, value: FieldValue) -> Self {
        let field = self
            .schema
            .fields()
            .get(self.next_field)
            .unwrap_or_else(|| {
                panic!(
                    "all {} fields of `{}` already written",
                    self.schema.fields().len(),
                    self.schema.name()
                )
            });
        assert!(
            value.matches(&field.ty),
            "value for field `{}` of `{}` has the wrong type",
            field.name,
            self.schema.name()
        );
        value.encode_into(&mut self.buf);
        self.next_field += 1;
        self
    }
    pub fn finish(self) -> WriteRecord {
        assert_eq!(
            self.next_field,
            self.schema.fields().len(),
            "record for `{}` is missing fields",
            self.schema.name()
        );
        WriteRecord::from_bytes(Bytes::from(self.buf))
    }
}

/// A decoded view over one object record held in read-state storage
///
/// `schema` must be the schema the record was encoded with; for a filtered
/// type-state, the filtered schema.
pub struct ObjectRecordView<'a> {
    schema: &'a ObjectSchema,
    data: &'a [u8],
}

impl<'a> ObjectRecordView<'a> {
    pub fn new(schema: &'a ObjectSchema, data: &'a [u8]) -> Self {
        Self { schema, data }
    }
    /// Decode the value of the named field, scanning past its predecessors
    pub fn field(&self, name: &str) -> EngineResult<Option<FieldValue<'a>>> {
        let mut scanner = Scanner::new(self.data);
        for field in self.schema.fields() {
            if &*field.name == name {
                return FieldValue::decode(&mut scanner, &field.ty).map(Some);
            }
            field.ty.skip_value(&mut scanner)?;
        }
        Ok(None)
    }
}

/*
    container records
*/

/// Encode a list record: element ordinals in list order
pub fn list_record(elements: &[Option<u32>]) -> WriteRecord {
    let mut buf = Vec::new();
    codec::encode_varint(&mut buf, elements.len() as u64);
    for element in elements {
        codec::encode_varint(&mut buf, ref_word(*element));
    }
    WriteRecord::from_bytes(Bytes::from(buf))
}

/// Encode a set record: element ordinals ordered by (identity hash, ordinal)
/// so iteration order is stable across cycles and runs
pub fn set_record(elements: &[(u32, u64)]) -> WriteRecord {
    let mut ordered: Vec<(u32, u64)> = elements.to_vec();
    ordered.sort_unstable_by_key(|&(ordinal, hash)| (hash, ordinal));
    ordered.dedup_by_key(|&mut (ordinal, _)| ordinal);
    let mut buf = Vec::new();
    codec::encode_varint(&mut buf, ordered.len() as u64);
    for (ordinal, _) in ordered {
        codec::encode_varint(&mut buf, ref_word(Some(ordinal)));
    }
    WriteRecord::from_bytes(Bytes::from(buf))
}

/// Encode a map record: (key, value) ordinal pairs ordered by
/// (key identity hash, key ordinal)
pub fn map_record(entries: &[(u32, u64, u32)]) -> WriteRecord {
    let mut ordered: Vec<(u32, u64, u32)> = entries.to_vec();
    ordered.sort_unstable_by_key(|&(key, key_hash, _)| (key_hash, key));
    ordered.dedup_by_key(|&mut (key, _, _)| key);
    let mut buf = Vec::new();
    codec::encode_varint(&mut buf, ordered.len() as u64);
    for (key, _, value) in ordered {
        codec::encode_varint(&mut buf, ref_word(Some(key)));
        codec::encode_varint(&mut buf, ref_word(Some(value)));
    }
    WriteRecord::from_bytes(Bytes::from(buf))
}

/// Decode a list record into element ordinals
pub fn decode_list_record(data: &[u8]) -> EngineResult<Vec<Option<u32>>> {
    let mut scanner = Scanner::new(data);
    let count = codec::decode_len(&mut scanner)?;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(unref_word(codec::decode_varint(&mut scanner)?)?);
    }
    Ok(elements)
}

/// Decode a set record into element ordinals (stored order)
pub fn decode_set_record(data: &[u8]) -> EngineResult<Vec<u32>> {
    decode_list_record(data).map(|elements| elements.into_iter().flatten().collect())
}

/// Decode a map record into (key, value) ordinal pairs (stored order)
pub fn decode_map_record(data: &[u8]) -> EngineResult<Vec<(u32, u32)>> {
    let mut scanner = Scanner::new(data);
    let count = codec::decode_len(&mut scanner)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let key = unref_word(codec::decode_varint(&mut scanner)?)?;
        let value = unref_word(codec::decode_varint(&mut scanner)?)?;
        if let (Some(key), Some(value)) = (key, value) {
            entries.push((key, value));
        }
    }
    Ok(entries)
}
