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

//! The schema model: a tagged variant over the four dataset shapes, plus the
//! self-describing binary prefix every type-sub-blob opens with. Schemas are
//! immutable once constructed and shared between the engines by value.

use crate::{
    codec,
    error::{EngineError, EngineResult},
    mem::Scanner,
};

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum SchemaKind {
    Object = 0,
    List = 1,
    Set = 2,
    Map = 3,
}

impl SchemaKind {
    pub const fn dscr(&self) -> u8 {
        *self as u8
    }
    fn try_from_raw(raw: u8) -> EngineResult<Self> {
        Ok(match raw {
            0 => Self::Object,
            1 => Self::List,
            2 => Self::Set,
            3 => Self::Map,
            _ => return Err(EngineError::CorruptedPayload("unknown schema tag")),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// The type of one object field
pub enum FieldType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Bytes,
    String,
    /// A reference to another registered type, by name; encoded on the wire
    /// as the referenced record's ordinal
    Reference(Box<str>),
}

impl FieldType {
    pub const fn dscr(&self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Long => 1,
            Self::Float => 2,
            Self::Double => 3,
            Self::Boolean => 4,
            Self::Bytes => 5,
            Self::String => 6,
            Self::Reference(_) => 7,
        }
    }
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.dscr());
        if let Self::Reference(target) = self {
            codec::encode_string(buf, target);
        }
    }
    fn decode(scanner: &mut Scanner) -> EngineResult<Self> {
        Ok(match scanner.try_next_byte()? {
            0 => Self::Int,
            1 => Self::Long,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Boolean,
            5 => Self::Bytes,
            6 => Self::String,
            7 => Self::Reference(codec::decode_string(scanner)?.into_boxed_str()),
            _ => return Err(EngineError::CorruptedPayload("unknown field type tag")),
        })
    }
    /// Advance `scanner` past one encoded value of this type
    pub fn skip_value(&self, scanner: &mut Scanner) -> EngineResult<()> {
        match self {
            Self::Int | Self::Long | Self::Reference(_) => {
                codec::decode_varint(scanner).map(|_| ())
            }
            Self::Float => scanner.try_skip(4),
            Self::Double => scanner.try_skip(8),
            Self::Boolean => scanner.try_skip(1),
            Self::Bytes | Self::String => {
                let len = codec::decode_len(scanner)?;
                scanner.try_skip(len)
            }
        }
    }
    /// Copy one encoded value of this type from `scanner` into `out`
    pub fn copy_value(&self, scanner: &mut Scanner, out: &mut Vec<u8>) -> EngineResult<()> {
        let start = scanner.cursor();
        self.skip_value(scanner)?;
        out.extend_from_slice(scanner.window(start));
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct ObjectField {
    pub name: Box<str>,
    pub ty: FieldType,
}

impl ObjectField {
    pub fn new(name: impl Into<Box<str>>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// An ordered list of named typed fields with optional primary-key paths
pub struct ObjectSchema {
    name: Box<str>,
    fields: Vec<ObjectField>,
    primary_key: Vec<Box<str>>,
}

impl ObjectSchema {
    pub fn new(
        name: impl Into<Box<str>>,
        fields: Vec<ObjectField>,
        primary_key: Vec<Box<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            primary_key,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn fields(&self) -> &[ObjectField] {
        &self.fields
    }
    pub fn primary_key(&self) -> &[Box<str>] {
        &self.primary_key
    }
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| &*f.name == name)
    }
    /// A copy of this schema retaining only the fields `keep` selects, in the
    /// original wire order
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| keep(&f.name))
                .cloned()
                .collect(),
            primary_key: self.primary_key.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct ListSchema {
    name: Box<str>,
    element_type: Box<str>,
}

impl ListSchema {
    pub fn new(name: impl Into<Box<str>>, element_type: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn element_type(&self) -> &str {
        &self.element_type
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// A set of references to `element_type` records; `hash_key` optionally names
/// the field paths whose values drive element identity hashing for stable
/// iteration
pub struct SetSchema {
    name: Box<str>,
    element_type: Box<str>,
    hash_key: Vec<Box<str>>,
}

impl SetSchema {
    pub fn new(
        name: impl Into<Box<str>>,
        element_type: impl Into<Box<str>>,
        hash_key: Vec<Box<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
            hash_key,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn element_type(&self) -> &str {
        &self.element_type
    }
    pub fn hash_key(&self) -> &[Box<str>] {
        &self.hash_key
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct MapSchema {
    name: Box<str>,
    key_type: Box<str>,
    value_type: Box<str>,
    hash_key: Vec<Box<str>>,
}

impl MapSchema {
    pub fn new(
        name: impl Into<Box<str>>,
        key_type: impl Into<Box<str>>,
        value_type: impl Into<Box<str>>,
        hash_key: Vec<Box<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            key_type: key_type.into(),
            value_type: value_type.into(),
            hash_key,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn key_type(&self) -> &str {
        &self.key_type
    }
    pub fn value_type(&self) -> &str {
        &self.value_type
    }
    pub fn hash_key(&self) -> &[Box<str>] {
        &self.hash_key
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// A dataset type schema
pub enum Schema {
    Object(ObjectSchema),
    List(ListSchema),
    Set(SetSchema),
    Map(MapSchema),
}

impl Schema {
    pub fn name(&self) -> &str {
        match self {
            Self::Object(s) => s.name(),
            Self::List(s) => s.name(),
            Self::Set(s) => s.name(),
            Self::Map(s) => s.name(),
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
    /// Names of every type this schema points at
    pub fn referenced_types(&self) -> Vec<&str> {
        match self {
            Self::Object(s) => s
                .fields()
                .iter()
                .filter_map(|f| match &f.ty {
                    FieldType::Reference(target) => Some(&**target),
                    _ => None,
                })
                .collect(),
            Self::List(s) => vec![s.element_type()],
            Self::Set(s) => vec![s.element_type()],
            Self::Map(s) => vec![s.key_type(), s.value_type()],
        }
    }
}

/*
    wire codec
*/

impl Schema {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind().dscr());
        codec::encode_string(buf, self.name());
        match self {
            Self::Object(s) => {
                codec::encode_varint(buf, s.fields.len() as u64);
                for field in &s.fields {
                    codec::encode_string(buf, &field.name);
                    field.ty.encode(buf);
                }
                encode_paths(buf, &s.primary_key);
            }
            Self::List(s) => codec::encode_string(buf, &s.element_type),
            Self::Set(s) => {
                codec::encode_string(buf, &s.element_type);
                encode_paths(buf, &s.hash_key);
            }
            Self::Map(s) => {
                codec::encode_string(buf, &s.key_type);
                codec::encode_string(buf, &s.value_type);
                encode_paths(buf, &s.hash_key);
            }
        }
    }
    pub fn decode(scanner: &mut Scanner) -> EngineResult<Self> {
        let kind = SchemaKind::try_from_raw(scanner.try_next_byte()?)?;
        let name = codec::decode_string(scanner)?;
        Ok(match kind {
            SchemaKind::Object => {
                let field_count = codec::decode_len(scanner)?;
                let mut fields = Vec::with_capacity(field_count);
                for _ in 0..field_count {
                    let fname = codec::decode_string(scanner)?;
                    let ty = FieldType::decode(scanner)?;
                    fields.push(ObjectField::new(fname, ty));
                }
                let primary_key = decode_paths(scanner)?;
                Self::Object(ObjectSchema::new(name, fields, primary_key))
            }
            SchemaKind::List => Self::List(ListSchema::new(name, codec::decode_string(scanner)?)),
            SchemaKind::Set => {
                let element_type = codec::decode_string(scanner)?;
                let hash_key = decode_paths(scanner)?;
                Self::Set(SetSchema::new(name, element_type, hash_key))
            }
            SchemaKind::Map => {
                let key_type = codec::decode_string(scanner)?;
                let value_type = codec::decode_string(scanner)?;
                let hash_key = decode_paths(scanner)?;
                Self::Map(MapSchema::new(name, key_type, value_type, hash_key))
            }
        })
    }
}

fn encode_paths(buf: &mut Vec<u8>, paths: &[Box<str>]) {
    codec::encode_varint(buf, paths.len() as u64);
    for path in paths {
        codec::encode_string(buf, path);
    }
}

fn decode_paths(scanner: &mut Scanner) -> EngineResult<Vec<Box<str>>> {
    let count = codec::decode_len(scanner)?;
    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        paths.push(codec::decode_string(scanner)?.into_boxed_str());
    }
    Ok(paths)
}
