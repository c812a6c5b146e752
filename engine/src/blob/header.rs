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

use {
    super::{version_has_pad, BlobKind, BLOB_MAGIC},
    crate::{
        codec,
        error::{EngineError, EngineResult},
        mem::Scanner,
    },
    std::collections::BTreeMap,
};

#[derive(Debug, PartialEq, Eq)]
/// The header opening every blob: format version, blob kind, the
/// origin/destination randomized tag pair, and free-form string tags
pub struct BlobHeader {
    pub version: u64,
    pub kind: BlobKind,
    pub origin_randomized_tag: u64,
    pub destination_randomized_tag: u64,
    pub tags: BTreeMap<String, String>,
}

impl BlobHeader {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        codec::encode_u64_le(buf, BLOB_MAGIC);
        codec::encode_varint(buf, self.version);
        buf.push(self.kind.dscr());
        codec::encode_u64_le(buf, self.origin_randomized_tag);
        codec::encode_u64_le(buf, self.destination_randomized_tag);
        codec::encode_varint(buf, self.tags.len() as u64);
        for (key, value) in &self.tags {
            codec::encode_string(buf, key);
            codec::encode_string(buf, value);
        }
    }
    /// Decode and validate: bad magic and unknown versions are rejected
    /// here, before any tag is trusted
    pub fn decode(scanner: &mut Scanner) -> EngineResult<Self> {
        if scanner.try_next_u64_le()? != BLOB_MAGIC {
            return Err(EngineError::CorruptedPayload("bad blob magic"));
        }
        let version = codec::decode_varint(scanner)?;
        version_has_pad(version)?;
        let kind = BlobKind::try_from_raw(scanner.try_next_byte()?)?;
        let origin_randomized_tag = scanner.try_next_u64_le()?;
        let destination_randomized_tag = scanner.try_next_u64_le()?;
        let tag_count = codec::decode_len(scanner)?;
        let mut tags = BTreeMap::new();
        for _ in 0..tag_count {
            let key = codec::decode_string(scanner)?;
            let value = codec::decode_string(scanner)?;
            tags.insert(key, value);
        }
        Ok(Self {
            version,
            kind,
            origin_randomized_tag,
            destination_randomized_tag,
            tags,
        })
    }
    /// Whether the framing this header announces carries the per-type
    /// forward-compat pad
    pub fn has_forward_compat_pad(&self) -> bool {
        // validated during decode; the legacy version is the only one without
        self.version != super::BLOB_VERSION_LEGACY
    }
}
