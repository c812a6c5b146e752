/*
 * Created on Mon Nov 17 2025
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

use crate::error::{EngineError, EngineResult};

#[derive(Debug, PartialEq)]
/// A checked scanner over a byte buffer
///
/// Every read either advances the cursor past fully-validated bytes or
/// returns [`EngineError::TruncatedStream`] leaving the cursor untouched, so
/// decoders can bail with `?` at any depth without corrupting their position.
pub struct Scanner<'a> {
    d: &'a [u8],
    cursor: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner, starting at position 0
    pub const fn new(d: &'a [u8]) -> Self {
        Self { d, cursor: 0 }
    }
    pub const fn buffer_len(&self) -> usize {
        self.d.len()
    }
    /// Returns the remaining number of bytes
    pub const fn remaining(&self) -> usize {
        self.d.len() - self.cursor
    }
    /// Returns the current cursor position
    pub const fn cursor(&self) -> usize {
        self.cursor
    }
    /// Returns true if the scanner has reached eof
    pub const fn eof(&self) -> bool {
        self.remaining() == 0
    }
    /// Returns true if the scanner has atleast `sizeof` bytes remaining
    pub const fn has_left(&self, sizeof: usize) -> bool {
        self.remaining() >= sizeof
    }
}

impl<'a> Scanner<'a> {
    pub fn try_next_byte(&mut self) -> EngineResult<u8> {
        if self.eof() {
            return Err(EngineError::TruncatedStream);
        }
        let b = self.d[self.cursor];
        self.cursor += 1;
        Ok(b)
    }
    pub fn try_next_u64_le(&mut self) -> EngineResult<u64> {
        let block: [u8; 8] = self
            .try_next_block(8)?
            .try_into()
            .expect("sliced exactly 8 bytes");
        Ok(u64::from_le_bytes(block))
    }
    /// Return the next `len` bytes, advancing past them
    pub fn try_next_block(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        if !self.has_left(len) {
            return Err(EngineError::TruncatedStream);
        }
        let block = &self.d[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(block)
    }
    /// The bytes between an earlier cursor position and the current one
    ///
    /// ## Panics
    ///
    /// Panics if `start` lies beyond the current cursor.
    pub fn window(&self, start: usize) -> &'a [u8] {
        &self.d[start..self.cursor]
    }
    /// Skip `len` bytes (forward-compat padding, filtered payload bytes)
    pub fn try_skip(&mut self, len: usize) -> EngineResult<()> {
        if !self.has_left(len) {
            return Err(EngineError::TruncatedStream);
        }
        self.cursor += len;
        Ok(())
    }
}
