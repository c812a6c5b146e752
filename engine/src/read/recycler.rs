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

/// A two-phase buffer pool bounding allocator pressure during loads
///
/// Buffers given back during one type's delta application are *not* handed
/// out again until [`MemoryRecycler::swap`] runs: a type must never be served
/// storage that another part of the same type's apply just released. The blob
/// reader swaps between per-type applications, so buffers freed by one type
/// become available to the next.
#[derive(Debug, Default)]
pub struct MemoryRecycler {
    available: Vec<Vec<u8>>,
    freed: Vec<Vec<u8>>,
}

impl MemoryRecycler {
    pub fn new() -> Self {
        Self::default()
    }
    /// Take a cleared buffer, reusing a recycled allocation when one is
    /// available
    pub fn take_buffer(&mut self) -> Vec<u8> {
        match self.available.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }
    /// Return a buffer to the pool; it becomes reusable after the next
    /// `swap`
    pub fn give_back(&mut self, buf: Vec<u8>) {
        if buf.capacity() > 0 {
            self.freed.push(buf);
        }
    }
    /// Promote everything freed since the last swap
    pub fn swap(&mut self) {
        self.available.append(&mut self.freed);
    }
    pub fn pooled_bytes(&self) -> usize {
        self.available
            .iter()
            .chain(self.freed.iter())
            .map(|b| b.capacity())
            .sum()
    }
}
