/*
 * Created on Mon Nov 10 2025
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

use core::fmt;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug)]
/// Engine errors
///
/// Every variant is fatal for the call that raised it. On the write side,
/// partial cycle state is recoverable via
/// [`crate::write::WriteStateEngine::reset_to_last_prepare_for_next_cycle`];
/// on the read side a failed snapshot load leaves the engine indeterminate
/// and it must be discarded.
pub enum EngineError {
    /// `add` was called for a type that was never registered
    UnknownType(Box<str>),
    /// a type-state with this name is already registered
    DuplicateType(Box<str>),
    /// a cycle primitive was called in the wrong phase
    PhaseViolation(&'static str),
    /// the read engine handed to `restore_from` is not tracking all
    /// populated ordinals
    RestoreRejected,
    /// the delta's origin tag does not match the consumer's current tag
    DeltaMismatch { expected: u64, found: u64 },
    /// the stream ended before the decoder was done
    TruncatedStream,
    /// the stream is long enough but its contents are malformed
    CorruptedPayload(&'static str),
    /// a unit dispatched to the fanout pool failed; carries the underlying
    /// cause
    WorkerFailure(Box<str>),
    /// the blob header declares a format version this build does not speak
    VersionUnsupported(u64),
    /// an I/O error surfaced while writing a blob
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(name) => write!(f, "unknown type `{name}`"),
            Self::DuplicateType(name) => {
                write!(f, "a type-state named `{name}` is already registered")
            }
            Self::PhaseViolation(op) => {
                write!(f, "`{op}` called in the wrong engine phase")
            }
            Self::RestoreRejected => {
                write!(f, "restore rejected: read engine is not tracking all populated ordinals")
            }
            Self::DeltaMismatch { expected, found } => write!(
                f,
                "delta chain broken: consumer is at {expected:#018x} but the delta originates from {found:#018x}"
            ),
            Self::TruncatedStream => write!(f, "unexpected end of stream"),
            Self::CorruptedPayload(what) => write!(f, "corrupted payload: {what}"),
            Self::WorkerFailure(cause) => write!(f, "worker failure: {cause}"),
            Self::VersionUnsupported(v) => {
                write!(f, "unsupported blob format version {v}")
            }
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<libfanout::UnitFailure> for EngineError {
    fn from(e: libfanout::UnitFailure) -> Self {
        Self::WorkerFailure(e.into_cause().into_boxed_str())
    }
}

#[cfg(test)]
impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        use EngineError::*;
        match (self, other) {
            (UnknownType(a), UnknownType(b)) | (DuplicateType(a), DuplicateType(b)) => a == b,
            (PhaseViolation(a), PhaseViolation(b)) => a == b,
            (RestoreRejected, RestoreRejected) | (TruncatedStream, TruncatedStream) => true,
            (
                DeltaMismatch {
                    expected: a,
                    found: b,
                },
                DeltaMismatch {
                    expected: c,
                    found: d,
                },
            ) => a == c && b == d,
            (CorruptedPayload(a), CorruptedPayload(b)) => a == b,
            (WorkerFailure(a), WorkerFailure(b)) => a == b,
            (VersionUnsupported(a), VersionUnsupported(b)) => a == b,
            _ => false,
        }
    }
}
