/*
 * Created on Tue Jan 27 2026
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
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, BTreeSet},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Declares which types (and which object fields) a consumer materializes
///
/// A filter is fixed at engine construction and persists for every snapshot
/// and delta the engine loads; bytes for anything excluded are drained, never
/// materialized.
///
/// The YAML form consumers ship in their config files:
///
/// ```yaml
/// Select:
///   Movie:
///     fields: [id, title]
///   Studio: {}
/// ```
pub enum FilterConfig {
    /// materialize every type and field
    #[default]
    All,
    /// materialize only the named types; absent types are drained
    Select(BTreeMap<String, TypeFilter>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    /// object fields to keep; `None` keeps all. Ignored for non-object
    /// shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeSet<String>>,
}

impl FilterConfig {
    /// A filter keeping the named types whole
    pub fn types<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Select(
            names
                .into_iter()
                .map(|name| (name.into(), TypeFilter::default()))
                .collect(),
        )
    }
    pub fn parse_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
    /// True iff nothing at all is filtered: every type and every field of
    /// every published blob is materialized. Restore requires this.
    pub fn materializes_everything(&self) -> bool {
        matches!(self, Self::All)
    }
    pub fn includes_type(&self, type_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Select(types) => types.contains_key(type_name),
        }
    }
    pub fn keeps_field(&self, type_name: &str, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Select(types) => match types.get(type_name).and_then(|t| t.fields.as_ref()) {
                Some(fields) => fields.contains(field),
                None => true,
            },
        }
    }
}
