// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Structural diff between two desired-state snapshots
//!
//! Only map-keyed add/remove/modify classification is needed: each tracked
//! collection is compared entry by entry, values by structural equality.

use crate::domain::state::{BuildSpec, DesiredState, ManifestSpec};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const BUILD_SPECS: &str = "buildSpecs";
pub const MANIFEST_SPECS: &str = "manifestSpecs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeKind::Added => "+",
            ChangeKind::Removed => "-",
            ChangeKind::Modified => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Setting(String),
    Build(BuildSpec),
    Manifest(ManifestSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<ChangeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<ChangeValue>,
}

impl ChangeRecord {
    /// `(collection, key)` when the record addresses a tracked collection entry.
    pub fn entry(&self) -> Option<(&str, &str)> {
        match self.path.as_slice() {
            [collection, key] => Some((collection.as_str(), key.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.symbol(), self.path.join("."))
    }
}

/// A resource type held in a keyed collection of the desired state.
pub trait Tracked: Clone + PartialEq {
    const COLLECTION: &'static str;

    fn wrap(self) -> ChangeValue;

    fn unwrap_value(value: &ChangeValue) -> Option<&Self>;
}

impl Tracked for BuildSpec {
    const COLLECTION: &'static str = BUILD_SPECS;

    fn wrap(self) -> ChangeValue {
        ChangeValue::Build(self)
    }

    fn unwrap_value(value: &ChangeValue) -> Option<&Self> {
        match value {
            ChangeValue::Build(spec) => Some(spec),
            _ => None,
        }
    }
}

impl Tracked for ManifestSpec {
    const COLLECTION: &'static str = MANIFEST_SPECS;

    fn wrap(self) -> ChangeValue {
        ChangeValue::Manifest(self)
    }

    fn unwrap_value(value: &ChangeValue) -> Option<&Self> {
        match value {
            ChangeValue::Manifest(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Compare two snapshots. Settings come first, then builds, then manifests,
/// each collection in key order.
pub fn diff(old: &DesiredState, new: &DesiredState) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    diff_setting("registry", &old.registry, &new.registry, &mut records);
    diff_setting(
        "clusterContext",
        &old.cluster_context,
        &new.cluster_context,
        &mut records,
    );
    diff_setting("namespace", &old.namespace, &new.namespace, &mut records);
    diff_collection(&old.build_specs, &new.build_specs, &mut records);
    diff_collection(&old.manifest_specs, &new.manifest_specs, &mut records);
    records
}

fn diff_setting(name: &str, old: &str, new: &str, records: &mut Vec<ChangeRecord>) {
    if old != new {
        records.push(ChangeRecord {
            kind: ChangeKind::Modified,
            path: vec![name.to_string()],
            new_value: Some(ChangeValue::Setting(new.to_string())),
            old_value: Some(ChangeValue::Setting(old.to_string())),
        });
    }
}

fn diff_collection<T: Tracked>(
    old: &BTreeMap<String, T>,
    new: &BTreeMap<String, T>,
    records: &mut Vec<ChangeRecord>,
) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let path = vec![T::COLLECTION.to_string(), key.clone()];
        let record = match (old.get(key), new.get(key)) {
            (None, Some(added)) => ChangeRecord {
                kind: ChangeKind::Added,
                path,
                new_value: Some(added.clone().wrap()),
                old_value: None,
            },
            (Some(removed), None) => ChangeRecord {
                kind: ChangeKind::Removed,
                path,
                new_value: None,
                old_value: Some(removed.clone().wrap()),
            },
            (Some(before), Some(after)) if before != after => ChangeRecord {
                kind: ChangeKind::Modified,
                path,
                new_value: Some(after.clone().wrap()),
                old_value: Some(before.clone().wrap()),
            },
            _ => continue,
        };
        records.push(record);
    }
}

/// Changes of one collection, partitioned by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChanges<T> {
    pub added: Vec<T>,
    pub removed: Vec<String>,
    pub modified: Vec<T>,
}

impl<T> Default for CollectionChanges<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<T> CollectionChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Added then modified entries: everything that must be (re)applied.
    pub fn to_apply(&self) -> impl Iterator<Item = &T> {
        self.added.iter().chain(self.modified.iter())
    }
}

pub fn build_changes(records: &[ChangeRecord]) -> CollectionChanges<BuildSpec> {
    project(records)
}

pub fn manifest_changes(records: &[ChangeRecord]) -> CollectionChanges<ManifestSpec> {
    project(records)
}

/// A key both removed and added in the same pass is a replacement and is
/// reported as modified, so removal never races the rebuild.
fn project<T: Tracked>(records: &[ChangeRecord]) -> CollectionChanges<T> {
    let mut added: BTreeMap<String, T> = BTreeMap::new();
    let mut removed: BTreeSet<String> = BTreeSet::new();
    let mut modified: BTreeMap<String, T> = BTreeMap::new();

    for record in records {
        let Some((collection, key)) = record.entry() else {
            continue;
        };
        if collection != T::COLLECTION {
            continue;
        }
        let new_value = record.new_value.as_ref().and_then(T::unwrap_value);
        match (record.kind, new_value) {
            (ChangeKind::Added, Some(spec)) => {
                added.insert(key.to_string(), spec.clone());
            }
            (ChangeKind::Modified, Some(spec)) => {
                modified.insert(key.to_string(), spec.clone());
            }
            (ChangeKind::Removed, _) => {
                removed.insert(key.to_string());
            }
            _ => {}
        }
    }

    let replaced: Vec<String> = removed
        .iter()
        .filter(|key| added.contains_key(*key) || modified.contains_key(*key))
        .cloned()
        .collect();
    for key in replaced {
        removed.remove(&key);
        if let Some(spec) = added.remove(&key) {
            modified.insert(key, spec);
        }
    }

    CollectionChanges {
        added: added.into_values().collect(),
        removed: removed.into_iter().collect(),
        modified: modified.into_values().collect(),
    }
}
