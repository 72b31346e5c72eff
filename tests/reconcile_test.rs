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

use kubeloop::domain::reconcile::{build_changes, manifest_changes};
use kubeloop::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn state(builds: &BTreeMap<String, String>, manifests: &BTreeSet<String>) -> DesiredState {
    let mut state = DesiredState::default();
    for (image, dir) in builds {
        state.build_specs.insert(
            image.clone(),
            BuildSpec {
                image_name: image.clone(),
                build_context: BuildContext::new(dir.clone()),
                hot_reload: None,
            },
        );
    }
    for path in manifests {
        state
            .manifest_specs
            .insert(path.clone(), ManifestSpec { path: path.clone() });
    }
    state
}

fn arb_state() -> impl Strategy<Value = DesiredState> {
    (
        prop::collection::btree_map("[a-d]", "[xy]", 0..4),
        prop::collection::btree_set("k8s/[a-d]\\.yaml", 0..4),
        prop::sample::select(vec!["default", "dev"]),
    )
        .prop_map(|(builds, manifests, namespace)| {
            let mut s = state(&builds, &manifests);
            s.namespace = namespace.to_string();
            s
        })
}

proptest! {
    #[test]
    fn prop_diff_is_complementary(old in arb_state(), new in arb_state()) {
        let forward = diff(&old, &new);
        let backward = diff(&new, &old);
        prop_assert_eq!(forward.len(), backward.len());

        for record in &forward {
            let mirrored = backward.iter().find(|r| r.path == record.path);
            prop_assert!(mirrored.is_some(), "no mirror for {}", record);
            let mirrored = mirrored.unwrap();
            let expected = match record.kind {
                ChangeKind::Added => ChangeKind::Removed,
                ChangeKind::Removed => ChangeKind::Added,
                ChangeKind::Modified => ChangeKind::Modified,
            };
            prop_assert_eq!(mirrored.kind, expected);
            prop_assert_eq!(&mirrored.new_value, &record.old_value);
        }
    }

    #[test]
    fn prop_projection_covers_every_collection_record(old in arb_state(), new in arb_state()) {
        let records = diff(&old, &new);
        let builds = build_changes(&records);
        let manifests = manifest_changes(&records);

        let projected = builds.added.len() + builds.removed.len() + builds.modified.len()
            + manifests.added.len() + manifests.removed.len() + manifests.modified.len();
        let collection_records = records.iter().filter(|r| r.entry().is_some()).count();
        prop_assert_eq!(projected, collection_records);
    }

    #[test]
    fn prop_rebase_converges(old in arb_state(), new in arb_state()) {
        prop_assert!(!diff(&old, &new).is_empty() || old == new);
        let rebased = new.clone();
        prop_assert!(diff(&rebased, &new).is_empty());
    }
}

#[test]
fn test_dry_run_shape_for_single_build() {
    let builds = [("app".to_string(), ".".to_string())].into_iter().collect();
    let records = diff(&DesiredState::default(), &state(&builds, &BTreeSet::new()));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ChangeKind::Added);
    assert_eq!(records[0].path, vec!["buildSpecs", "app"]);
    assert!(records[0].old_value.is_none());
}

#[test]
fn test_setting_change_is_not_a_resource_change() {
    let old = DesiredState::default();
    let mut new = old.clone();
    new.registry = "registry.local:5001".to_string();

    let records = diff(&old, &new);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, vec!["registry"]);
    assert!(build_changes(&records).is_empty());
    assert!(manifest_changes(&records).is_empty());
}
