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

use kubeloop::domain::state::LiveStep;
use kubeloop::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn store_at(root: &Path) -> StateStore {
    StateStore::new(StoreOptions {
        project_root: root.to_path_buf(),
        instance: "10350".to_string(),
        defaults: DesiredState::default(),
    })
}

fn hot_reload() -> HotReload {
    HotReload {
        ignore_patterns: ["**/*.tmp".to_string()].into_iter().collect(),
        live_steps: vec![
            LiveStep::Sync {
                src: "src/**".to_string(),
                dest: "/app/src".to_string(),
            },
            LiveStep::Run {
                command: "npm install".to_string(),
                trigger_patterns: ["package.json".to_string()].into_iter().collect(),
            },
        ],
    }
}

#[tokio::test]
async fn test_state_file_location() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    assert_eq!(
        store.state_file(),
        dir.path().join(".kubeloop").join("state-10350.json")
    );
}

#[tokio::test]
async fn test_registration_before_load_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());

    let err = store
        .register_build("app", BuildContext::new("."), None)
        .unwrap_err();
    assert!(matches!(err, LoopError::ConfigError(_)));
    assert!(store.register_manifest(["k8s"]).is_err());
    assert!(store.set_namespace("dev").is_err());
}

#[tokio::test]
async fn test_missing_file_loads_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    store.load().await;

    assert!(store.is_initialized());
    assert_eq!(store.current(), DesiredState::default());
    assert_eq!(store.snapshot_baseline(), DesiredState::default());
}

#[tokio::test]
async fn test_corrupt_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    std::fs::create_dir_all(store.state_file().parent().unwrap()).unwrap();
    std::fs::write(store.state_file(), "{ not json").unwrap();

    store.load().await;
    assert_eq!(store.current(), DesiredState::default());
}

#[tokio::test]
async fn test_partial_file_merges_onto_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    std::fs::create_dir_all(store.state_file().parent().unwrap()).unwrap();
    std::fs::write(store.state_file(), r#"{"namespace": "Team_A"}"#).unwrap();

    store.load().await;
    let state = store.current();
    assert_eq!(state.namespace, "team-a");
    assert_eq!(state.registry, "localhost:5000");
    assert!(state.build_specs.is_empty());
}

#[tokio::test]
async fn test_persist_round_trip_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("k8s")).unwrap();
    std::fs::write(dir.path().join("k8s/app.yaml"), "kind: Service\n").unwrap();

    let store = store_at(dir.path());
    store.load().await;
    store
        .register_build("web", BuildContext::new("./web"), Some(hot_reload()))
        .unwrap();
    store
        .register_build("api", BuildContext::new("./api"), None)
        .unwrap();
    store.register_manifest(["k8s/app.yaml"]).unwrap();
    store.persist().await.unwrap();
    let first = std::fs::read_to_string(store.state_file()).unwrap();

    let reloaded = store_at(dir.path());
    reloaded.load().await;
    assert_eq!(reloaded.current(), store.current());
    reloaded.persist().await.unwrap();
    let second = std::fs::read_to_string(reloaded.state_file()).unwrap();

    assert_eq!(first, second);
    assert!(first.find("\"api\"").unwrap() < first.find("\"web\"").unwrap());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_initialization() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_at(dir.path()));

    let loads: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.load().await })
        })
        .collect();
    for load in loads {
        load.await.unwrap();
    }

    store
        .register_build("app", BuildContext::new("."), None)
        .unwrap();
    // a later load must not wipe registrations
    store.load().await;
    assert!(store.current().build_specs.contains_key("app"));
}

#[tokio::test]
async fn test_register_manifest_expands_globs_and_skips_non_yaml() {
    let dir = TempDir::new().unwrap();
    let k8s = dir.path().join("k8s");
    std::fs::create_dir_all(&k8s).unwrap();
    std::fs::write(k8s.join("a.yaml"), "kind: Service\n").unwrap();
    std::fs::write(k8s.join("b.yml"), "kind: Service\n").unwrap();
    std::fs::write(k8s.join("notes.txt"), "hello").unwrap();

    let store = store_at(dir.path());
    store.load().await;
    let keys = store.register_manifest(["k8s/*", "missing.yaml"]).unwrap();

    assert_eq!(keys, vec!["k8s/a.yaml".to_string(), "k8s/b.yml".to_string()]);
    let registered: BTreeSet<String> = store.current().manifest_specs.into_keys().collect();
    assert_eq!(registered.len(), 2);
}

#[tokio::test]
async fn test_register_build_upserts_by_image() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    store.load().await;

    store
        .register_build("app", BuildContext::new("./v1"), None)
        .unwrap();
    store
        .register_build("app", BuildContext::new("./v2"), None)
        .unwrap();

    let state = store.current();
    assert_eq!(state.build_specs.len(), 1);
    assert_eq!(state.build_specs["app"].build_context.dir, "./v2");
    assert!(store
        .register_build("  ", BuildContext::new("."), None)
        .is_err());
}

#[tokio::test]
async fn test_rebase_and_forget_resources() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    store.load().await;
    store
        .register_build("app", BuildContext::new("."), None)
        .unwrap();

    assert!(!diff(&store.snapshot_baseline(), &store.current()).is_empty());
    store.rebase();
    assert!(diff(&store.snapshot_baseline(), &store.current()).is_empty());

    store.forget_resources().await.unwrap();
    assert!(store.snapshot_baseline().build_specs.is_empty());
    assert!(store.current().build_specs.contains_key("app"));

    let reloaded = store_at(dir.path());
    reloaded.load().await;
    assert!(reloaded.current().build_specs.is_empty());
}

#[tokio::test]
async fn test_clear_resources_keeps_baseline() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    store.load().await;
    store
        .register_build("app", BuildContext::new("."), None)
        .unwrap();
    store.rebase();

    store.clear_resources().unwrap();
    let changes = diff(&store.snapshot_baseline(), &store.current());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Removed);
    assert_eq!(changes[0].path, vec!["buildSpecs", "app"]);
}

#[tokio::test]
async fn test_commit_keeps_unapplied_entries_pending() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path());
    store.load().await;
    store
        .register_build("api", BuildContext::new("./api"), None)
        .unwrap();
    store
        .register_build("web", BuildContext::new("./web"), None)
        .unwrap();

    let mut applied = store.current();
    applied.build_specs.remove("web");
    store.commit(applied.clone()).await.unwrap();

    assert_eq!(store.snapshot_baseline(), applied);
    let pending = diff(&store.snapshot_baseline(), &store.current());
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].path, vec!["buildSpecs", "web"]);

    let reloaded = store_at(dir.path());
    reloaded.load().await;
    assert_eq!(reloaded.current(), applied);
}
