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

//! Owner of the desired-state document and its baseline snapshot
//!
//! Lifecycle is construct, then `load()`, then registrations. Registration
//! calls made before `load()` completes are rejected.

use super::model::{BuildContext, BuildSpec, DesiredState, HotReload, ManifestSpec};
use super::namespace::normalize_namespace;
use crate::infrastructure::constants::{STATE_DIR, STATE_FILE_PREFIX};
use crate::infrastructure::kubernetes::manifest::{has_glob_chars, is_manifest_file};
use crate::shared::error::{LoopError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub project_root: PathBuf,
    /// Discriminates state files of independent instances in one project.
    pub instance: String,
    pub defaults: DesiredState,
}

/// Persisted document; every top-level field may be absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    registry: Option<String>,
    cluster_context: Option<String>,
    namespace: Option<String>,
    build_specs: Option<BTreeMap<String, BuildSpec>>,
    manifest_specs: Option<BTreeMap<String, ManifestSpec>>,
}

impl PersistedState {
    fn merge_onto(self, mut state: DesiredState) -> DesiredState {
        if let Some(registry) = self.registry {
            state.registry = registry;
        }
        if let Some(context) = self.cluster_context {
            state.cluster_context = context;
        }
        if let Some(namespace) = self.namespace {
            state.namespace = namespace;
        }
        if let Some(builds) = self.build_specs {
            state.build_specs = builds;
        }
        if let Some(manifests) = self.manifest_specs {
            state.manifest_specs = manifests;
        }
        state
    }
}

pub struct StateStore {
    project_root: PathBuf,
    state_file: PathBuf,
    defaults: DesiredState,
    live: Mutex<DesiredState>,
    baseline: Mutex<DesiredState>,
    initialized: OnceCell<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateStore {
    pub fn new(options: StoreOptions) -> Self {
        let state_file = options
            .project_root
            .join(STATE_DIR)
            .join(format!("{}{}.json", STATE_FILE_PREFIX, options.instance));
        let mut defaults = options.defaults;
        defaults.namespace = normalize_namespace(&defaults.namespace);

        Self {
            project_root: options.project_root,
            state_file,
            live: Mutex::new(defaults.clone()),
            baseline: Mutex::new(defaults.clone()),
            defaults,
            initialized: OnceCell::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Restore persisted state. Concurrent callers share one in-flight load;
    /// later calls are no-ops.
    pub async fn load(&self) {
        self.initialized
            .get_or_init(|| async {
                let mut state = match self.read_persisted().await {
                    Some(persisted) => persisted.merge_onto(self.defaults.clone()),
                    None => self.defaults.clone(),
                };
                state.namespace = normalize_namespace(&state.namespace);

                *lock(&self.baseline) = state.clone();
                *lock(&self.live) = state;
                tracing::debug!(file = %self.state_file.display(), "state store initialized");
            })
            .await;
    }

    async fn read_persisted(&self) -> Option<PersistedState> {
        let content = match tokio::fs::read_to_string(&self.state_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(file = %self.state_file.display(), error = %e, "unreadable state file, using defaults");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(persisted) => Some(persisted),
            Err(e) => {
                tracing::warn!(file = %self.state_file.display(), error = %e, "corrupt state file, using defaults");
                None
            }
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LoopError::config_error(
                "state store must be loaded before accepting registrations",
            ))
        }
    }

    /// Upsert a build keyed by image name. Paths are checked at build time.
    pub fn register_build(
        &self,
        image_name: &str,
        build_context: BuildContext,
        hot_reload: Option<HotReload>,
    ) -> Result<()> {
        self.ensure_initialized()?;
        let image_name = image_name.trim();
        if image_name.is_empty() {
            return Err(LoopError::config_error("build image name must not be empty"));
        }
        if build_context.dir.trim().is_empty() {
            return Err(LoopError::config_error(format!(
                "build context for image '{}' must not be empty",
                image_name
            )));
        }

        let spec = BuildSpec {
            image_name: image_name.to_string(),
            build_context,
            hot_reload,
        };
        lock(&self.live)
            .build_specs
            .insert(image_name.to_string(), spec);
        Ok(())
    }

    /// Register one or more manifest paths, directories or globs.
    ///
    /// Globs are expanded now; candidates that match nothing or are not
    /// YAML are dropped with a warning. Returns the keys registered.
    pub fn register_manifest<I, S>(&self, paths: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_initialized()?;

        let mut keys = Vec::new();
        for raw in paths {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            keys.extend(self.expand_manifest_candidate(raw));
        }
        keys.sort();
        keys.dedup();

        if keys.is_empty() {
            tracing::warn!("manifest registration resolved to no files");
        }
        let mut live = lock(&self.live);
        for key in &keys {
            live.manifest_specs
                .insert(key.clone(), ManifestSpec { path: key.clone() });
        }
        Ok(keys)
    }

    fn expand_manifest_candidate(&self, raw: &str) -> Vec<String> {
        if !has_glob_chars(raw) {
            let candidate = self.project_root.join(raw);
            if candidate.is_dir() || (candidate.is_file() && is_manifest_file(&candidate)) {
                return vec![raw.to_string()];
            }
            tracing::warn!(manifest = %raw, "manifest path missing or not YAML, skipping");
            return Vec::new();
        }

        let pattern = self.project_root.join(raw);
        let matches = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths.flatten().collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(manifest = %raw, error = %e, "invalid manifest glob, skipping");
                return Vec::new();
            }
        };

        let mut keys = Vec::new();
        for path in matches {
            if !path.is_dir() && !is_manifest_file(&path) {
                tracing::warn!(file = %path.display(), "skipping non-YAML manifest candidate");
                continue;
            }
            let relative = path.strip_prefix(&self.project_root).unwrap_or(&path);
            keys.push(relative.to_string_lossy().replace('\\', "/"));
        }
        if keys.is_empty() {
            tracing::warn!(manifest = %raw, "manifest glob matched no files");
        }
        keys
    }

    /// Drop every registered build and manifest from the live state ahead
    /// of a fresh round of registrations. The baseline is untouched.
    pub fn clear_resources(&self) -> Result<()> {
        self.ensure_initialized()?;
        let mut live = lock(&self.live);
        live.build_specs.clear();
        live.manifest_specs.clear();
        Ok(())
    }

    pub fn set_registry(&self, registry: &str) -> Result<()> {
        self.ensure_initialized()?;
        lock(&self.live).registry = registry.trim().to_string();
        Ok(())
    }

    pub fn set_cluster_context(&self, context: &str) -> Result<()> {
        self.ensure_initialized()?;
        lock(&self.live).cluster_context = context.trim().to_string();
        Ok(())
    }

    pub fn set_namespace(&self, namespace: &str) -> Result<()> {
        self.ensure_initialized()?;
        lock(&self.live).namespace = normalize_namespace(namespace);
        Ok(())
    }

    /// Copy of the live state.
    pub fn current(&self) -> DesiredState {
        lock(&self.live).clone()
    }

    /// Independent copy of the last-rebased state: the "old" side of a diff.
    pub fn snapshot_baseline(&self) -> DesiredState {
        lock(&self.baseline).clone()
    }

    /// Close the reconciliation window: the live state becomes the baseline.
    pub fn rebase(&self) {
        let current = self.current();
        *lock(&self.baseline) = current;
    }

    pub async fn persist(&self) -> Result<()> {
        self.write_state(&self.current()).await?;
        tracing::debug!(file = %self.state_file.display(), "state persisted");
        Ok(())
    }

    /// Make `applied` the new baseline and write it out. Live entries that
    /// differ from `applied` stay pending for the next diff. The baseline
    /// moves even when the write fails.
    pub async fn commit(&self, applied: DesiredState) -> Result<()> {
        *lock(&self.baseline) = applied.clone();
        self.write_state(&applied).await?;
        tracing::debug!(file = %self.state_file.display(), "applied state persisted");
        Ok(())
    }

    /// Record that nothing is deployed any more: the baseline loses its
    /// builds and manifests and is written out, so the next pass sees every
    /// registered resource as added. The live state is untouched.
    pub async fn forget_resources(&self) -> Result<()> {
        let baseline = {
            let mut baseline = lock(&self.baseline);
            baseline.build_specs.clear();
            baseline.manifest_specs.clear();
            baseline.clone()
        };
        self.write_state(&baseline).await
    }

    async fn write_state(&self, state: &DesiredState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| LoopError::PersistError(e.to_string()))?;

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LoopError::PersistError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&self.state_file, format!("{}\n", json))
            .await
            .map_err(|e| {
                LoopError::PersistError(format!(
                    "cannot write {}: {}",
                    self.state_file.display(),
                    e
                ))
            })
    }
}
