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

//! Reconciliation pass sequencing
//!
//! `up`: preflight, diff, build, deploy, live sync, persist.
//! `down`: stop sync, delete manifests, remove images.

use crate::domain::build::BuildEngine;
use crate::domain::cluster::{ClusterManager, ValidationOutcome};
use crate::domain::config::Settings;
use crate::domain::reconcile::{build_changes, diff, manifest_changes, ChangeRecord, CollectionChanges};
use crate::domain::state::{BuildSpec, DesiredState, ManifestSpec, StateStore};
use crate::domain::sync::SyncEngine;
use crate::infrastructure::container::{ContainerEngine, RegistryAuth};
use crate::infrastructure::kubernetes::ClusterApi;
use crate::shared::error::{LoopError, Result};
use futures::future::join_all;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running { dev_mode: bool },
}

/// Outcome of one resource category in a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub applied: Vec<String>,
    pub removed: Vec<String>,
    /// `(resource, reason)`
    pub failed: Vec<(String, String)>,
}

impl CategoryReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePlanEntry {
    pub image: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpReport {
    pub dry_run: bool,
    /// Set when the call was ignored because a pass is already running.
    pub skipped: bool,
    pub changes: Vec<ChangeRecord>,
    pub live_plan: Vec<LivePlanEntry>,
    pub builds: CategoryReport,
    pub manifests: CategoryReport,
    pub sessions: Vec<String>,
    pub warnings: Vec<String>,
    pub persisted: bool,
}

impl UpReport {
    pub fn success(&self) -> bool {
        self.builds.success() && self.manifests.success()
    }
}

pub struct Orchestrator {
    store: Arc<StateStore>,
    container: Arc<dyn ContainerEngine>,
    cluster_api: Arc<dyn ClusterApi>,
    settings: Settings,
    registry_auth: Option<RegistryAuth>,
    phase: Mutex<Phase>,
    sync: Mutex<Option<Arc<SyncEngine>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        container: Arc<dyn ContainerEngine>,
        cluster_api: Arc<dyn ClusterApi>,
        settings: Settings,
        registry_auth: Option<RegistryAuth>,
    ) -> Self {
        Self {
            store,
            container,
            cluster_api,
            settings,
            registry_auth,
            phase: Mutex::new(Phase::Idle),
            sync: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.lock().await
    }

    fn project_root(&self) -> PathBuf {
        self.store.project_root().to_path_buf()
    }

    fn cluster_manager(&self, state: &DesiredState) -> ClusterManager {
        ClusterManager::new(
            self.cluster_api.clone(),
            state.cluster_context.clone(),
            &state.namespace,
            self.project_root(),
            self.settings.cluster_options(),
        )
    }

    fn build_engine(&self, state: &DesiredState) -> BuildEngine {
        BuildEngine::new(
            self.container.clone(),
            state.registry.clone(),
            self.project_root(),
            self.settings.build_options(self.registry_auth.clone()),
        )
    }

    /// One reconciliation pass. With `dev_mode` the orchestrator stays
    /// running with live sessions after a successful pass.
    pub async fn up(&self, dry_run: bool, dev_mode: bool) -> Result<UpReport> {
        {
            let mut phase = self.phase.lock().await;
            if let Phase::Running { .. } = *phase {
                tracing::warn!("a reconciliation pass is already running, ignoring up");
                return Ok(UpReport {
                    skipped: true,
                    ..Default::default()
                });
            }
            *phase = Phase::Running { dev_mode };
        }

        let result = self.run_pass(dry_run, dev_mode).await;

        let keep_running =
            dev_mode && !dry_run && matches!(&result, Ok(report) if report.success());
        if !keep_running {
            *self.phase.lock().await = Phase::Idle;
        }
        result
    }

    async fn run_pass(&self, dry_run: bool, dev_mode: bool) -> Result<UpReport> {
        self.store.load().await;

        let baseline = self.store.snapshot_baseline();
        let current = self.store.current();
        if current.is_empty() {
            return Err(LoopError::NothingToDo);
        }

        let cluster = self.cluster_manager(&current);
        let builder = self.build_engine(&current);
        cluster.verify_context().await?;
        if !current.build_specs.is_empty() {
            builder.verify_engine().await?;
        }

        let changes = diff(&baseline, &current);
        let mut report = UpReport {
            dry_run,
            live_plan: live_plan(&current),
            ..Default::default()
        };
        for change in &changes {
            tracing::info!(change = %change, "planned change");
        }
        report.changes = changes;

        if dry_run {
            return Ok(report);
        }

        let builds = build_changes(&report.changes);
        let manifests = manifest_changes(&report.changes);
        if builds.is_empty() && manifests.is_empty() {
            println!("✓ Everything up to date");
        }

        report.builds = self.apply_builds(&builder, &builds).await;
        report.manifests = self.apply_manifests(&cluster, &manifests, &mut report.warnings).await;

        if report.success() && dev_mode {
            self.start_sessions(&current, &mut report).await;
        }

        if report.builds.success() || report.manifests.success() {
            let applied = applied_state(&baseline, &current, &report);
            match self.store.commit(applied).await {
                Ok(()) => report.persisted = true,
                Err(e) => {
                    tracing::warn!(error = %e, "state not persisted, applied changes are kept");
                    report.warnings.push(e.to_string());
                }
            }
        }

        Ok(report)
    }

    async fn apply_builds(
        &self,
        builder: &BuildEngine,
        changes: &CollectionChanges<BuildSpec>,
    ) -> CategoryReport {
        let mut report = CategoryReport::default();

        let tasks: Vec<_> = changes
            .to_apply()
            .map(|spec| async move { (spec.image_name.clone(), builder.build(spec).await) })
            .collect();
        let results = match self.settings.max_concurrent_builds {
            Some(limit) => {
                stream::iter(tasks)
                    .buffer_unordered(limit.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
            None => join_all(tasks).await,
        };

        for (image, result) in results {
            match result {
                Ok(_) => report.applied.push(image),
                Err(e) => {
                    tracing::error!(image = %image, error = %e, "build failed, continuing with other resources");
                    report.failed.push((image, e.to_string()));
                }
            }
        }
        report.applied.sort();

        for image in &changes.removed {
            builder.remove(image).await;
            println!("✓ Removed image {}", image);
            report.removed.push(image.clone());
        }
        report
    }

    async fn apply_manifests(
        &self,
        cluster: &ClusterManager,
        changes: &CollectionChanges<ManifestSpec>,
        warnings: &mut Vec<String>,
    ) -> CategoryReport {
        let mut report = CategoryReport::default();

        for spec in changes.to_apply() {
            match cluster.apply(spec).await {
                Ok(applied) => {
                    warnings.extend(applied.warnings.iter().cloned());
                    if applied.success() {
                        report.applied.push(spec.path.clone());
                    }
                    for (file, err) in applied.failures {
                        report.failed.push((file.display().to_string(), err.to_string()));
                    }
                }
                Err(e) => {
                    tracing::error!(manifest = %spec.path, error = %e, "manifest apply failed");
                    let fatal = matches!(e, LoopError::ClusterUnreachable(_));
                    report.failed.push((spec.path.clone(), e.to_string()));
                    if fatal {
                        break;
                    }
                }
            }
        }

        for path in &changes.removed {
            cluster.delete(path).await;
            report.removed.push(path.clone());
        }
        report
    }

    async fn start_sessions(&self, state: &DesiredState, report: &mut UpReport) {
        let sync = {
            let mut slot = self.sync.lock().await;
            slot.get_or_insert_with(|| {
                Arc::new(SyncEngine::new(
                    self.cluster_api.clone(),
                    self.project_root(),
                    state.namespace.clone(),
                    self.settings.sync_options(),
                ))
            })
            .clone()
        };

        for (index, spec) in state.live_builds().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.session_stagger()).await;
            }
            match sync.start(spec).await {
                Ok(()) => report.sessions.push(spec.image_name.clone()),
                Err(e) if e.is_warning() => {
                    tracing::warn!(image = %spec.image_name, error = %e, "live sync not started");
                    report.warnings.push(e.to_string());
                }
                Err(e) => {
                    tracing::error!(image = %spec.image_name, error = %e, "live sync failed to start");
                    report.warnings.push(e.to_string());
                }
            }
        }
    }

    /// Stop live sessions and leave dev mode; deployed resources stay.
    pub async fn stop_sessions(&self) {
        if let Some(sync) = self.sync.lock().await.take() {
            sync.stop_all().await;
        }
        *self.phase.lock().await = Phase::Idle;
    }

    /// Tear everything down. Never fails; always ends Idle.
    pub async fn down(&self) {
        self.store.load().await;
        if let Some(sync) = self.sync.lock().await.take() {
            sync.stop_all().await;
        }

        let state = self.store.current();
        let cluster = self.cluster_manager(&state);
        join_all(state.manifest_specs.keys().map(|path| cluster.delete(path))).await;

        let builder = &self.build_engine(&state);
        join_all(state.build_specs.keys().map(|image| async move {
            builder.remove(image).await;
            println!("✓ Removed image {}", image);
        }))
        .await;

        if let Err(e) = self.store.forget_resources().await {
            tracing::warn!(error = %e, "teardown not recorded in state file");
        }
        *self.phase.lock().await = Phase::Idle;
    }

    /// Client-side validation of every registered manifest.
    pub async fn validate(&self) -> Vec<ValidationOutcome> {
        self.store.load().await;
        let state = self.store.current();
        self.cluster_manager(&state)
            .validate_all(state.manifest_specs.values())
            .await
    }

    pub async fn logs(&self, image_name: &str, tail_lines: i64) -> Result<String> {
        self.store.load().await;
        let state = self.store.current();
        self.cluster_manager(&state).verify_context().await?;

        let sync = SyncEngine::new(
            self.cluster_api.clone(),
            self.project_root(),
            state.namespace.clone(),
            self.settings.sync_options(),
        );
        sync.logs(image_name, tail_lines).await
    }
}

/// The state actually deployed after a pass: successful entries take their
/// live value, failed or skipped ones keep their baseline value (or stay
/// absent when new), removed ones are dropped.
fn applied_state(
    baseline: &DesiredState,
    current: &DesiredState,
    report: &UpReport,
) -> DesiredState {
    DesiredState {
        build_specs: settle(&baseline.build_specs, &current.build_specs, &report.builds.applied),
        manifest_specs: settle(
            &baseline.manifest_specs,
            &current.manifest_specs,
            &report.manifests.applied,
        ),
        ..current.clone()
    }
}

fn settle<T: Clone + PartialEq>(
    baseline: &BTreeMap<String, T>,
    current: &BTreeMap<String, T>,
    applied: &[String],
) -> BTreeMap<String, T> {
    current
        .iter()
        .filter_map(|(key, value)| {
            let unchanged = baseline.get(key) == Some(value);
            if unchanged || applied.contains(key) {
                Some((key.clone(), value.clone()))
            } else {
                baseline.get(key).map(|old| (key.clone(), old.clone()))
            }
        })
        .collect()
}

fn live_plan(state: &DesiredState) -> Vec<LivePlanEntry> {
    state
        .live_builds()
        .map(|spec| LivePlanEntry {
            image: spec.image_name.clone(),
            steps: spec
                .hot_reload
                .iter()
                .flat_map(|h| h.live_steps.iter())
                .map(|step| step.to_string())
                .collect(),
        })
        .collect()
}
