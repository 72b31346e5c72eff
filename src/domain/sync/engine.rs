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

//! Live sessions: one debounced watch and one consumer task per image
//!
//! The watcher thread feeds coalesced paths into a bounded channel; a single
//! task per session turns each path into copy/exec actions against the live
//! container.

use super::plan::{relative_to, LiveAction, LiveSteps};
use crate::domain::state::BuildSpec;
use crate::infrastructure::constants::{
    DEBOUNCE_MS, FAILURE_LOG_TAIL_LINES, POD_PHASE_RUNNING, SYNC_EVENT_BUFFER,
};
use crate::infrastructure::kubernetes::ClusterApi;
use crate::shared::error::{LoopError, Result};
use colored::Colorize;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// The container a session drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTarget {
    pub pod: String,
    pub container: String,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub debounce: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEBOUNCE_MS),
        }
    }
}

pub struct LiveSession {
    pub image_name: String,
    pub target: LiveTarget,
    active: Arc<AtomicBool>,
    watcher: Option<Debouncer<RecommendedWatcher>>,
    worker: JoinHandle<()>,
}

impl LiveSession {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Deactivate, then release the watch. Dropping the watcher closes the
    /// channel, which ends the worker once in-flight actions complete.
    fn close(mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.watcher.take();
        if self.worker.is_finished() {
            tracing::debug!(image = %self.image_name, "live session worker already stopped");
        }
    }
}

/// Summary of one active session, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub image_name: String,
    pub target: LiveTarget,
}

/// What a single change event did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeOutcome {
    pub copied: usize,
    pub executed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct SyncEngine {
    api: Arc<dyn ClusterApi>,
    project_root: PathBuf,
    namespace: String,
    options: SyncOptions,
    sessions: Mutex<BTreeMap<String, LiveSession>>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        project_root: impl Into<PathBuf>,
        namespace: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            project_root: project_root.into(),
            namespace: namespace.into(),
            options,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// First running container whose image matches, by pod name.
    pub async fn find_target(&self, image_name: &str) -> Result<LiveTarget> {
        let mut pods = self
            .api
            .list_pods_for_image(image_name, &self.namespace)
            .await?;
        pods.retain(|p| p.phase == POD_PHASE_RUNNING);
        pods.sort_by(|a, b| a.pod.cmp(&b.pod).then_with(|| a.container.cmp(&b.container)));

        pods.into_iter()
            .next()
            .map(|p| LiveTarget {
                pod: p.pod,
                container: p.container,
                namespace: self.namespace.clone(),
            })
            .ok_or_else(|| LoopError::SyncTargetNotFound(image_name.to_string()))
    }

    /// Start (or replace) the live session of a build. A build without
    /// live steps is a no-op; a missing target is `SyncTargetNotFound`.
    pub async fn start(&self, spec: &BuildSpec) -> Result<()> {
        let Some(hot_reload) = spec.hot_reload.as_ref().filter(|h| !h.live_steps.is_empty())
        else {
            return Ok(());
        };
        let image = spec.image_name.as_str();
        let steps = Arc::new(LiveSteps::compile(hot_reload)?);

        self.stop(image).await;

        let target = self.find_target(image).await?;
        let context_dir = self.context_dir(spec)?;
        let (tx, rx) = mpsc::channel::<PathBuf>(SYNC_EVENT_BUFFER);

        let watched_image = image.to_string();
        let mut watcher = new_debouncer(self.options.debounce, move |res: DebounceEventResult| {
            match res {
                Ok(events) => {
                    for event in events {
                        if tx.blocking_send(event.path).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(image = %watched_image, error = %e, "file watch error"),
            }
        })
        .map_err(|e| LoopError::config_error(format!("cannot create file watcher: {}", e)))?;

        for root in steps.watch_roots(&context_dir) {
            watcher
                .watcher()
                .watch(&root, RecursiveMode::Recursive)
                .map_err(|e| {
                    LoopError::config_error(format!("cannot watch {}: {}", root.display(), e))
                })?;
            tracing::debug!(image = %image, root = %root.display(), "watching");
        }

        let active = Arc::new(AtomicBool::new(true));
        let worker = tokio::spawn(run_session(
            self.api.clone(),
            image.to_string(),
            target.clone(),
            steps,
            context_dir,
            rx,
            active.clone(),
        ));

        println!(
            "✓ Live sync {} → {}/{}",
            image.bold(),
            target.pod,
            target.container
        );
        self.sessions.lock().await.insert(
            image.to_string(),
            LiveSession {
                image_name: image.to_string(),
                target,
                active,
                watcher: Some(watcher),
                worker,
            },
        );
        Ok(())
    }

    fn context_dir(&self, spec: &BuildSpec) -> Result<PathBuf> {
        let dir = self.project_root.join(&spec.build_context.dir);
        dir.canonicalize().map_err(|e| {
            LoopError::invalid_build_context(
                &spec.image_name,
                format!("cannot resolve {}: {}", dir.display(), e),
            )
        })
    }

    /// Returns whether a session existed.
    pub async fn stop(&self, image_name: &str) -> bool {
        let session = self.sessions.lock().await.remove(image_name);
        match session {
            Some(session) => {
                session.close();
                tracing::info!(image = %image_name, "live session stopped");
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock().await);
        for (image, session) in sessions {
            session.close();
            tracing::info!(image = %image, "live session stopped");
        }
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.is_active())
            .map(|s| SessionInfo {
                image_name: s.image_name.clone(),
                target: s.target.clone(),
            })
            .collect()
    }

    pub async fn logs(&self, image_name: &str, tail_lines: i64) -> Result<String> {
        let target = self.find_target(image_name).await?;
        self.api
            .get_logs(&target.pod, &target.container, &target.namespace, tail_lines)
            .await
    }
}

async fn run_session(
    api: Arc<dyn ClusterApi>,
    image: String,
    target: LiveTarget,
    steps: Arc<LiveSteps>,
    context_dir: PathBuf,
    mut rx: mpsc::Receiver<PathBuf>,
    active: Arc<AtomicBool>,
) {
    while let Some(path) = rx.recv().await {
        if !active.load(Ordering::SeqCst) {
            tracing::debug!(image = %image, path = %path.display(), "session inactive, event dropped");
            continue;
        }
        let Some(rel) = relative_to(&context_dir, &path) else {
            continue;
        };
        apply_change(api.as_ref(), &image, &target, &steps, &context_dir, &rel).await;
    }
    tracing::debug!(image = %image, "live session worker finished");
}

/// Run the planned actions for one changed path, stopping at the first
/// failure so later steps never see a half-applied change.
pub async fn apply_change(
    api: &dyn ClusterApi,
    image: &str,
    target: &LiveTarget,
    steps: &LiveSteps,
    context_dir: &Path,
    rel_path: &str,
) -> ChangeOutcome {
    let mut outcome = ChangeOutcome::default();

    for action in steps.plan(context_dir, rel_path) {
        let result = match &action {
            LiveAction::Copy { local, remote } => {
                if !local.is_file() {
                    tracing::debug!(image = %image, path = %rel_path, "not a file, sync skipped");
                    continue;
                }
                api.copy_to_container(&target.pod, &target.container, &target.namespace, local, remote)
                    .await
                    .map(|_| outcome.copied += 1)
            }
            LiveAction::Exec { command } => {
                run_in_container(api, target, command).await.map(|_| outcome.executed += 1)
            }
        };

        match result {
            Ok(()) => println!("  {} {}: {}", "↻".cyan(), image, action),
            Err(e) => {
                outcome.failed += 1;
                outcome.errors.push(e.to_string());
                tracing::error!(image = %image, action = %action, error = %e, "live update failed");
                if matches!(action, LiveAction::Exec { .. }) {
                    print_log_tail(api, target).await;
                }
                break;
            }
        }
    }
    outcome
}

async fn run_in_container(api: &dyn ClusterApi, target: &LiveTarget, command: &str) -> Result<()> {
    let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
    let output = api
        .exec_in_container(&target.pod, &target.container, &target.namespace, &argv)
        .await?;
    if output.success {
        Ok(())
    } else {
        Err(LoopError::CommandFailed {
            command: command.to_string(),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

async fn print_log_tail(api: &dyn ClusterApi, target: &LiveTarget) {
    match api
        .get_logs(&target.pod, &target.container, &target.namespace, FAILURE_LOG_TAIL_LINES)
        .await
    {
        Ok(logs) if !logs.trim().is_empty() => {
            println!("  {} last log lines of {}:", "!".yellow(), target.pod);
            for line in logs.lines() {
                println!("  │ {}", line);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(pod = %target.pod, error = %e, "log tail unavailable"),
    }
}
