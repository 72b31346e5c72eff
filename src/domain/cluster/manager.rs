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

use crate::domain::state::{normalize_namespace, ManifestSpec};
use crate::infrastructure::constants::{NAMESPACE_TIMEOUT_SECS, READINESS_TIMEOUT_SECS};
use crate::infrastructure::kubernetes::manifest::{resolve_manifest_files, WorkloadRef};
use crate::infrastructure::kubernetes::{ApplyMode, ClusterApi};
use crate::shared::error::{LoopError, Result};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Verification progress; each step is done at most once until invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClusterPhase {
    Unverified,
    ContextVerified,
    NamespaceReady,
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub readiness_timeout: Duration,
    pub namespace_timeout: Duration,
    /// Abort the remaining files of one `apply` call after the first failure.
    pub stop_on_first_error: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_secs(READINESS_TIMEOUT_SECS),
            namespace_timeout: Duration::from_secs(NAMESPACE_TIMEOUT_SECS),
            stop_on_first_error: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub spec: String,
    pub applied: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, LoopError)>,
    /// Readiness timeouts and other non-fatal findings.
    pub warnings: Vec<String>,
}

impl ApplyReport {
    fn new(spec: &str) -> Self {
        Self {
            spec: spec.to_string(),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Client-side validation result of one manifest file.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub spec: String,
    pub file: PathBuf,
    pub error: Option<LoopError>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ClusterManager {
    api: Arc<dyn ClusterApi>,
    context: String,
    namespace: String,
    project_root: PathBuf,
    options: ClusterOptions,
    phase: Mutex<ClusterPhase>,
}

impl ClusterManager {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        context: impl Into<String>,
        namespace: &str,
        project_root: impl Into<PathBuf>,
        options: ClusterOptions,
    ) -> Self {
        Self {
            api,
            context: context.into(),
            namespace: normalize_namespace(namespace),
            project_root: project_root.into(),
            options,
            phase: Mutex::new(ClusterPhase::Unverified),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn phase(&self) -> ClusterPhase {
        *self.phase.lock().await
    }

    /// Forget cached verification; the next call re-checks everything.
    pub async fn invalidate(&self) {
        *self.phase.lock().await = ClusterPhase::Unverified;
    }

    pub async fn verify_context(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        if *phase >= ClusterPhase::ContextVerified {
            return Ok(());
        }

        let contexts = self.api.list_contexts().await.map_err(|e| {
            LoopError::cluster_unreachable(format!("cannot read cluster contexts: {}", e))
        })?;
        if !contexts.iter().any(|c| c == &self.context) {
            return Err(LoopError::cluster_unreachable(format!(
                "context '{}' not found (known: {})",
                self.context,
                if contexts.is_empty() {
                    "none".to_string()
                } else {
                    contexts.join(", ")
                }
            )));
        }

        self.api.use_context(&self.context).await.map_err(|e| {
            LoopError::cluster_unreachable(format!(
                "cannot switch to context '{}': {}",
                self.context, e
            ))
        })?;
        self.api.probe().await.map_err(|e| {
            LoopError::cluster_unreachable(format!("context '{}': {}", self.context, e))
        })?;

        tracing::debug!(context = %self.context, "cluster context verified");
        *phase = ClusterPhase::ContextVerified;
        Ok(())
    }

    /// Create the namespace when missing. A slow namespace only warns.
    pub async fn ensure_namespace(&self) -> Result<()> {
        self.verify_context().await?;

        let mut phase = self.phase.lock().await;
        if *phase >= ClusterPhase::NamespaceReady {
            return Ok(());
        }

        let exists = self
            .api
            .namespace_exists(&self.namespace)
            .await
            .map_err(|e| LoopError::cluster_unreachable(e.to_string()))?;
        if !exists {
            self.api.create_namespace(&self.namespace).await.map_err(|e| {
                LoopError::cluster_unreachable(format!(
                    "cannot create namespace '{}': {}",
                    self.namespace, e
                ))
            })?;
            println!("✓ Namespace {} created", self.namespace);
            if let Err(e) = self
                .api
                .wait_namespace_active(&self.namespace, self.options.namespace_timeout)
                .await
            {
                tracing::warn!(namespace = %self.namespace, error = %e, "namespace not active yet, continuing");
            }
        }

        *phase = ClusterPhase::NamespaceReady;
        Ok(())
    }

    /// Validate then apply every file the spec resolves to, in sorted order,
    /// then wait for the declared workloads.
    ///
    /// Only cluster-level failures are returned as `Err`; per-file failures
    /// are collected in the report.
    pub async fn apply(&self, spec: &ManifestSpec) -> Result<ApplyReport> {
        self.ensure_namespace().await?;

        let mut report = ApplyReport::new(&spec.path);
        let files = resolve_manifest_files(&self.project_root, &spec.path);
        if files.is_empty() {
            tracing::warn!(manifest = %spec.path, "manifest resolved to no files, nothing applied");
            report
                .warnings
                .push(format!("{} resolved to no files", spec.path));
            return Ok(report);
        }

        for file in files {
            let shown = self.display_path(&file);
            if let Err(e) = self
                .api
                .apply_manifest(&file, &self.namespace, ApplyMode::Validate)
                .await
            {
                let err = as_invalid_manifest(&shown, e);
                tracing::error!(manifest = %shown, error = %err, "manifest failed validation, skipping file");
                report.failures.push((file, err));
                if self.options.stop_on_first_error {
                    break;
                }
                continue;
            }

            match self
                .api
                .apply_manifest(&file, &self.namespace, ApplyMode::Apply)
                .await
            {
                Ok(()) => {
                    println!("✓ Applied {}", shown);
                    report.applied.push(file);
                }
                Err(e) => {
                    tracing::error!(manifest = %shown, error = %e, "manifest apply failed");
                    report.failures.push((file, e));
                    if self.options.stop_on_first_error {
                        break;
                    }
                }
            }
        }

        report.warnings.extend(self.await_workloads(&report.applied).await);
        Ok(report)
    }

    async fn await_workloads(&self, files: &[PathBuf]) -> Vec<String> {
        let mut workloads: Vec<WorkloadRef> = Vec::new();
        for file in files {
            match self.api.workloads_in_manifest(file).await {
                Ok(found) => workloads.extend(found),
                Err(e) => tracing::debug!(manifest = %file.display(), error = %e, "workload discovery skipped"),
            }
        }
        workloads.sort();
        workloads.dedup();
        if workloads.is_empty() {
            return Vec::new();
        }

        println!("Waiting for {} workload(s) to become ready...", workloads.len());
        let waits = workloads.iter().map(|workload| async move {
            let namespace = workload.namespace.as_deref().unwrap_or(&self.namespace);
            let result = self
                .api
                .wait_for_ready(workload, namespace, self.options.readiness_timeout)
                .await;
            (workload, result)
        });

        let mut warnings = Vec::new();
        for (workload, result) in join_all(waits).await {
            match result {
                Ok(()) => println!("✓ {} ready", workload),
                Err(e) => {
                    tracing::warn!(workload = %workload, error = %e, "workload not ready, continuing");
                    warnings.push(format!("{}: {}", workload, e));
                }
            }
        }
        warnings
    }

    /// Best-effort delete of everything the path resolves to. Never fails.
    pub async fn delete(&self, path: &str) {
        if let Err(e) = self.verify_context().await {
            tracing::warn!(manifest = %path, error = %e, "skipping delete, cluster unreachable");
            return;
        }

        let files = resolve_manifest_files(&self.project_root, path);
        if files.is_empty() {
            tracing::warn!(manifest = %path, "manifest resolved to no files, nothing deleted");
            return;
        }
        for file in files.iter().rev() {
            let shown = self.display_path(file);
            match self.api.delete_manifest(file, &self.namespace).await {
                Ok(()) => println!("✓ Deleted {}", shown),
                Err(e) => {
                    tracing::warn!(manifest = %shown, error = %e, "delete failed, continuing teardown")
                }
            }
        }
    }

    /// Client-side validation of every file the specs resolve to.
    pub async fn validate_all<'a, I>(&self, specs: I) -> Vec<ValidationOutcome>
    where
        I: IntoIterator<Item = &'a ManifestSpec>,
    {
        let mut outcomes = Vec::new();
        for spec in specs {
            let files = resolve_manifest_files(&self.project_root, &spec.path);
            if files.is_empty() {
                tracing::warn!(manifest = %spec.path, "manifest resolved to no files");
            }
            for file in files {
                let error = self
                    .api
                    .apply_manifest(&file, &self.namespace, ApplyMode::Validate)
                    .await
                    .err()
                    .map(|e| as_invalid_manifest(&self.display_path(&file), e));
                outcomes.push(ValidationOutcome {
                    spec: spec.path.clone(),
                    file,
                    error,
                });
            }
        }
        outcomes
    }

    fn display_path(&self, file: &Path) -> String {
        file.strip_prefix(&self.project_root)
            .unwrap_or(file)
            .display()
            .to_string()
    }
}

fn as_invalid_manifest(path: &str, err: LoopError) -> LoopError {
    match err {
        LoopError::InvalidManifest { .. } => err,
        other => LoopError::invalid_manifest(path, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(ClusterPhase::Unverified < ClusterPhase::ContextVerified);
        assert!(ClusterPhase::ContextVerified < ClusterPhase::NamespaceReady);
    }

    #[test]
    fn test_other_errors_become_invalid_manifest() {
        let err = as_invalid_manifest("k8s/app.yaml", LoopError::KubeError("bad".to_string()));
        assert!(matches!(err, LoopError::InvalidManifest { ref path, .. } if path == "k8s/app.yaml"));

        let original = LoopError::invalid_manifest("x.yaml", "missing kind");
        match as_invalid_manifest("k8s/app.yaml", original) {
            LoopError::InvalidManifest { path, reason } => {
                assert_eq!(path, "x.yaml");
                assert_eq!(reason, "missing kind");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
