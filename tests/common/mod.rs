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

//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use kubeloop::infrastructure::container::{ContainerEngine, ImageBuildRequest, RegistryAuth};
use kubeloop::infrastructure::kubernetes::{
    ApplyMode, ClusterApi, ExecOutput, PodTarget, WorkloadRef,
};
use kubeloop::{LoopError, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Records every call as a short string, e.g. `build app`, `push localhost:5000/app`.
#[derive(Default)]
pub struct FakeContainerEngine {
    pub calls: Mutex<Vec<String>>,
    pub built: Mutex<BTreeSet<String>>,
    pub ping_fails: bool,
    pub build_fails: bool,
    /// Number of leading push calls that fail; `usize::MAX` fails forever.
    pub push_failures: usize,
    pub remove_fails: bool,
    pub push_calls: AtomicUsize,
}

impl FakeContainerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ContainerEngine for FakeContainerEngine {
    async fn ping(&self) -> Result<()> {
        self.record("ping".to_string());
        if self.ping_fails {
            return Err(LoopError::Timeout("engine did not answer".to_string()));
        }
        Ok(())
    }

    async fn build(&self, request: &ImageBuildRequest) -> Result<()> {
        self.record(format!("build {}", request.image));
        if self.build_fails {
            return Err(LoopError::CommandFailed {
                command: "docker build".to_string(),
                code: 1,
                stderr: "step 2/5 failed".to_string(),
            });
        }
        self.built.lock().unwrap().insert(request.image.clone());
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.built.lock().unwrap().contains(reference))
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.record(format!("tag {} {}", source, target));
        Ok(())
    }

    async fn push(&self, reference: &str, _auth: Option<&RegistryAuth>) -> Result<()> {
        self.record(format!("push {}", reference));
        let made = self.push_calls.fetch_add(1, Ordering::SeqCst);
        if made < self.push_failures {
            return Err(LoopError::CommandFailed {
                command: "docker push".to_string(),
                code: 1,
                stderr: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        self.record(format!("remove {}", reference));
        if self.remove_fails {
            return Err(LoopError::CommandFailed {
                command: "docker rmi".to_string(),
                code: 1,
                stderr: "no such image".to_string(),
            });
        }
        Ok(())
    }
}

/// Records calls as `apply <file>`, `validate <file>`, `delete <file>`,
/// `copy <local-file-name> <remote>`, `exec <command>` and so on.
pub struct FakeClusterApi {
    pub calls: Mutex<Vec<String>>,
    pub contexts: Vec<String>,
    pub namespace_exists: bool,
    pub create_namespace_fails: bool,
    /// File names rejected by client-side validation.
    pub invalid_files: Vec<String>,
    pub delete_fails: bool,
    pub exec_succeeds: bool,
    /// Exit code reported when `exec_succeeds` is false.
    pub exec_exit_code: i32,
    pub pods: Vec<PodTarget>,
    pub workloads: Vec<WorkloadRef>,
    pub logs: String,
}

impl Default for FakeClusterApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            contexts: vec!["docker-desktop".to_string()],
            namespace_exists: true,
            create_namespace_fails: false,
            invalid_files: Vec::new(),
            delete_fails: false,
            exec_succeeds: true,
            exec_exit_code: 1,
            pods: Vec::new(),
            workloads: Vec::new(),
            logs: String::new(),
        }
    }
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running_pod(pod: &str, container: &str, image: &str) -> PodTarget {
        PodTarget {
            pod: pod.to_string(),
            container: container.to_string(),
            image: image.to_string(),
            phase: "Running".to_string(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ClusterApi for FakeClusterApi {
    async fn list_contexts(&self) -> Result<Vec<String>> {
        self.record("list_contexts".to_string());
        Ok(self.contexts.clone())
    }

    async fn use_context(&self, name: &str) -> Result<()> {
        self.record(format!("use_context {}", name));
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        self.record("probe".to_string());
        Ok(())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.record(format!("namespace_exists {}", namespace));
        Ok(self.namespace_exists)
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        self.record(format!("create_namespace {}", namespace));
        if self.create_namespace_fails {
            return Err(LoopError::KubeError("forbidden: namespaces".to_string()));
        }
        Ok(())
    }

    async fn wait_namespace_active(&self, _namespace: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn apply_manifest(&self, file: &Path, _namespace: &str, mode: ApplyMode) -> Result<()> {
        let name = file_name(file);
        match mode {
            ApplyMode::Validate => {
                self.record(format!("validate {}", name));
                if self.invalid_files.contains(&name) {
                    return Err(LoopError::invalid_manifest(file, "missing field `kind`"));
                }
            }
            ApplyMode::Apply => self.record(format!("apply {}", name)),
        }
        Ok(())
    }

    async fn delete_manifest(&self, file: &Path, _namespace: &str) -> Result<()> {
        self.record(format!("delete {}", file_name(file)));
        if self.delete_fails {
            return Err(LoopError::KubeError("the server is gone".to_string()));
        }
        Ok(())
    }

    async fn workloads_in_manifest(&self, _file: &Path) -> Result<Vec<WorkloadRef>> {
        Ok(self.workloads.clone())
    }

    async fn wait_for_ready(
        &self,
        workload: &WorkloadRef,
        _namespace: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.record(format!("wait {}", workload));
        Err(LoopError::ReadinessTimeout(workload.to_string()))
    }

    async fn list_pods_for_image(&self, image: &str, _namespace: &str) -> Result<Vec<PodTarget>> {
        Ok(self
            .pods
            .iter()
            .filter(|p| kubeloop::infrastructure::kubernetes::image_matches(&p.image, image))
            .cloned()
            .collect())
    }

    async fn exec_in_container(
        &self,
        _pod: &str,
        _container: &str,
        _namespace: &str,
        command: &[String],
    ) -> Result<ExecOutput> {
        self.record(format!("exec {}", command.last().cloned().unwrap_or_default()));
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: if self.exec_succeeds {
                String::new()
            } else {
                "exit status 1".to_string()
            },
            success: self.exec_succeeds,
            code: Some(if self.exec_succeeds { 0 } else { self.exec_exit_code }),
        })
    }

    async fn copy_to_container(
        &self,
        _pod: &str,
        _container: &str,
        _namespace: &str,
        local: &Path,
        remote: &str,
    ) -> Result<()> {
        self.record(format!("copy {} {}", file_name(local), remote));
        Ok(())
    }

    async fn get_logs(
        &self,
        pod: &str,
        _container: &str,
        _namespace: &str,
        tail_lines: i64,
    ) -> Result<String> {
        self.record(format!("logs {} {}", pod, tail_lines));
        Ok(self.logs.clone())
    }
}
