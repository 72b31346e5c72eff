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

use super::manifest::{self, split_api_version, ManifestDocument, WorkloadRef};
use crate::infrastructure::constants::{
    FIELD_MANAGER, KIND_DAEMONSET, KIND_DEPLOYMENT, KIND_STATEFULSET, NAMESPACE_PHASE_ACTIVE,
    READINESS_POLL_INTERVAL_MS,
};
use crate::shared::error::LoopError;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{
    AttachParams, DeleteParams, DynamicObject, LogParams, ObjectMeta, Patch, PatchParams,
    PostParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::{Api, Client};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Client-side validation only; nothing reaches the API server.
    Validate,
    Apply,
}

/// A container of a pod, as seen when looking for live-sync targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub pod: String,
    pub container: String,
    pub image: String,
    pub phase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// Exit code when the API server reported one.
    pub code: Option<i32>,
}

#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_contexts(&self) -> Result<Vec<String>, LoopError>;

    async fn use_context(&self, name: &str) -> Result<(), LoopError>;

    /// Connectivity probe against the active context.
    async fn probe(&self) -> Result<(), LoopError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, LoopError>;

    async fn create_namespace(&self, namespace: &str) -> Result<(), LoopError>;

    async fn wait_namespace_active(&self, namespace: &str, timeout: Duration)
        -> Result<(), LoopError>;

    async fn apply_manifest(
        &self,
        file: &Path,
        namespace: &str,
        mode: ApplyMode,
    ) -> Result<(), LoopError>;

    async fn delete_manifest(&self, file: &Path, namespace: &str) -> Result<(), LoopError>;

    async fn workloads_in_manifest(&self, file: &Path) -> Result<Vec<WorkloadRef>, LoopError>;

    async fn wait_for_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), LoopError>;

    async fn list_pods_for_image(
        &self,
        image: &str,
        namespace: &str,
    ) -> Result<Vec<PodTarget>, LoopError>;

    async fn exec_in_container(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        command: &[String],
    ) -> Result<ExecOutput, LoopError>;

    async fn copy_to_container(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), LoopError>;

    async fn get_logs(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        tail_lines: i64,
    ) -> Result<String, LoopError>;
}

/// `ClusterApi` over the Kubernetes API with kubeconfig contexts.
pub struct KubeClusterApi {
    kubeconfig_path: Option<String>,
    client: RwLock<Option<Client>>,
}

impl KubeClusterApi {
    pub fn new(kubeconfig_path: Option<String>) -> Self {
        Self {
            kubeconfig_path,
            client: RwLock::new(None),
        }
    }

    fn read_kubeconfig(&self) -> Result<Kubeconfig, LoopError> {
        let kubeconfig = match self.kubeconfig_path {
            Some(ref path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        };
        kubeconfig.map_err(|e| {
            LoopError::cluster_unreachable(format!("Failed to load kubeconfig: {}", e))
        })
    }

    async fn client(&self) -> Result<Client, LoopError> {
        self.client.read().await.clone().ok_or_else(|| {
            LoopError::cluster_unreachable("no Kubernetes context selected".to_string())
        })
    }

    async fn dynamic_api(
        &self,
        doc: &ManifestDocument,
        namespace: &str,
    ) -> Result<Api<DynamicObject>, LoopError> {
        let client = self.client().await?;
        let (group, version) = split_api_version(&doc.api_version);
        let gvk = GroupVersionKind::gvk(group, version, &doc.kind);
        let (resource, capabilities) = discovery::pinned_kind(&client, &gvk).await?;

        Ok(match capabilities.scope {
            Scope::Cluster => Api::all_with(client, &resource),
            Scope::Namespaced => {
                let ns = doc.namespace.as_deref().unwrap_or(namespace);
                Api::namespaced_with(client, ns, &resource)
            }
        })
    }

    async fn is_ready(&self, workload: &WorkloadRef, namespace: &str) -> Result<bool, LoopError> {
        let client = self.client().await?;
        let ns = workload.namespace.as_deref().unwrap_or(namespace);

        let ready = match workload.kind.as_str() {
            KIND_DEPLOYMENT => {
                let api: Api<Deployment> = Api::namespaced(client, ns);
                let deployment = api.get(&workload.name).await?;
                let desired = deployment.spec.and_then(|s| s.replicas).unwrap_or(1);
                let ready = deployment
                    .status
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0);
                ready >= desired
            }
            KIND_STATEFULSET => {
                let api: Api<StatefulSet> = Api::namespaced(client, ns);
                let statefulset = api.get(&workload.name).await?;
                let desired = statefulset.spec.and_then(|s| s.replicas).unwrap_or(1);
                let ready = statefulset
                    .status
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0);
                ready >= desired
            }
            KIND_DAEMONSET => {
                let api: Api<DaemonSet> = Api::namespaced(client, ns);
                let daemonset = api.get(&workload.name).await?;
                daemonset
                    .status
                    .map(|s| s.number_ready >= s.desired_number_scheduled)
                    .unwrap_or(false)
            }
            _ => true,
        };
        Ok(ready)
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_contexts(&self) -> Result<Vec<String>, LoopError> {
        let kubeconfig = self.read_kubeconfig()?;
        Ok(kubeconfig
            .contexts
            .into_iter()
            .map(|context| context.name)
            .collect())
    }

    async fn use_context(&self, name: &str) -> Result<(), LoopError> {
        let kubeconfig = self.read_kubeconfig()?;
        let options = KubeConfigOptions {
            context: Some(name.to_string()),
            cluster: None,
            user: None,
        };

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| {
                LoopError::cluster_unreachable(format!(
                    "Failed to create Kubernetes config for context '{}': {}",
                    name, e
                ))
            })?;
        let client = Client::try_from(config).map_err(|e| {
            LoopError::cluster_unreachable(format!("Failed to create Kubernetes client: {}", e))
        })?;

        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn probe(&self) -> Result<(), LoopError> {
        let client = self.client().await?;
        let version = client.apiserver_version().await.map_err(|e| {
            LoopError::cluster_unreachable(format!("API server did not respond: {}", e))
        })?;
        tracing::debug!(version = %version.git_version, "cluster reachable");
        Ok(())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, LoopError> {
        let api: Api<Namespace> = Api::all(self.client().await?);
        match api.get(namespace).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(LoopError::KubeError(e.to_string())),
        }
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), LoopError> {
        let api: Api<Namespace> = Api::all(self.client().await?);
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(LoopError::KubeError(e.to_string())),
        }
    }

    async fn wait_namespace_active(
        &self,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), LoopError> {
        let api: Api<Namespace> = Api::all(self.client().await?);
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            if let Ok(ns) = api.get(namespace).await {
                let phase = ns.status.and_then(|s| s.phase);
                if phase.as_deref() == Some(NAMESPACE_PHASE_ACTIVE) {
                    return Ok(());
                }
            }
            sleep(Duration::from_millis(READINESS_POLL_INTERVAL_MS)).await;
        }

        Err(LoopError::ReadinessTimeout(format!(
            "namespace {} not active within {}s",
            namespace,
            timeout.as_secs()
        )))
    }

    async fn apply_manifest(
        &self,
        file: &Path,
        namespace: &str,
        mode: ApplyMode,
    ) -> Result<(), LoopError> {
        let documents = manifest::parse_documents(file)?;
        if mode == ApplyMode::Validate {
            return Ok(());
        }

        let patch_params = PatchParams::apply(FIELD_MANAGER).force();
        for doc in &documents {
            let api = self.dynamic_api(doc, namespace).await?;
            let object: DynamicObject = serde_yaml::from_value(doc.body.clone())?;
            api.patch(&doc.name, &patch_params, &Patch::Apply(&object))
                .await
                .map_err(|e| {
                    LoopError::KubeError(format!(
                        "Failed to apply {} '{}' from {}: {}",
                        doc.kind,
                        doc.name,
                        file.display(),
                        e
                    ))
                })?;
        }
        Ok(())
    }

    async fn delete_manifest(&self, file: &Path, namespace: &str) -> Result<(), LoopError> {
        let documents = manifest::parse_documents(file)?;
        let dp = DeleteParams::default();

        // Reverse order so dependents go before what they depend on.
        for doc in documents.iter().rev() {
            let api = self.dynamic_api(doc, namespace).await?;
            match api.delete(&doc.name, &dp).await {
                Ok(_) => {}
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => return Err(LoopError::KubeError(e.to_string())),
            }
        }
        Ok(())
    }

    async fn workloads_in_manifest(&self, file: &Path) -> Result<Vec<WorkloadRef>, LoopError> {
        Ok(manifest::workloads(&manifest::parse_documents(file)?))
    }

    async fn wait_for_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), LoopError> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            match self.is_ready(workload, namespace).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => tracing::debug!(workload = %workload, error = %e, "readiness check failed"),
            }
            sleep(Duration::from_millis(READINESS_POLL_INTERVAL_MS)).await;
        }

        Err(LoopError::ReadinessTimeout(format!(
            "{} did not become ready within {}s",
            workload,
            timeout.as_secs()
        )))
    }

    async fn list_pods_for_image(
        &self,
        image: &str,
        namespace: &str,
    ) -> Result<Vec<PodTarget>, LoopError> {
        let api: Api<Pod> = Api::namespaced(self.client().await?, namespace);
        let pods = api.list(&Default::default()).await?;

        let mut targets = Vec::new();
        for pod in pods.items {
            let name = pod.metadata.name.clone().unwrap_or_default();
            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_default();
            let containers = pod.spec.map(|s| s.containers).unwrap_or_default();
            for container in containers {
                let container_image = container.image.unwrap_or_default();
                if image_matches(&container_image, image) {
                    targets.push(PodTarget {
                        pod: name.clone(),
                        container: container.name,
                        image: container_image,
                        phase: phase.clone(),
                    });
                }
            }
        }
        Ok(targets)
    }

    async fn exec_in_container(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        command: &[String],
    ) -> Result<ExecOutput, LoopError> {
        let api: Api<Pod> = Api::namespaced(self.client().await?, namespace);
        let params = AttachParams::default()
            .container(container)
            .stdout(true)
            .stderr(true);

        let mut attached = api.exec(pod, command.to_vec(), &params).await?;
        let (stdout, stderr) = tokio::join!(
            read_to_string(attached.stdout()),
            read_to_string(attached.stderr())
        );
        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| LoopError::KubeError(format!("exec in {}/{} failed: {}", pod, container, e)))?;

        let success = status
            .as_ref()
            .and_then(|s| s.status.as_deref())
            .map(|s| s == "Success")
            .unwrap_or(false);
        let code = if success {
            Some(0)
        } else {
            status.as_ref().and_then(exit_code)
        };
        Ok(ExecOutput {
            stdout,
            stderr,
            success,
            code,
        })
    }

    async fn copy_to_container(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), LoopError> {
        let content = tokio::fs::read(local).await?;
        let api: Api<Pod> = Api::namespaced(self.client().await?, namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(true)
            .stdout(false)
            .stderr(true);

        let script = format!(
            "mkdir -p \"$(dirname '{remote}')\" && cat > '{remote}'",
            remote = remote.replace('\'', "'\\''")
        );
        let command = vec!["sh".to_string(), "-c".to_string(), script];

        let mut attached = api.exec(pod, command, &params).await?;
        if let Some(mut stdin) = attached.stdin() {
            stdin.write_all(&content).await?;
            stdin.shutdown().await?;
        }
        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| LoopError::KubeError(format!("copy to {}/{} failed: {}", pod, container, e)))?;

        match status.and_then(|s| s.status) {
            Some(ref s) if s == "Success" => Ok(()),
            other => Err(LoopError::KubeError(format!(
                "copy of {} to {}:{} ended with status {:?}",
                local.display(),
                pod,
                remote,
                other
            ))),
        }
    }

    async fn get_logs(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        tail_lines: i64,
    ) -> Result<String, LoopError> {
        let api: Api<Pod> = Api::namespaced(self.client().await?, namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(tail_lines),
            ..Default::default()
        };
        Ok(api.logs(pod, &params).await?)
    }
}

/// Exit code from the `ExitCode` cause of a failed exec status.
fn exit_code(status: &Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_deref()?
        .trim()
        .parse()
        .ok()
}

async fn read_to_string<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buffer = String::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_string(&mut buffer).await {
            tracing::debug!(error = %e, "failed to read exec stream");
        }
    }
    buffer
}

/// Whether a container image reference points at `image`, ignoring registry
/// host, tag and digest.
pub fn image_matches(container_image: &str, image: &str) -> bool {
    let repository = |reference: &str| -> String {
        let without_digest = reference.split('@').next().unwrap_or(reference);
        let last_slash = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
        match without_digest[last_slash..].rfind(':') {
            Some(colon) => without_digest[..last_slash + colon].to_string(),
            None => without_digest.to_string(),
        }
    };

    let wanted = repository(image);
    let actual = repository(container_image);
    actual == wanted || actual.ends_with(&format!("/{}", wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    #[test]
    fn test_image_matches() {
        assert!(image_matches("localhost:5000/app:latest", "app"));
        assert!(image_matches("app", "app"));
        assert!(image_matches("app:dev", "app:latest"));
        assert!(image_matches("registry.io/team/app@sha256:abc", "app"));
        assert!(!image_matches("localhost:5000/my-app:latest", "app"));
        assert!(!image_matches("localhost:5000/app-worker", "app"));
    }

    #[test]
    fn test_exit_code_from_failed_exec_status() {
        let status = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("127".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(exit_code(&status), Some(127));
        assert_eq!(exit_code(&Status::default()), None);
    }
}
