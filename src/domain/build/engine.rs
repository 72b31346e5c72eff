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

//! Image build pipeline: validate, build, verify, tag, push
//!
//! A failure at any step fails that image only; the caller decides how the
//! rest of the pass proceeds.

use crate::domain::state::BuildSpec;
use crate::infrastructure::constants::{PUSH_BASE_DELAY_MS, PUSH_MAX_ATTEMPTS, PUSH_MAX_DELAY_MS};
use crate::infrastructure::container::{ContainerEngine, ImageBuildRequest, RegistryAuth};
use crate::shared::error::{LoopError, Result};
use backon::{ExponentialBuilder, Retryable};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Total push attempts, the first one included.
    pub push_max_attempts: usize,
    pub push_base_delay: Duration,
    pub push_max_delay: Duration,
    pub registry_auth: Option<RegistryAuth>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            push_max_attempts: PUSH_MAX_ATTEMPTS,
            push_base_delay: Duration::from_millis(PUSH_BASE_DELAY_MS),
            push_max_delay: Duration::from_millis(PUSH_MAX_DELAY_MS),
            registry_auth: None,
        }
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub image_name: String,
    /// Reference the cluster pulls from.
    pub remote_reference: String,
    pub push_attempts: usize,
}

pub struct BuildEngine {
    engine: Arc<dyn ContainerEngine>,
    registry: String,
    project_root: PathBuf,
    options: BuildOptions,
    verified: OnceCell<()>,
}

impl BuildEngine {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: impl Into<String>,
        project_root: impl Into<PathBuf>,
        options: BuildOptions,
    ) -> Self {
        Self {
            engine,
            registry: registry.into(),
            project_root: project_root.into(),
            options,
            verified: OnceCell::new(),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// `<registry>/<image>`, or the bare image when no registry is set.
    pub fn remote_reference(&self, image_name: &str) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            image_name.to_string()
        } else {
            format!("{}/{}", registry, image_name)
        }
    }

    /// Probe the engine once; later calls reuse the first success.
    pub async fn verify_engine(&self) -> Result<()> {
        self.verified
            .get_or_try_init(|| async {
                self.engine
                    .ping()
                    .await
                    .map_err(|e| LoopError::EngineUnreachable(e.to_string()))
            })
            .await
            .map(|_| ())
    }

    pub async fn build(&self, spec: &BuildSpec) -> Result<BuiltImage> {
        self.verify_engine().await?;

        let image = spec.image_name.as_str();
        let request = self.build_request(spec)?;

        println!("→ Building image {}", image);
        if let Err(e) = self.engine.build(&request).await {
            self.discard(image).await;
            return Err(LoopError::build_failed(image, e.to_string()));
        }

        match self.engine.image_exists(image).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(LoopError::build_failed(
                    image,
                    "image not found locally after a successful build",
                ))
            }
            Err(e) => return Err(LoopError::build_failed(image, e.to_string())),
        }
        println!("✓ Built {}", image);

        let remote_reference = self.remote_reference(image);
        if remote_reference == image {
            tracing::warn!(image = %image, "no registry configured, image stays local");
            return Ok(BuiltImage {
                image_name: image.to_string(),
                remote_reference,
                push_attempts: 0,
            });
        }

        self.engine
            .tag(image, &remote_reference)
            .await
            .map_err(|e| LoopError::build_failed(image, format!("tag failed: {}", e)))?;

        let push_attempts = self.push_with_retry(image, &remote_reference).await?;
        println!("✓ Pushed {}", remote_reference);

        Ok(BuiltImage {
            image_name: image.to_string(),
            remote_reference,
            push_attempts,
        })
    }

    fn build_request(&self, spec: &BuildSpec) -> Result<ImageBuildRequest> {
        let image = spec.image_name.as_str();
        let context_dir = resolve(&self.project_root, &spec.build_context.dir);
        if !context_dir.is_dir() {
            return Err(LoopError::invalid_build_context(
                image,
                format!("context directory {} does not exist", context_dir.display()),
            ));
        }

        let dockerfile = resolve(&context_dir, &spec.build_context.dockerfile);
        if !dockerfile.is_file() {
            return Err(LoopError::invalid_build_context(
                image,
                format!("Dockerfile {} does not exist", dockerfile.display()),
            ));
        }

        Ok(ImageBuildRequest {
            image: image.to_string(),
            context_dir,
            dockerfile,
            args: spec.build_context.args.clone(),
        })
    }

    /// Push with exponential backoff. Returns the number of attempts made.
    async fn push_with_retry(&self, image: &str, reference: &str) -> Result<usize> {
        let max_attempts = self.options.push_max_attempts.max(1);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.options.push_base_delay)
            .with_max_delay(self.options.push_max_delay)
            .with_max_times(max_attempts - 1);

        let attempts = AtomicUsize::new(0);
        let counter = &attempts;
        let engine = &self.engine;
        let auth = self.options.registry_auth.as_ref();

        let result = (move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            engine.push(reference, auth).await
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|err: &LoopError, delay: Duration| {
            tracing::warn!(image = %reference, error = %err, delay_ms = delay.as_millis() as u64, "push failed, retrying");
        })
        .await;

        let made = attempts.load(Ordering::SeqCst);
        match result {
            Ok(()) => Ok(made),
            Err(e) => Err(LoopError::PushFailed {
                image: image.to_string(),
                attempts: made,
                reason: e.to_string(),
            }),
        }
    }

    /// Best-effort removal of the local image and its registry tag.
    pub async fn remove(&self, image_name: &str) {
        self.discard(image_name).await;
        let remote = self.remote_reference(image_name);
        if remote != image_name {
            self.discard(&remote).await;
        }
    }

    async fn discard(&self, reference: &str) {
        if let Err(e) = self.engine.remove(reference).await {
            tracing::debug!(image = %reference, error = %e, "image cleanup skipped");
        }
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
