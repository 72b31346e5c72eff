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

use std::path::Path;
use thiserror::Error;
pub type Result<T> = std::result::Result<T, LoopError>;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("Container engine unreachable: {0}")]
    EngineUnreachable(String),

    #[error("Invalid manifest '{path}': {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Invalid build context for image '{image}': {reason}")]
    InvalidBuildContext { image: String, reason: String },

    #[error("Build failed for image '{image}': {reason}")]
    BuildFailed { image: String, reason: String },

    #[error("Push failed for image '{image}' after {attempts} attempt(s): {reason}")]
    PushFailed {
        image: String,
        attempts: usize,
        reason: String,
    },

    #[error("Readiness timeout: {0}")]
    ReadinessTimeout(String),

    #[error("No live sync target found for image '{0}'")]
    SyncTargetNotFound(String),

    #[error("Failed to persist state: {0}")]
    PersistError(String),

    #[error("Nothing to do: no builds or manifests registered")]
    NothingToDo,

    #[error("Command `{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<kube::Error> for LoopError {
    fn from(err: kube::Error) -> Self {
        LoopError::KubeError(err.to_string())
    }
}

impl LoopError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::ConfigError(context.into())
    }

    pub fn cluster_unreachable(context: impl Into<String>) -> Self {
        Self::ClusterUnreachable(context.into())
    }

    pub fn invalid_manifest(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_build_context(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBuildContext {
            image: image.into(),
            reason: reason.into(),
        }
    }

    pub fn build_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Errors that degrade the pass gracefully instead of failing a resource.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::ReadinessTimeout(_) | Self::SyncTargetNotFound(_) | Self::PersistError(_)
        )
    }
}
