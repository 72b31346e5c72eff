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

use crate::shared::error::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildRequest {
    pub image: String,
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

/// Capabilities the build pipeline needs from a container engine.
#[async_trait::async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;

    async fn build(&self, request: &ImageBuildRequest) -> Result<()>;

    async fn image_exists(&self, reference: &str) -> Result<bool>;

    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    async fn push(&self, reference: &str, auth: Option<&RegistryAuth>) -> Result<()>;

    async fn remove(&self, reference: &str) -> Result<()>;
}
