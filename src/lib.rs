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

// Core modules
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export commonly used types
pub use domain::build::{BuildEngine, BuildOptions, BuiltImage};
pub use domain::cluster::{ClusterManager, ClusterOptions, ValidationOutcome};
pub use domain::config::{ProjectConfig, Settings};
pub use domain::orchestrator::{Orchestrator, Phase, UpReport};
pub use domain::reconcile::{diff, ChangeKind, ChangeRecord};
pub use domain::state::{BuildContext, BuildSpec, DesiredState, HotReload, LiveStep, ManifestSpec};
pub use domain::state::{StateStore, StoreOptions};
pub use domain::sync::{SyncEngine, SyncOptions};
pub use infrastructure::container::{ContainerEngine, DockerCli};
pub use infrastructure::kubernetes::{ClusterApi, KubeClusterApi};
pub use shared::{LoopError, Result};
