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

/// Project files
pub const DEFAULT_CONFIG_FILE: &str = "kubeloop.toml";
pub const CONFIG_FILE_ENV: &str = "KUBELOOP_CONFIG";
pub const STATE_DIR: &str = ".kubeloop";
pub const STATE_FILE_PREFIX: &str = "state-";
pub const DEFAULT_INSTANCE: &str = "10350";

/// Desired state defaults
pub const DEFAULT_REGISTRY: &str = "localhost:5000";
pub const DEFAULT_CONTEXT: &str = "docker-desktop";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Namespace naming
pub const NAMESPACE_MAX_LEN: usize = 63;
pub const NAMESPACE_PREFIX: &str = "ns-";
pub const NAMESPACE_SUFFIX: &str = "-ns";

/// Container engine
pub const DEFAULT_CONTAINER_ENGINE: &str = "docker";

/// Push retry
pub const PUSH_MAX_ATTEMPTS: usize = 3;
pub const PUSH_BASE_DELAY_MS: u64 = 1000;
pub const PUSH_MAX_DELAY_MS: u64 = 30_000;

/// Timeouts
pub const BUILD_TIMEOUT_SECS: u64 = 1800;
pub const COMMAND_TIMEOUT_SECS: u64 = 120;
pub const READINESS_TIMEOUT_SECS: u64 = 120;
pub const NAMESPACE_TIMEOUT_SECS: u64 = 30;
pub const READINESS_POLL_INTERVAL_MS: u64 = 2000;

/// Live sync
pub const DEBOUNCE_MS: u64 = 300;
pub const SESSION_STAGGER_MS: u64 = 1000;
pub const SYNC_EVENT_BUFFER: usize = 256;
pub const FAILURE_LOG_TAIL_LINES: i64 = 20;
pub const DEFAULT_LOG_TAIL_LINES: i64 = 100;

/// Kubernetes
pub const FIELD_MANAGER: &str = "kubeloop";
pub const POD_PHASE_RUNNING: &str = "Running";
pub const NAMESPACE_PHASE_ACTIVE: &str = "Active";
pub const MANIFEST_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Workload kinds that report readiness
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_STATEFULSET: &str = "StatefulSet";
pub const KIND_DAEMONSET: &str = "DaemonSet";
