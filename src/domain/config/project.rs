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

//! Project configuration file (`kubeloop.toml`)
//!
//! The file is the only source of registrations: `register_into` resets the
//! registered resources of the live state and re-registers everything the
//! file declares.

use crate::domain::build::BuildOptions;
use crate::domain::cluster::ClusterOptions;
use crate::domain::state::{BuildContext, HotReload, LiveStep, StateStore};
use crate::domain::sync::SyncOptions;
use crate::infrastructure::constants::{
    BUILD_TIMEOUT_SECS, COMMAND_TIMEOUT_SECS, DEBOUNCE_MS, DEFAULT_CONTAINER_ENGINE,
    DEFAULT_DOCKERFILE, DEFAULT_INSTANCE, NAMESPACE_TIMEOUT_SECS, PUSH_BASE_DELAY_MS,
    PUSH_MAX_ATTEMPTS, PUSH_MAX_DELAY_MS, READINESS_TIMEOUT_SECS, SESSION_STAGGER_MS,
};
use crate::infrastructure::container::RegistryAuth;
use crate::shared::error::{LoopError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub registry: Option<String>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    /// Discriminates the state file of this instance.
    pub instance: String,
    /// Container CLI binary, e.g. `docker` or `podman`.
    pub engine: String,
    pub kubeconfig: Option<String>,
    #[serde(rename = "build")]
    pub builds: Vec<BuildConf>,
    pub manifests: Vec<String>,
    pub settings: Settings,
    pub registry_auth: Option<RegistryAuthConf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            registry: None,
            context: None,
            namespace: None,
            instance: DEFAULT_INSTANCE.to_string(),
            engine: DEFAULT_CONTAINER_ENGINE.to_string(),
            kubeconfig: None,
            builds: Vec::new(),
            manifests: Vec::new(),
            settings: Settings::default(),
            registry_auth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConf {
    pub image: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub live: Option<LiveConf>,
}

fn default_context() -> String {
    ".".to_string()
}

fn default_dockerfile() -> String {
    DEFAULT_DOCKERFILE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConf {
    pub ignore: Vec<String>,
    pub steps: Vec<StepConf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepConf {
    Sync {
        src: String,
        dest: String,
    },
    Run {
        command: String,
        #[serde(default)]
        trigger: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryAuthConf {
    pub username: String,
    /// Environment variable holding the password.
    pub password_env: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub push_max_attempts: usize,
    pub push_base_delay_ms: u64,
    pub build_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
    pub namespace_timeout_secs: u64,
    pub debounce_ms: u64,
    pub session_stagger_ms: u64,
    pub max_concurrent_builds: Option<usize>,
    pub stop_on_first_error: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            push_max_attempts: PUSH_MAX_ATTEMPTS,
            push_base_delay_ms: PUSH_BASE_DELAY_MS,
            build_timeout_secs: BUILD_TIMEOUT_SECS,
            command_timeout_secs: COMMAND_TIMEOUT_SECS,
            readiness_timeout_secs: READINESS_TIMEOUT_SECS,
            namespace_timeout_secs: NAMESPACE_TIMEOUT_SECS,
            debounce_ms: DEBOUNCE_MS,
            session_stagger_ms: SESSION_STAGGER_MS,
            max_concurrent_builds: None,
            stop_on_first_error: false,
        }
    }
}

impl Settings {
    pub fn build_options(&self, registry_auth: Option<RegistryAuth>) -> BuildOptions {
        BuildOptions {
            push_max_attempts: self.push_max_attempts,
            push_base_delay: Duration::from_millis(self.push_base_delay_ms),
            push_max_delay: Duration::from_millis(PUSH_MAX_DELAY_MS),
            registry_auth,
        }
    }

    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            namespace_timeout: Duration::from_secs(self.namespace_timeout_secs),
            stop_on_first_error: self.stop_on_first_error,
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn session_stagger(&self) -> Duration {
        Duration::from_millis(self.session_stagger_ms)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoopError::config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance.trim().is_empty() {
            return Err(LoopError::config_error("instance must not be empty"));
        }
        if self.engine.trim().is_empty() {
            return Err(LoopError::config_error("engine must not be empty"));
        }
        if self.settings.max_concurrent_builds == Some(0) {
            return Err(LoopError::config_error(
                "settings.max_concurrent_builds must be at least 1",
            ));
        }

        let mut seen = BTreeSet::new();
        for build in &self.builds {
            if build.image.trim().is_empty() {
                return Err(LoopError::config_error("build.image must not be empty"));
            }
            if !seen.insert(build.image.trim()) {
                tracing::warn!(image = %build.image, "image declared twice, the last declaration wins");
            }
            for step in build.live.iter().flat_map(|l| l.steps.iter()) {
                if let StepConf::Sync { dest, .. } = step {
                    if !dest.starts_with('/') {
                        return Err(LoopError::config_error(format!(
                            "sync destination '{}' of image '{}' must be an absolute container path",
                            dest, build.image
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Directory holding the config file; relative paths resolve against it.
    pub fn project_root(config_path: &Path) -> PathBuf {
        match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn resolve_registry_auth(&self) -> Result<Option<RegistryAuth>> {
        let Some(auth) = &self.registry_auth else {
            return Ok(None);
        };
        let password = std::env::var(&auth.password_env).map_err(|_| {
            LoopError::config_error(format!(
                "registry password variable {} is not set",
                auth.password_env
            ))
        })?;
        Ok(Some(RegistryAuth {
            username: auth.username.clone(),
            password,
        }))
    }

    /// Reset registered resources, apply top-level settings, then register
    /// every build and manifest of this file.
    pub fn register_into(&self, store: &StateStore) -> Result<()> {
        store.clear_resources()?;

        if let Some(registry) = &self.registry {
            store.set_registry(registry)?;
        }
        if let Some(context) = &self.context {
            store.set_cluster_context(context)?;
        }
        if let Some(namespace) = &self.namespace {
            store.set_namespace(namespace)?;
        }

        for build in &self.builds {
            store.register_build(&build.image, build.build_context(), build.hot_reload())?;
        }
        if !self.manifests.is_empty() {
            store.register_manifest(&self.manifests)?;
        }
        Ok(())
    }
}

impl BuildConf {
    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            dir: self.context.clone(),
            dockerfile: self.dockerfile.clone(),
            args: self.args.clone(),
        }
    }

    pub fn hot_reload(&self) -> Option<HotReload> {
        let live = self.live.as_ref()?;
        Some(HotReload {
            ignore_patterns: live.ignore.iter().cloned().collect(),
            live_steps: live
                .steps
                .iter()
                .map(|step| match step {
                    StepConf::Sync { src, dest } => LiveStep::Sync {
                        src: src.clone(),
                        dest: dest.clone(),
                    },
                    StepConf::Run { command, trigger } => LiveStep::Run {
                        command: command.clone(),
                        trigger_patterns: trigger.iter().cloned().collect(),
                    },
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
registry = "registry.local:5000"
context = "kind-dev"
namespace = "My Team"
manifests = ["k8s"]

[settings]
push_max_attempts = 5
max_concurrent_builds = 2

[[build]]
image = "api"
context = "./api"
args = { VERSION = "1.2" }

[build.live]
ignore = ["**/*.pyc"]

[[build.live.steps]]
sync = { src = "src/**/*", dest = "/app/src" }

[[build.live.steps]]
run = { command = "pip install -r requirements.txt", trigger = ["requirements.txt"] }

[[build]]
image = "worker"
"#;

    #[test]
    fn test_parse_sample() {
        let config = ProjectConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.registry.as_deref(), Some("registry.local:5000"));
        assert_eq!(config.instance, DEFAULT_INSTANCE);
        assert_eq!(config.settings.push_max_attempts, 5);
        assert_eq!(config.settings.debounce_ms, DEBOUNCE_MS);
        assert_eq!(config.builds.len(), 2);

        let api = &config.builds[0];
        assert_eq!(api.dockerfile, DEFAULT_DOCKERFILE);
        let hot_reload = api.hot_reload().unwrap();
        assert_eq!(hot_reload.live_steps.len(), 2);
        assert!(matches!(hot_reload.live_steps[1], LiveStep::Run { .. }));

        let worker = &config.builds[1];
        assert_eq!(worker.context, ".");
        assert!(worker.hot_reload().is_none());
    }

    #[test]
    fn test_relative_sync_destination_is_rejected() {
        let err = ProjectConfig::from_toml(
            r#"
[[build]]
image = "api"
[build.live]
steps = [{ sync = { src = "src", dest = "app/src" } }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoopError::ConfigError(_)));
    }

    #[test]
    fn test_zero_build_cap_is_rejected() {
        assert!(ProjectConfig::from_toml("[settings]\nmax_concurrent_builds = 0\n").is_err());
    }

    #[test]
    fn test_project_root() {
        assert_eq!(ProjectConfig::project_root(Path::new("kubeloop.toml")), PathBuf::from("."));
        assert_eq!(
            ProjectConfig::project_root(Path::new("/work/app/kubeloop.toml")),
            PathBuf::from("/work/app")
        );
    }
}
