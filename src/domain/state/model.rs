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

//! Desired-state document
//!
//! All collections are ordered (`BTreeMap`/`BTreeSet`) so that a persisted
//! document serializes byte-identically on every write.

use crate::infrastructure::constants::{
    DEFAULT_CONTEXT, DEFAULT_DOCKERFILE, DEFAULT_NAMESPACE, DEFAULT_REGISTRY,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    pub registry: String,
    pub cluster_context: String,
    pub namespace: String,
    pub build_specs: BTreeMap<String, BuildSpec>,
    pub manifest_specs: BTreeMap<String, ManifestSpec>,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            cluster_context: DEFAULT_CONTEXT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            build_specs: BTreeMap::new(),
            manifest_specs: BTreeMap::new(),
        }
    }
}

impl DesiredState {
    pub fn is_empty(&self) -> bool {
        self.build_specs.is_empty() && self.manifest_specs.is_empty()
    }

    /// Builds that declare at least one live step.
    pub fn live_builds(&self) -> impl Iterator<Item = &BuildSpec> {
        self.build_specs.values().filter(|spec| spec.has_live_steps())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub image_name: String,
    pub build_context: BuildContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_reload: Option<HotReload>,
}

impl BuildSpec {
    pub fn has_live_steps(&self) -> bool {
        self.hot_reload
            .as_ref()
            .map(|h| !h.live_steps.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildContext {
    pub dir: String,
    /// Relative to `dir`.
    pub dockerfile: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl BuildContext {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            args: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotReload {
    #[serde(default)]
    pub ignore_patterns: BTreeSet<String>,
    #[serde(default)]
    pub live_steps: Vec<LiveStep>,
}

/// One live-update action; declaration order is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveStep {
    Sync {
        src: String,
        dest: String,
    },
    Run {
        command: String,
        #[serde(rename = "triggerPatterns")]
        trigger_patterns: BTreeSet<String>,
    },
}

impl fmt::Display for LiveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveStep::Sync { src, dest } => write!(f, "sync {} → {}", src, dest),
            LiveStep::Run {
                command,
                trigger_patterns,
            } if trigger_patterns.is_empty() => write!(f, "run `{}`", command),
            LiveStep::Run {
                command,
                trigger_patterns,
            } => {
                let triggers: Vec<&str> = trigger_patterns.iter().map(String::as_str).collect();
                write!(f, "run `{}` on {}", command, triggers.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSpec {
    /// File, directory or glob; resolved at apply time.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape_is_camel_case() {
        let mut state = DesiredState::default();
        state.build_specs.insert(
            "app".to_string(),
            BuildSpec {
                image_name: "app".to_string(),
                build_context: BuildContext::new("./app"),
                hot_reload: Some(HotReload {
                    ignore_patterns: BTreeSet::new(),
                    live_steps: vec![LiveStep::Run {
                        command: "npm install".to_string(),
                        trigger_patterns: ["package.json".to_string()].into_iter().collect(),
                    }],
                }),
            },
        );

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("clusterContext").is_some());
        let app = &json["buildSpecs"]["app"];
        assert_eq!(app["imageName"], "app");
        assert_eq!(app["buildContext"]["dockerfile"], "Dockerfile");
        assert_eq!(
            app["hotReload"]["liveSteps"][0]["run"]["triggerPatterns"][0],
            "package.json"
        );
    }

    #[test]
    fn test_live_builds_filters_empty_steps() {
        let mut state = DesiredState::default();
        state.build_specs.insert(
            "plain".to_string(),
            BuildSpec {
                image_name: "plain".to_string(),
                build_context: BuildContext::new("."),
                hot_reload: Some(HotReload::default()),
            },
        );
        assert_eq!(state.live_builds().count(), 0);
    }
}
