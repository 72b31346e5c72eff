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

use super::project::{ProjectConfig, Settings};
use crate::shared::error::{LoopError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Parse repeated `-D key=value` arguments.
pub fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();

    for config in configs {
        let Some((key, value)) = config.split_once('=') else {
            return Err(LoopError::config_error(format!(
                "invalid override '{}', expected 'key=value'",
                config
            )));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(LoopError::config_error(format!(
                "empty key in override '{}'",
                config
            )));
        }
        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

/// Apply `-D` overrides on top of the parsed project file.
pub fn apply_to_project_config(
    configs: &HashMap<String, String>,
    config: &mut ProjectConfig,
) -> Result<()> {
    let mut keys: Vec<&String> = configs.keys().collect();
    keys.sort();

    for key in keys {
        let value = &configs[key];
        match key.as_str() {
            "registry" => config.registry = Some(value.clone()),
            "context" => config.context = Some(value.clone()),
            "namespace" => config.namespace = Some(value.clone()),
            "instance" => config.instance = value.clone(),
            "engine" => config.engine = value.clone(),
            "kubeconfig" => config.kubeconfig = Some(value.clone()),
            other => match other.strip_prefix("settings.") {
                Some(name) => apply_setting(&mut config.settings, name, value)?,
                None => tracing::warn!(key = %other, "unknown override ignored"),
            },
        }
    }

    config.validate()
}

fn apply_setting(settings: &mut Settings, name: &str, value: &str) -> Result<()> {
    match name {
        "push_max_attempts" => settings.push_max_attempts = parse_value(name, value)?,
        "push_base_delay_ms" => settings.push_base_delay_ms = parse_value(name, value)?,
        "build_timeout_secs" => settings.build_timeout_secs = parse_value(name, value)?,
        "command_timeout_secs" => settings.command_timeout_secs = parse_value(name, value)?,
        "readiness_timeout_secs" => settings.readiness_timeout_secs = parse_value(name, value)?,
        "namespace_timeout_secs" => settings.namespace_timeout_secs = parse_value(name, value)?,
        "debounce_ms" => settings.debounce_ms = parse_value(name, value)?,
        "session_stagger_ms" => settings.session_stagger_ms = parse_value(name, value)?,
        "max_concurrent_builds" => {
            settings.max_concurrent_builds = match value {
                "" | "none" | "unlimited" => None,
                v => Some(parse_value(name, v)?),
            }
        }
        "stop_on_first_error" => settings.stop_on_first_error = parse_value(name, value)?,
        _ => tracing::warn!(key = %format!("settings.{}", name), "unknown override ignored"),
    }
    Ok(())
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        LoopError::config_error(format!("invalid value '{}' for settings.{}: {}", value, name, e))
    })
}
