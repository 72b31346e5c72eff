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

//! Manifest files: path resolution, YAML parsing and client-side validation

use crate::infrastructure::constants::{
    KIND_DAEMONSET, KIND_DEPLOYMENT, KIND_STATEFULSET, MANIFEST_EXTENSIONS,
};
use crate::shared::error::{LoopError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One document of a (possibly multi-document) manifest file.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub body: serde_yaml::Value,
}

/// A workload declared by a manifest that reports readiness.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkloadRef {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.to_lowercase(), self.name)
    }
}

pub fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

pub fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve a file, directory or glob (relative to `root`) to a sorted,
/// deduplicated list of manifest files. Directories expand recursively.
pub fn resolve_manifest_files(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let candidate = root.join(pattern);
    let mut files = BTreeSet::new();

    if has_glob_chars(pattern) {
        for path in glob_files(&candidate.to_string_lossy()) {
            if path.is_dir() {
                files.extend(files_under(&path));
            } else if is_manifest_file(&path) {
                files.insert(path);
            } else {
                tracing::warn!(file = %path.display(), "skipping non-YAML manifest candidate");
            }
        }
    } else if candidate.is_dir() {
        files.extend(files_under(&candidate));
    } else if candidate.is_file() {
        if is_manifest_file(&candidate) {
            files.insert(candidate);
        } else {
            tracing::warn!(file = %candidate.display(), "skipping non-YAML manifest candidate");
        }
    }

    files.into_iter().collect()
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    MANIFEST_EXTENSIONS
        .iter()
        .flat_map(|ext| glob_files(&format!("{}/**/*.{}", dir.display(), ext)))
        .filter(|path| path.is_file())
        .collect()
}

fn glob_files(pattern: &str) -> Vec<PathBuf> {
    match glob::glob(pattern) {
        Ok(paths) => paths.flatten().collect(),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid glob pattern");
            Vec::new()
        }
    }
}

/// Parse every non-empty YAML document in `path`.
pub fn parse_documents(path: &Path) -> Result<Vec<ManifestDocument>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LoopError::invalid_manifest(path, format!("cannot read file: {}", e)))?;
    parse_documents_str(path, &content)
}

pub fn parse_documents_str(path: &Path, content: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();
    for (index, de) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(de).map_err(|e| {
            LoopError::invalid_manifest(path, format!("document {}: {}", index, e))
        })?;
        if value.is_null() {
            continue;
        }
        documents.push(validate_document(path, index, value)?);
    }
    if documents.is_empty() {
        return Err(LoopError::invalid_manifest(path, "file contains no documents"));
    }
    Ok(documents)
}

fn validate_document(path: &Path, index: usize, body: serde_yaml::Value) -> Result<ManifestDocument> {
    let field = |key: &str| -> Option<String> {
        body.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let missing =
        |what: &str| LoopError::invalid_manifest(path, format!("document {}: missing {}", index, what));

    let api_version = field("apiVersion").ok_or_else(|| missing("apiVersion"))?;
    let kind = field("kind").ok_or_else(|| missing("kind"))?;
    let metadata = body.get("metadata").ok_or_else(|| missing("metadata"))?;
    let name = metadata
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing("metadata.name"))?;
    let namespace = metadata
        .get("namespace")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(ManifestDocument {
        api_version,
        kind,
        name,
        namespace,
        body,
    })
}

/// Workloads among the documents whose readiness can be awaited.
pub fn workloads(documents: &[ManifestDocument]) -> Vec<WorkloadRef> {
    documents
        .iter()
        .filter(|doc| {
            matches!(
                doc.kind.as_str(),
                KIND_DEPLOYMENT | KIND_STATEFULSET | KIND_DAEMONSET
            )
        })
        .map(|doc| WorkloadRef {
            kind: doc.kind.clone(),
            name: doc.name.clone(),
            namespace: doc.namespace.clone(),
        })
        .collect()
}

/// Split `apps/v1` into (`apps`, `v1`); core resources have an empty group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}
