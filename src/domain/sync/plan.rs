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

use super::pattern::{normalize_path, PathPattern};
use crate::domain::state::{HotReload, LiveStep};
use crate::shared::error::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum CompiledStep {
    Sync { src: PathPattern, dest: String },
    Run { command: String, triggers: Vec<PathPattern> },
}

/// Live steps with their patterns compiled once per session.
#[derive(Debug, Clone)]
pub struct LiveSteps {
    ignore: Vec<PathPattern>,
    steps: Vec<CompiledStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveAction {
    Copy { local: PathBuf, remote: String },
    Exec { command: String },
}

impl fmt::Display for LiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveAction::Copy { local, remote } => write!(f, "sync {} → {}", local.display(), remote),
            LiveAction::Exec { command } => write!(f, "run `{}`", command),
        }
    }
}

impl LiveSteps {
    pub fn compile(hot_reload: &HotReload) -> Result<Self> {
        let ignore = hot_reload
            .ignore_patterns
            .iter()
            .map(|p| PathPattern::new(p))
            .collect::<Result<Vec<_>>>()?;

        let mut steps = Vec::with_capacity(hot_reload.live_steps.len());
        for step in &hot_reload.live_steps {
            steps.push(match step {
                LiveStep::Sync { src, dest } => CompiledStep::Sync {
                    src: PathPattern::new(src)?,
                    dest: dest.clone(),
                },
                LiveStep::Run {
                    command,
                    trigger_patterns,
                } => CompiledStep::Run {
                    command: command.clone(),
                    triggers: trigger_patterns
                        .iter()
                        .map(|p| PathPattern::new(p))
                        .collect::<Result<Vec<_>>>()?,
                },
            });
        }

        Ok(Self { ignore, steps })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore.iter().any(|p| p.matches(path))
    }

    /// Actions for one changed path, in declaration order.
    pub fn plan(&self, context_dir: &Path, path: &str) -> Vec<LiveAction> {
        let path = normalize_path(path);
        if path.is_empty() || self.is_ignored(&path) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for step in &self.steps {
            match step {
                CompiledStep::Sync { src, dest } if src.matches(&path) => {
                    actions.push(LiveAction::Copy {
                        local: context_dir.join(&path),
                        remote: src.destination(&path, dest),
                    });
                }
                CompiledStep::Run { command, triggers }
                    if triggers.iter().any(|t| t.matches(&path)) =>
                {
                    actions.push(LiveAction::Exec {
                        command: command.clone(),
                    });
                }
                _ => {}
            }
        }
        actions
    }

    /// Directories to watch: the static prefix of every sync source and
    /// trigger, with nested roots folded into their ancestors. A root that
    /// does not exist yet is replaced by its nearest existing ancestor
    /// inside the context.
    pub fn watch_roots(&self, context_dir: &Path) -> Vec<PathBuf> {
        let prefixes: BTreeSet<PathBuf> = self
            .steps
            .iter()
            .flat_map(|step| match step {
                CompiledStep::Sync { src, .. } => vec![src.static_prefix().to_string()],
                CompiledStep::Run { triggers, .. } => triggers
                    .iter()
                    .map(|t| t.static_prefix().to_string())
                    .collect(),
            })
            .map(|prefix| existing_ancestor(context_dir, &prefix))
            .collect();

        let mut roots: Vec<PathBuf> = Vec::new();
        for candidate in prefixes {
            if !roots.iter().any(|root| candidate.starts_with(root)) {
                roots.push(candidate);
            }
        }
        roots
    }
}

fn existing_ancestor(context_dir: &Path, prefix: &str) -> PathBuf {
    let mut candidate = context_dir.join(prefix);
    while !candidate.exists() && candidate != context_dir {
        match candidate.parent() {
            Some(parent) if parent.starts_with(context_dir) => candidate = parent.to_path_buf(),
            _ => return context_dir.to_path_buf(),
        }
    }
    candidate
}

/// Context-relative form of a watcher path, or `None` when outside.
pub fn relative_to(context_dir: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(context_dir)
        .ok()
        .map(|rel| normalize_path(&rel.to_string_lossy()))
        .filter(|rel| !rel.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn node_app() -> HotReload {
        HotReload {
            ignore_patterns: ["src/**/*.test.js".to_string()].into_iter().collect(),
            live_steps: vec![
                LiveStep::Sync {
                    src: "src/**/*".to_string(),
                    dest: "/app/src".to_string(),
                },
                LiveStep::Sync {
                    src: "package.json".to_string(),
                    dest: "/app/package.json".to_string(),
                },
                LiveStep::Run {
                    command: "npm install".to_string(),
                    trigger_patterns: ["package.json".to_string()].into_iter().collect(),
                },
            ],
        }
    }

    #[test]
    fn test_plan_runs_steps_in_declaration_order() {
        let steps = LiveSteps::compile(&node_app()).unwrap();
        let actions = steps.plan(Path::new("/ctx"), "package.json");
        assert_eq!(
            actions,
            vec![
                LiveAction::Copy {
                    local: PathBuf::from("/ctx/package.json"),
                    remote: "/app/package.json".to_string(),
                },
                LiveAction::Exec {
                    command: "npm install".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_plan_preserves_nested_path() {
        let steps = LiveSteps::compile(&node_app()).unwrap();
        let actions = steps.plan(Path::new("/ctx"), "src/routes/index.js");
        assert_eq!(
            actions,
            vec![LiveAction::Copy {
                local: PathBuf::from("/ctx/src/routes/index.js"),
                remote: "/app/src/routes/index.js".to_string(),
            }]
        );
    }

    #[test]
    fn test_ignored_and_unmatched_paths_plan_nothing() {
        let steps = LiveSteps::compile(&node_app()).unwrap();
        assert!(steps.plan(Path::new("/ctx"), "src/a.test.js").is_empty());
        assert!(steps.plan(Path::new("/ctx"), "src/package.json").len() == 1);
        assert!(steps.plan(Path::new("/ctx"), "README.md").is_empty());
    }

    #[test]
    fn test_watch_roots_fold_nested_and_missing() {
        let dir = TempDir::new().unwrap();
        let ctx = dir.path();
        fs::create_dir_all(ctx.join("src/lib")).unwrap();

        let hot_reload = HotReload {
            ignore_patterns: BTreeSet::new(),
            live_steps: vec![
                LiveStep::Sync {
                    src: "src/**/*".to_string(),
                    dest: "/app".to_string(),
                },
                LiveStep::Sync {
                    src: "src/lib/*.rs".to_string(),
                    dest: "/lib".to_string(),
                },
                LiveStep::Sync {
                    src: "assets/img/*".to_string(),
                    dest: "/img".to_string(),
                },
            ],
        };
        let roots = LiveSteps::compile(&hot_reload).unwrap().watch_roots(ctx);
        assert_eq!(roots, vec![ctx.to_path_buf()]);

        fs::create_dir_all(ctx.join("assets")).unwrap();
        let roots = LiveSteps::compile(&hot_reload).unwrap().watch_roots(ctx);
        assert_eq!(roots, vec![ctx.join("assets"), ctx.join("src")]);
    }

    #[test]
    fn test_relative_to() {
        let ctx = Path::new("/work/app");
        assert_eq!(relative_to(ctx, Path::new("/work/app/src/a.js")).as_deref(), Some("src/a.js"));
        assert_eq!(relative_to(ctx, Path::new("/work/other/a.js")), None);
        assert_eq!(relative_to(ctx, ctx), None);
    }
}
