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

//! Path patterns for live steps
//!
//! Paths and patterns are relative to the build context and use `/` as the
//! separator. A pattern with wildcards is an anchored glob: `**` crosses
//! separators, `*` and `?` stay within one segment, `[...]` is a character
//! class. A pattern without wildcards matches the path itself or anything
//! below it as a directory. There is no implicit basename matching.

use crate::shared::error::{LoopError, Result};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Glob(Regex),
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    normalized: String,
    matcher: Matcher,
}

impl PathPattern {
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = normalize_path(raw);
        let matcher = if is_wildcard(&normalized) {
            let regex = Regex::new(&glob_to_regex(&normalized)).map_err(|e| {
                LoopError::config_error(format!("invalid path pattern '{}': {}", raw, e))
            })?;
            Matcher::Glob(regex)
        } else {
            Matcher::Literal
        };
        Ok(Self {
            raw: raw.to_string(),
            normalized,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        match &self.matcher {
            Matcher::Glob(regex) => regex.is_match(&path),
            Matcher::Literal => {
                self.normalized.is_empty()
                    || path == self.normalized
                    || path
                        .strip_prefix(&self.normalized)
                        .map(|rest| rest.starts_with('/'))
                        .unwrap_or(false)
            }
        }
    }

    /// Leading segments free of wildcards; the directory a watch must cover.
    pub fn static_prefix(&self) -> &str {
        if !is_wildcard(&self.normalized) {
            return &self.normalized;
        }
        let mut end = 0;
        for (index, segment) in segment_bounds(&self.normalized) {
            if is_wildcard(segment) {
                break;
            }
            end = index + segment.len();
        }
        &self.normalized[..end]
    }

    /// Container path for a matched file. Whatever the pattern matched
    /// below its static prefix is preserved under `dest`.
    pub fn destination(&self, path: &str, dest: &str) -> String {
        let path = normalize_path(path);
        let dest_dir = dest.trim_end_matches('/');

        match &self.matcher {
            Matcher::Literal if path == self.normalized && !dest.ends_with('/') => dest.to_string(),
            Matcher::Literal if path == self.normalized => {
                let name = path.rsplit('/').next().unwrap_or(&path);
                format!("{}/{}", dest_dir, name)
            }
            _ => {
                let prefix = self.static_prefix();
                let rest = if prefix.is_empty() {
                    path.as_str()
                } else {
                    path.strip_prefix(prefix)
                        .map(|rest| rest.trim_start_matches('/'))
                        .unwrap_or(path.as_str())
                };
                if rest.is_empty() {
                    dest_dir.to_string()
                } else {
                    format!("{}/{}", dest_dir, rest)
                }
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Forward slashes, no leading `./`, no trailing `/`; `.` becomes empty.
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim().replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn segment_bounds(path: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    path.split('/').map(move |segment| {
        let start = offset;
        offset += segment.len() + 1;
        (start, segment)
    })
}

fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(len) if len > 0 => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    let class = match class.strip_prefix('!') {
                        Some(negated) => format!("^{}", negated),
                        None => class,
                    };
                    out.push('[');
                    out.push_str(&class.replace('\\', "\\\\"));
                    out.push(']');
                    i += len + 2;
                }
                _ => {
                    out.push_str("\\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}
