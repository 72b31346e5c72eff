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

use crate::infrastructure::constants::{
    DEFAULT_NAMESPACE, NAMESPACE_MAX_LEN, NAMESPACE_PREFIX, NAMESPACE_SUFFIX,
};

/// Normalize an arbitrary string into a valid Kubernetes namespace name.
///
/// Shared by the state store and the cluster manager so both agree on
/// namespace identity. The result always matches
/// `^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$` and the function is idempotent.
pub fn normalize_namespace(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && name.ends_with('-') {
            continue;
        }
        name.push(c);
    }

    let mut name = name.trim_matches('-').to_string();
    if name.is_empty() {
        return DEFAULT_NAMESPACE.to_string();
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        name.insert_str(0, NAMESPACE_PREFIX);
    }
    if !name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        name.push_str(NAMESPACE_SUFFIX);
    }

    if name.len() > NAMESPACE_MAX_LEN {
        name.truncate(NAMESPACE_MAX_LEN);
        let trimmed = name.trim_end_matches('-').len();
        name.truncate(trimmed);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regex::Regex;

    fn valid(name: &str) -> bool {
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
            .unwrap()
            .is_match(name)
    }

    #[test]
    fn test_basic_cases() {
        assert_eq!(normalize_namespace("My_App"), "my-app");
        assert_eq!(normalize_namespace("--dev--env--"), "dev-env");
        assert_eq!(normalize_namespace("a..b"), "a-b");
        assert_eq!(normalize_namespace(""), "default");
        assert_eq!(normalize_namespace("___"), "default");
        assert_eq!(normalize_namespace("Ünïcode"), "n-code");
    }

    #[test]
    fn test_truncates_without_trailing_dash() {
        let raw = format!("{}-{}", "a".repeat(62), "b".repeat(10));
        let name = normalize_namespace(&raw);
        assert_eq!(name.len(), 62);
        assert!(valid(&name));
    }

    proptest! {
        #[test]
        fn prop_output_is_valid(raw in ".{0,100}") {
            let name = normalize_namespace(&raw);
            prop_assert!(valid(&name), "invalid namespace {:?} from {:?}", name, raw);
        }

        #[test]
        fn prop_idempotent(raw in ".{0,100}") {
            let once = normalize_namespace(&raw);
            prop_assert_eq!(normalize_namespace(&once), once);
        }
    }
}
