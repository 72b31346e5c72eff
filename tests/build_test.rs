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

mod common;

use common::FakeContainerEngine;
use kubeloop::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_options(max_attempts: usize) -> BuildOptions {
    BuildOptions {
        push_max_attempts: max_attempts,
        push_base_delay: Duration::from_millis(1),
        push_max_delay: Duration::from_millis(5),
        registry_auth: None,
    }
}

fn project_with_dockerfile() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("app")).unwrap();
    std::fs::write(dir.path().join("app/Dockerfile"), "FROM scratch\n").unwrap();
    dir
}

fn spec(dir: &str) -> BuildSpec {
    BuildSpec {
        image_name: "app".to_string(),
        build_context: BuildContext::new(dir),
        hot_reload: None,
    }
}

fn engine(
    fake: Arc<FakeContainerEngine>,
    registry: &str,
    root: &Path,
    options: BuildOptions,
) -> BuildEngine {
    BuildEngine::new(fake, registry, root, options)
}

#[tokio::test]
async fn test_build_tag_push_in_order() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine::new());
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    let built = builder.build(&spec("app")).await.unwrap();

    assert_eq!(built.remote_reference, "localhost:5000/app");
    assert_eq!(built.push_attempts, 1);
    assert_eq!(
        fake.calls(),
        vec![
            "ping",
            "build app",
            "tag app localhost:5000/app",
            "push localhost:5000/app",
        ]
    );
}

#[tokio::test]
async fn test_push_retries_then_succeeds() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine {
        push_failures: 2,
        ..Default::default()
    });
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    let built = builder.build(&spec("app")).await.unwrap();
    assert_eq!(built.push_attempts, 3);
    assert_eq!(fake.push_calls(), 3);
}

#[tokio::test]
async fn test_push_gives_up_after_exact_attempts() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine {
        push_failures: usize::MAX,
        ..Default::default()
    });
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(4));

    let err = builder.build(&spec("app")).await.unwrap_err();
    match err {
        LoopError::PushFailed {
            image, attempts, ..
        } => {
            assert_eq!(image, "app");
            assert_eq!(attempts, 4);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fake.push_calls(), 4);
}

#[tokio::test]
async fn test_missing_context_is_invalid_build_context() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine::new());
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    let err = builder.build(&spec("missing")).await.unwrap_err();
    assert!(matches!(err, LoopError::InvalidBuildContext { .. }));
    assert!(fake.calls_starting_with("build").is_empty());
}

#[tokio::test]
async fn test_missing_dockerfile_is_invalid_build_context() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine::new());
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    let mut spec = spec("app");
    spec.build_context.dockerfile = "Dockerfile.dev".to_string();
    let err = builder.build(&spec).await.unwrap_err();
    assert!(err.to_string().contains("Dockerfile.dev"));
}

#[tokio::test]
async fn test_failed_build_discards_partial_image() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine {
        build_fails: true,
        ..Default::default()
    });
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    let err = builder.build(&spec("app")).await.unwrap_err();
    assert!(matches!(err, LoopError::BuildFailed { .. }));
    assert_eq!(fake.calls_starting_with("remove"), vec!["remove app"]);
    assert!(fake.calls_starting_with("push").is_empty());
}

#[tokio::test]
async fn test_unreachable_engine() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine {
        ping_fails: true,
        ..Default::default()
    });
    let builder = engine(fake, "localhost:5000", dir.path(), fast_options(3));

    let err = builder.verify_engine().await.unwrap_err();
    assert!(matches!(err, LoopError::EngineUnreachable(_)));
}

#[tokio::test]
async fn test_empty_registry_skips_push() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine::new());
    let builder = engine(fake.clone(), "", dir.path(), fast_options(3));

    let built = builder.build(&spec("app")).await.unwrap();
    assert_eq!(built.remote_reference, "app");
    assert_eq!(built.push_attempts, 0);
    assert!(fake.calls_starting_with("tag").is_empty());
}

#[tokio::test]
async fn test_remove_is_best_effort() {
    let dir = project_with_dockerfile();
    let fake = Arc::new(FakeContainerEngine {
        remove_fails: true,
        ..Default::default()
    });
    let builder = engine(fake.clone(), "localhost:5000", dir.path(), fast_options(3));

    builder.remove("app").await;
    assert_eq!(
        fake.calls_starting_with("remove"),
        vec!["remove app", "remove localhost:5000/app"]
    );
}
