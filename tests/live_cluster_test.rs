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

//! Checks against a real kubeconfig and container engine.
//! Run with `cargo xtask test --live`.

use kubeloop::infrastructure::shell::ShellRunner;
use kubeloop::*;
use std::time::Duration;

#[tokio::test]
#[ignore = "needs a kubeconfig with a reachable current cluster"]
async fn test_kubeconfig_contexts_are_listed() {
    let api = KubeClusterApi::new(None);
    let contexts = api.list_contexts().await.unwrap();
    assert!(!contexts.is_empty());

    api.use_context(&contexts[0]).await.unwrap();
    api.probe().await.unwrap();
}

#[tokio::test]
#[ignore = "needs a running docker daemon"]
async fn test_docker_engine_answers_ping() {
    let engine = DockerCli::new(
        "docker",
        ShellRunner::new(Duration::from_secs(30)),
        Duration::from_secs(300),
    );
    engine.ping().await.unwrap();
}
