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

//! `ContainerEngine` backed by the docker (or podman) command line

use super::engine::{ContainerEngine, ImageBuildRequest, RegistryAuth};
use crate::infrastructure::shell::{CommandSpec, ShellRunner};
use crate::shared::error::{LoopError, Result};
use std::time::Duration;

pub struct DockerCli {
    binary: String,
    runner: ShellRunner,
    build_timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, runner: ShellRunner, build_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            runner,
            build_timeout,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.binary)
    }

    fn build_command(&self, request: &ImageBuildRequest) -> CommandSpec {
        let mut spec = self
            .command()
            .arg("build")
            .arg("-t")
            .arg(&request.image)
            .arg("-f")
            .arg(request.dockerfile.display().to_string());
        for (key, value) in &request.args {
            spec = spec.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        spec.arg(request.context_dir.display().to_string())
            .timeout(self.build_timeout)
            .streaming()
    }

    async fn login(&self, reference: &str, auth: &RegistryAuth) -> Result<()> {
        let registry = registry_host(reference).ok_or_else(|| {
            LoopError::config_error(format!(
                "cannot determine registry host from image reference '{}'",
                reference
            ))
        })?;
        let spec = self
            .command()
            .args(["login", registry, "-u", auth.username.as_str(), "--password-stdin"])
            .stdin(auth.password.clone());
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContainerEngine for DockerCli {
    async fn ping(&self) -> Result<()> {
        let spec = self
            .command()
            .args(["version", "--format", "{{.Server.Version}}"]);
        let output = self.runner.run_checked(&spec).await?;
        tracing::debug!(engine = %self.binary, version = %output.stdout.trim(), "container engine reachable");
        Ok(())
    }

    async fn build(&self, request: &ImageBuildRequest) -> Result<()> {
        self.runner.run_checked(&self.build_command(request)).await?;
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        let spec = self.command().args(["image", "inspect", reference]);
        Ok(self.runner.run(&spec).await?.success())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let spec = self.command().args(["tag", source, target]);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    async fn push(&self, reference: &str, auth: Option<&RegistryAuth>) -> Result<()> {
        if let Some(auth) = auth {
            self.login(reference, auth).await?;
        }
        let spec = self
            .command()
            .args(["push", reference])
            .timeout(self.build_timeout)
            .streaming();
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let spec = self.command().args(["rmi", "-f", reference]);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Registry host of a fully qualified reference (`host:5000/app` -> `host:5000`).
fn registry_host(reference: &str) -> Option<&str> {
    let (host, _) = reference.split_once('/')?;
    if host.contains('.') || host.contains(':') || host == "localhost" {
        Some(host)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_build_command_carries_args_in_order() {
        let docker = DockerCli::new("docker", ShellRunner::default(), Duration::from_secs(60));
        let mut args = BTreeMap::new();
        args.insert("NODE_ENV".to_string(), "development".to_string());
        args.insert("A".to_string(), "1".to_string());

        let spec = docker.build_command(&ImageBuildRequest {
            image: "app".to_string(),
            context_dir: PathBuf::from("/work/app"),
            dockerfile: PathBuf::from("/work/app/Dockerfile"),
            args,
        });

        assert_eq!(
            spec.display(),
            "docker build -t app -f /work/app/Dockerfile --build-arg A=1 --build-arg NODE_ENV=development /work/app"
        );
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("localhost:5000/app"), Some("localhost:5000"));
        assert_eq!(registry_host("registry.example.com/team/app"), Some("registry.example.com"));
        assert_eq!(registry_host("library/app"), None);
        assert_eq!(registry_host("app"), None);
    }
}
