//! Development loop commands

use crate::cli::display::{StatusIcon, TableRenderer};
use crate::domain::config::{apply_to_project_config, parse_dynamic_configs, ProjectConfig};
use crate::domain::orchestrator::{Orchestrator, Phase};
use crate::domain::reconcile::diff;
use crate::domain::state::{DesiredState, StateStore, StoreOptions};
use crate::infrastructure::constants::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE, DEFAULT_LOG_TAIL_LINES};
use crate::infrastructure::container::DockerCli;
use crate::infrastructure::kubernetes::KubeClusterApi;
use crate::infrastructure::shell::ShellRunner;
use crate::shared::LoopError;
use chrono::{DateTime, Local};
use clap::{Args, Parser};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command that reads the project file.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Path to the project file
    #[arg(long, short = 'f', env = CONFIG_FILE_ENV, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to kubeconfig file
    /// If not specified, uses default kubeconfig resolution (KUBECONFIG env or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Override project settings (-D key=value)
    ///
    /// Top level: registry, context, namespace, instance, engine, kubeconfig
    /// Tunables: settings.push_max_attempts, settings.push_base_delay_ms,
    /// settings.build_timeout_secs, settings.command_timeout_secs,
    /// settings.readiness_timeout_secs, settings.namespace_timeout_secs,
    /// settings.debounce_ms, settings.session_stagger_ms,
    /// settings.max_concurrent_builds, settings.stop_on_first_error
    ///
    /// Example: -Dnamespace=dev -Dsettings.push_max_attempts=5
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

/// A loaded project: its desired state and the orchestrator over it.
pub struct Project {
    pub config: ProjectConfig,
    pub root: PathBuf,
    pub orchestrator: Orchestrator,
}

impl ProjectArgs {
    pub fn load_config(&self) -> anyhow::Result<ProjectConfig> {
        if !self.config.exists() {
            anyhow::bail!(
                "❌ Project file not found: {}\n\n  Create one or point to it with --config / {}",
                self.config.display(),
                CONFIG_FILE_ENV
            );
        }
        let mut config = ProjectConfig::load(&self.config)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", self.config.display(), e))?;

        if !self.properties.is_empty() {
            let overrides = parse_dynamic_configs(&self.properties)
                .map_err(|e| anyhow::anyhow!("Failed to parse dynamic configs: {}", e))?;
            apply_to_project_config(&overrides, &mut config)?;
        }
        if self.kubeconfig.is_some() {
            config.kubeconfig = self.kubeconfig.clone();
        }
        Ok(config)
    }

    pub async fn open(&self) -> anyhow::Result<Project> {
        let config = self.load_config()?;
        let root = ProjectConfig::project_root(&self.config);

        let store = Arc::new(StateStore::new(StoreOptions {
            project_root: root.clone(),
            instance: config.instance.clone(),
            defaults: DesiredState::default(),
        }));
        store.load().await;
        config.register_into(&store)?;

        let settings = config.settings.clone();
        let container = Arc::new(DockerCli::new(
            config.engine.clone(),
            ShellRunner::new(settings.command_timeout()),
            settings.build_timeout(),
        ));
        let cluster_api = Arc::new(KubeClusterApi::new(config.kubeconfig.clone()));
        let orchestrator = Orchestrator::new(
            store,
            container,
            cluster_api,
            settings,
            config.resolve_registry_auth()?,
        );

        Ok(Project {
            config,
            root,
            orchestrator,
        })
    }
}

#[derive(Parser, Debug, Clone)]
pub struct UpCommand {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the planned changes and live-update plan without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Reconcile once and exit instead of starting live sync
    #[arg(long)]
    pub no_watch: bool,
}

impl UpCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let project = self.project.open().await?;
        let renderer = TableRenderer::new();
        let dev_mode = !self.dry_run && !self.no_watch;

        let report = match project.orchestrator.up(self.dry_run, dev_mode).await {
            Ok(report) => report,
            Err(LoopError::NothingToDo) => anyhow::bail!(
                "❌ Nothing to do: {} registers no builds or manifests",
                self.project.config.display()
            ),
            Err(e) => return Err(anyhow::anyhow!("Reconciliation failed: {}", e)),
        };

        println!("{}", renderer.render_change_set(&report.changes));
        if report.dry_run {
            println!("{}", renderer.render_live_plan(&report.live_plan));
            println!("Dry run: no changes applied");
            return Ok(());
        }
        println!("{}", renderer.render_up_summary(&report));

        if !report.success() {
            anyhow::bail!("Reconciliation finished with failures");
        }

        if project.orchestrator.phase().await == (Phase::Running { dev_mode: true }) {
            if report.sessions.is_empty() {
                println!("No live sync sessions running, watching nothing");
            } else {
                println!("Watching for changes, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                println!();
            }
            project.orchestrator.stop_sessions().await;
            println!("{} Live sync stopped, deployed resources are kept", StatusIcon::SUCCESS.green());
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DownCommand {
    #[command(flatten)]
    pub project: ProjectArgs,
}

impl DownCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let project = self.project.open().await?;
        project.orchestrator.down().await;
        println!("{} Teardown complete", StatusIcon::SUCCESS.green());
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {
    #[command(flatten)]
    pub project: ProjectArgs,
}

impl StatusCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let project = self.project.open().await?;
        let store = project.orchestrator.store();
        let current = store.current();
        let pending = diff(&store.snapshot_baseline(), &current);

        let last_persisted = std::fs::metadata(store.state_file())
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Local>::from);

        let renderer = TableRenderer::new();
        println!(
            "{}",
            renderer.render_status(&current, store.state_file(), last_persisted, pending.len())
        );
        if !pending.is_empty() {
            println!("{}", renderer.render_change_set(&pending));
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub project: ProjectArgs,
}

impl ValidateCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let project = self.project.open().await?;
        let outcomes = project.orchestrator.validate().await;

        let renderer = TableRenderer::new();
        println!("{}", renderer.render_validation(&outcomes, &project.root));

        let invalid = outcomes.iter().filter(|o| !o.is_valid()).count();
        if invalid > 0 {
            anyhow::bail!("{} manifest file(s) failed validation", invalid);
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct LogsCommand {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Image whose running container to read
    pub image: String,

    /// Number of lines from the end of the log
    #[arg(long, default_value_t = DEFAULT_LOG_TAIL_LINES)]
    pub tail: i64,
}

impl LogsCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let project = self.project.open().await?;
        if !project.config.builds.iter().any(|b| b.image == self.image) {
            anyhow::bail!("Image '{}' is not declared in {}", self.image, self.project.config.display());
        }

        let logs = project
            .orchestrator
            .logs(&self.image, self.tail)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch logs: {}", e))?;
        print!("{}", logs);
        Ok(())
    }
}
