// CLI command definitions

use super::loop_cmd::{DownCommand, LogsCommand, StatusCommand, UpCommand, ValidateCommand};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "kubeloop",
    version,
    about = "Local Kubernetes development loop",
    long_about = "Builds images, deploys manifests and live-syncs source changes into running containers"
)]
pub struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the cluster with the project file (build, deploy, live sync)
    Up(UpCommand),

    /// Stop live sync, delete deployed manifests and remove built images
    Down(DownCommand),

    /// Show registered resources and pending changes
    Status(StatusCommand),

    /// Validate manifests client-side without applying them
    Validate(ValidateCommand),

    /// Show logs of the container running an image
    Logs(LogsCommand),
}

impl CliArgs {
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
