//! Build automation for kubeloop
//!
//! Usage: cargo xtask <command>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BIN: &str = "kubeloop";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for kubeloop")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the binary
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Only the tests under tests/
        #[arg(long)]
        integration: bool,
        /// Also run tests that need a real cluster and container engine
        #[arg(long)]
        live: bool,
    },
    /// Package the release binary as a tarball
    Dist {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },
    /// Install the release binary under a prefix
    Install {
        #[arg(long, default_value = "/usr/local")]
        prefix: String,
    },
    /// Format check, clippy and tests
    Ci,
    Format {
        #[arg(long)]
        check: bool,
    },
    Clippy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = project_root()?;
    let sh = Shell::new()?;
    sh.change_dir(&root);

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { integration, live } => test(&sh, integration, live),
        Commands::Dist { target } => dist(&sh, &root, target),
        Commands::Install { prefix } => install(&sh, &root, &prefix),
        Commands::Ci => ci(&sh),
        Commands::Format { check } => format(&sh, check),
        Commands::Clippy => clippy(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building {}...", BIN);
    if release {
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
        println!("✅ Release build completed: target/release/{}", BIN);
    } else {
        cmd!(sh, "cargo build --bin {BIN}").run()?;
        println!("✅ Debug build completed: target/debug/{}", BIN);
    }
    Ok(())
}

fn test(sh: &Shell, integration: bool, live: bool) -> Result<()> {
    println!("🧪 Running tests...");
    let selection: &[&str] = if integration { &["--test", "*"] } else { &["--all"] };
    let ignored: &[&str] = if live { &["--", "--include-ignored"] } else { &[] };

    cmd!(sh, "cargo test -p {BIN} {selection...} {ignored...}").run()?;
    println!("✅ All tests passed");
    Ok(())
}

fn release_binary(root: &Path, target: Option<&str>) -> PathBuf {
    match target {
        Some(triple) => root.join(format!("target/{}/release/{}", triple, BIN)),
        None => root.join(format!("target/release/{}", BIN)),
    }
}

fn dist(sh: &Shell, root: &Path, target: Option<String>) -> Result<()> {
    println!("📦 Creating distribution package...");
    match target.as_deref() {
        Some(triple) => cmd!(sh, "cargo build --release --bin {BIN} --target {triple}").run()?,
        None => cmd!(sh, "cargo build --release --bin {BIN}").run()?,
    }

    let dist_dir = root.join("dist");
    sh.create_dir(&dist_dir)?;
    sh.copy_file(release_binary(root, target.as_deref()), dist_dir.join(BIN))?;

    let archive_name = format!("{}-{}.tar.gz", BIN, env!("CARGO_PKG_VERSION"));
    cmd!(sh, "tar -czf {archive_name} -C dist {BIN}")
        .run()
        .context("Failed to create tarball")?;

    println!("✅ Distribution package created: {}", archive_name);
    Ok(())
}

fn install(sh: &Shell, root: &Path, prefix: &str) -> Result<()> {
    println!("📥 Installing {} to {}...", BIN, prefix);

    let binary = release_binary(root, None);
    if !binary.exists() {
        println!("Building release binary first...");
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
    }

    let bin_dir = Path::new(prefix).join("bin");
    sh.create_dir(&bin_dir)?;
    let install_path = bin_dir.join(BIN);
    sh.copy_file(&binary, &install_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&install_path, std::fs::Permissions::from_mode(0o755))?;
    }

    println!("✅ Installed to: {}", install_path.display());
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔍 Running CI checks...");
    format(sh, true)?;
    clippy(sh)?;
    test(sh, false, false)?;
    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("✅ Code formatting is correct");
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
        println!("✅ Code formatted");
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --all-targets --all-features -- -D warnings").run()?;
    println!("✅ Clippy checks passed");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask must live one level below the workspace root")
}
