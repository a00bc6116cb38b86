//! Developer automation for kube-testcluster
//!
//! Usage: cargo xtask <command>
//!
//! Tests come in three layers: unit tests inside the library, integration
//! tests that run against an in-process fake cluster, and `#[ignore]`d tests
//! that drive a real k3d cluster through Docker.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use xshell::{cmd, Shell};

/// Integration test targets backed by the fake cluster.
const FAKE_CLUSTER_TESTS: &[&str] = &["lifecycle_test", "workloads_test"];

/// Test target that needs Docker and the k3d binary.
const K3D_TEST: &str = "local_cluster_test";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer automation for kube-testcluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run one test layer, or all layers that need no Docker
    Test {
        #[arg(value_enum, default_value_t = Layer::Offline)]
        layer: Layer,
        /// Only run tests whose name contains this filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Bring the local test cluster up or down through the crate binary
    Cluster {
        #[arg(value_enum)]
        action: ClusterAction,
    },
    /// Lint, then run every offline test layer
    Ci,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Layer {
    Unit,
    Fake,
    K3d,
    /// Unit and fake-cluster tests
    Offline,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ClusterAction {
    Up,
    Down,
    Delete,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Test { layer, filter } => run_layer(&sh, layer, filter.as_deref()),
        Commands::Cluster { action } => cluster(&sh, action),
        Commands::Ci => ci(&sh),
    }
}

/// Arguments to `cargo test` for a layer. Extra arguments after `--` go to
/// the test harness.
fn cargo_test_args(layer: Layer, filter: Option<&str>) -> Vec<String> {
    let mut args = vec!["test".to_string()];
    let mut harness = Vec::new();

    match layer {
        Layer::Unit => args.push("--lib".to_string()),
        Layer::Fake => {
            for target in FAKE_CLUSTER_TESTS {
                args.push("--test".to_string());
                args.push(target.to_string());
            }
        }
        Layer::K3d => {
            args.push("--test".to_string());
            args.push(K3D_TEST.to_string());
            harness.push("--ignored".to_string());
            // One cluster name is shared by every test in the target.
            harness.push("--test-threads=1".to_string());
        }
        Layer::Offline => args.push("--workspace".to_string()),
    }

    if let Some(filter) = filter {
        harness.insert(0, filter.to_string());
    }
    if !harness.is_empty() {
        args.push("--".to_string());
        args.extend(harness);
    }
    args
}

fn run_layer(sh: &Shell, layer: Layer, filter: Option<&str>) -> Result<()> {
    if layer == Layer::K3d {
        require_docker(sh)?;
    }

    let args = cargo_test_args(layer, filter);
    println!("🧪 cargo {}", args.join(" "));
    cmd!(sh, "cargo {args...}")
        .run()
        .with_context(|| format!("{:?} tests failed", layer))?;
    println!("✅ {:?} tests passed", layer);
    Ok(())
}

fn cluster(sh: &Shell, action: ClusterAction) -> Result<()> {
    let subcommand = match action {
        ClusterAction::Up => {
            require_docker(sh)?;
            "up"
        }
        ClusterAction::Down => "down",
        ClusterAction::Delete => "delete-cluster",
    };
    cmd!(sh, "cargo run --quiet -- {subcommand}")
        .run()
        .with_context(|| format!("kube-testcluster {} failed", subcommand))?;
    Ok(())
}

fn require_docker(sh: &Shell) -> Result<()> {
    if cmd!(sh, "docker info").quiet().read().is_err() {
        bail!("Docker is not available; k3d needs a running Docker daemon");
    }
    Ok(())
}

/// Everything that can run without Docker.
fn ci(sh: &Shell) -> Result<()> {
    println!("📝 Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check")
        .run()
        .context("formatting check failed")?;

    println!("🔧 Running clippy...");
    cmd!(sh, "cargo clippy --all-targets -- -D warnings")
        .run()
        .context("clippy failed")?;

    run_layer(sh, Layer::Offline, None)?;
    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(|p| p.to_path_buf())
        .context("xtask must live inside the workspace")
}
