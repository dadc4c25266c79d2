mod analyze;
mod build;
mod config_delta;
mod gc;
mod repo_config;
mod serve;
mod target_ref;
mod tree_shape;
mod wiring;

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Result};
use bb_hash::HashFamily;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn parse_hash_family(raw: &str) -> Result<HashFamily> {
    match raw {
        "git-sha1" => Ok(HashFamily::GitSha1),
        "plain-sha256" => Ok(HashFamily::PlainSha256),
        other => bail!("unknown hash family {other:?} (expected git-sha1 or plain-sha256)"),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "bb",
    about = "Multi-repository, content-addressed build engine",
    version,
    author,
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(short = 'v', long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a target without executing any actions.
    Analyze(AnalyzeArgs),
    /// Analyse a target and run its dependency graph to completion.
    Build(BuildArgs),
    /// Rotate a local build root's CAS generations once.
    Gc(GcArgs),
    /// Print a tree's shape-only projection from the tree-structure cache.
    TreeShape(TreeShapeArgs),
    /// Serve a local build root's CAS over the trimmed REAPI subset.
    ServeLocal(ServeLocalArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Workspace root containing `repository-config.json`.
    #[arg(short = 'C', long = "workspace", value_name = "DIR", default_value = ".")]
    workspace: PathBuf,
    /// Target reference: `name`, `module:name`, or `@repo//module:name`.
    #[arg(value_name = "TARGET")]
    target: String,
    /// Repeated `key=value` configuration overlay entries.
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE")]
    config: Vec<String>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Workspace root containing `repository-config.json`.
    #[arg(short = 'C', long = "workspace", value_name = "DIR", default_value = ".")]
    workspace: PathBuf,
    /// Target reference: `name`, `module:name`, or `@repo//module:name`.
    #[arg(value_name = "TARGET")]
    target: String,
    /// Repeated `key=value` configuration overlay entries.
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE")]
    config: Vec<String>,
    /// Remote execution endpoint (`host:port`); local CAS execution if omitted.
    #[arg(long = "remote", value_name = "ENDPOINT")]
    remote: Option<String>,
    /// Worker thread count (default: available parallelism).
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,
    /// Local build root holding the on-disk CAS (default `<workspace>/.bb-cache`).
    #[arg(long = "local-build-root", value_name = "DIR")]
    local_build_root: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GcArgs {
    /// Local build root holding the on-disk CAS.
    #[arg(long = "local-build-root", value_name = "DIR")]
    local_build_root: PathBuf,
    /// Number of CAS generations (must match how the root was opened).
    #[arg(long = "generations", default_value_t = 1)]
    generations: usize,
    /// Hash family the build root was opened under.
    #[arg(long = "hash-family", default_value = "git-sha1")]
    hash_family: String,
}

#[derive(Args, Debug)]
struct TreeShapeArgs {
    /// Local build root holding the on-disk CAS.
    #[arg(long = "local-build-root", value_name = "DIR")]
    local_build_root: PathBuf,
    /// Hash family the build root was opened under.
    #[arg(long = "hash-family", default_value = "git-sha1")]
    hash_family: String,
    /// Tree digest as `<hex-hash>/<size>`.
    #[arg(long = "tree", value_name = "HASH/SIZE")]
    tree: String,
}

#[derive(Args, Debug)]
struct ServeLocalArgs {
    /// Local build root holding the on-disk CAS.
    #[arg(long = "local-build-root", value_name = "DIR")]
    local_build_root: PathBuf,
    /// Hash family the build root was opened under.
    #[arg(long = "hash-family", default_value = "git-sha1")]
    hash_family: String,
    /// TCP port to listen on (loopback only).
    #[arg(long = "port", default_value_t = 9987)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "command failed");
        eprintln!("{err}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze(args) => handle_analyze(args).await,
        Commands::Build(args) => handle_build(args).await,
        Commands::Gc(args) => handle_gc(args),
        Commands::TreeShape(args) => handle_tree_shape(args),
        Commands::ServeLocal(args) => handle_serve_local(args).await,
    }
}

async fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let (_target, rendered) = analyze::run(analyze::AnalyzeArgs {
        workspace: args.workspace,
        target: args.target,
        config: args.config,
    })
    .await?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

async fn handle_build(args: BuildArgs) -> Result<()> {
    let rendered = build::run(build::BuildArgs {
        workspace: args.workspace,
        target: args.target,
        config: args.config,
        remote: args.remote,
        jobs: args.jobs,
        local_build_root: args.local_build_root,
    })
    .await?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

fn handle_gc(args: GcArgs) -> Result<()> {
    let rendered = gc::run(gc::GcArgs {
        local_build_root: args.local_build_root,
        generations: args.generations,
        hash_family: parse_hash_family(&args.hash_family)?,
    })?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

fn handle_tree_shape(args: TreeShapeArgs) -> Result<()> {
    let rendered = tree_shape::run(tree_shape::TreeShapeArgs {
        local_build_root: args.local_build_root,
        hash_family: parse_hash_family(&args.hash_family)?,
        tree: args.tree,
    })?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

async fn handle_serve_local(args: ServeLocalArgs) -> Result<()> {
    serve::run(serve::ServeArgs {
        local_build_root: args.local_build_root,
        hash_family: parse_hash_family(&args.hash_family)?,
        port: args.port,
    })
    .await
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
