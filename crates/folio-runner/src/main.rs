//! `folio` command line
//!
//! - `folio run <job.toml>`: execute one job, print its outcome as JSON and
//!   exit with the job's status code
//! - `folio render <tree.json>`: render a tree description directly
//! - `folio validate <document>`: check a serialized document or LOCAL
//!   artifact
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use folio_block::SchemaVersion;
use folio_render::{extract_document, RenderRequest, Renderer, Target};
use folio_runner::{read_tree, render_tree, JobSpec, RunnerConfig, RunnerPool};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about = "Build, validate and regenerate Folio reports", long_about = None)]
struct Args {
    /// Runner configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a job spec
    Run {
        /// Job spec (`.toml` or `.json`)
        job: PathBuf,
    },
    /// Render a tree description
    Render {
        /// Tree JSON as written by a job script
        tree: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Artifact name without extension
        #[arg(short, long, default_value = "report")]
        name: String,
        /// Delivery target (`local` or `cloud`)
        #[arg(short, long, default_value = "local")]
        target: Target,
        /// Directory asset paths resolve against; defaults to the tree's
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Validate a serialized document or LOCAL artifact
    Validate {
        document: PathBuf,
        /// Schema version to check against; the declared one by default
        #[arg(long)]
        schema: Option<SchemaVersion>,
    },
}

fn init_tracing(debug: bool, json: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.debug, args.json_logs);

    let config = match &args.config {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunnerConfig::default(),
    };

    match args.command {
        Command::Run { job } => run(&job, config).await,
        Command::Render {
            tree,
            output,
            name,
            target,
            workdir,
        } => {
            let workdir = workdir.unwrap_or_else(|| parent_dir(&tree));
            let spec = read_tree(&tree).await?;
            let renderer = Renderer::new().with_options(config.render);
            let published = render_tree(
                &spec,
                &workdir,
                target,
                &RenderRequest::new(output, name),
                &renderer,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&published)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { document, schema } => validate(&document, schema),
    }
}

async fn run(path: &Path, config: RunnerConfig) -> Result<ExitCode> {
    let job = JobSpec::load(path)
        .and_then(|spec| spec.into_job(&config))
        .with_context(|| format!("loading job {}", path.display()))?;
    let pool = RunnerPool::new(config);
    let handle = pool.submit(job);

    let mut status = handle.subscribe();
    tokio::select! {
        _ = status.wait_for(|s| s.is_terminal()) => {}
        interrupt = tokio::signal::ctrl_c() => {
            interrupt.context("installing interrupt handler")?;
            tracing::warn!(job = %handle.id(), "interrupted, cancelling job");
            handle.cancel();
        }
    }
    let outcome = handle.wait().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(exit_code(outcome.exit_code()))
}

fn validate(path: &Path, schema: Option<SchemaVersion>) -> Result<ExitCode> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let is_html = bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<');
    let bytes = if is_html {
        let html = String::from_utf8(bytes).context("artifact is not UTF-8")?;
        extract_document(&html)?
    } else {
        bytes
    };
    let document = folio_codec::deserialize(&bytes)?;
    let version = schema.unwrap_or_else(|| document.schema_version());
    let report = folio_schema::report(&document, version);

    println!(
        "{}: schema {version}, {} blocks checked",
        path.display(),
        report.blocks_checked
    );
    for violation in &report.violations {
        println!("  {}: {violation}", violation.reason());
    }
    Ok(if report.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
