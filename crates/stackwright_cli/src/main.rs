//! STACKWRIGHT CLI
//!
//! Inspects plans and simulates applies against the in-memory provider.
//! Nothing here talks to a real cloud.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use console::style;
use stackwright_core::{LogicalId, StackEnv};
use stackwright_plan::{EventPipeline, Plan, Stack};
use stackwright_runtime::{
    ApplyConfig, ApplyEngine, ErrorClass, Fault, InMemoryProvider, Provider, ResolvedMap,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackwright")]
#[command(about = "STACKWRIGHT - Dependency-aware provisioning planner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the batches of a declaration
    Plan {
        #[command(flatten)]
        source: Source,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a declaration against the in-memory provider
    Simulate {
        #[command(flatten)]
        source: Source,
        /// Provider calls in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Logical IDs whose calls fail with permission denied
        #[arg(long)]
        deny: Vec<String>,
        /// Destroy everything again after a successful apply
        #[arg(long)]
        destroy: bool,
    },
    /// Print the built-in event pipeline as a JSON declaration
    Declare {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args)]
struct Source {
    /// Path to a JSON stack declaration
    #[arg(short, long, conflicts_with = "pipeline")]
    file: Option<PathBuf>,
    /// Use the built-in event pipeline
    #[arg(long)]
    pipeline: bool,
    #[command(flatten)]
    options: PipelineArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// Add the durable archive branch
    #[arg(long)]
    archive: bool,
    /// Caller-supplied name prefix; names are provider-assigned without it
    #[arg(long)]
    prefix: Option<String>,
}

impl PipelineArgs {
    fn stack(&self) -> Result<Stack> {
        let mut pipeline = EventPipeline::new();
        if self.archive {
            pipeline = pipeline.with_archive();
        }
        if let Some(prefix) = &self.prefix {
            pipeline = pipeline.with_name_prefix(prefix.clone());
        }
        Ok(pipeline.stack(StackEnv::default())?)
    }
}

impl Source {
    fn load(&self) -> Result<Stack> {
        match (&self.file, self.pipeline) {
            (Some(path), _) => {
                let text = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                Ok(Stack::from_json_str(&text)?)
            }
            (None, true) => self.options.stack(),
            (None, false) => Err(eyre!("either --file or --pipeline is required")),
        }
    }
}

fn render_plan(plan: &Plan) -> String {
    let mut out = format!(
        "{} resources in {} batches ({})\n",
        plan.len(),
        plan.batches().len(),
        plan.env().region
    );
    for batch in plan.batches() {
        out.push_str(&format!("{}\n", style(format!("batch {}", batch.index)).bold()));
        for id in &batch.members {
            let Some(spec) = plan.spec(id) else { continue };
            let deps = plan
                .dependencies(id)
                .map(|deps| deps.iter().map(LogicalId::as_str).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            if deps.is_empty() {
                out.push_str(&format!("  {} ({})\n", id, spec.kind));
            } else {
                out.push_str(&format!("  {} ({}) after {}\n", id, spec.kind, deps));
            }
        }
    }
    out
}

fn render_resolved(resolved: &ResolvedMap) -> String {
    let mut out = String::new();
    for resource in resolved.iter() {
        out.push_str(&format!("{} ({})\n", style(resource.id()).green(), resource.kind()));
        for (attribute, value) in resource.attributes.iter() {
            out.push_str(&format!("  {}: {}\n", attribute, value));
        }
    }
    out
}

async fn simulate(plan: &Plan, concurrency: usize, deny: &[String], destroy: bool) -> Result<String> {
    tracing::debug!(resources = plan.len(), concurrency, denied = deny.len(), "simulating apply");
    let provider = Arc::new(InMemoryProvider::new(plan.env().clone()));
    for id in deny {
        provider
            .inject(LogicalId::new(id.as_str())?, Fault::Fail(ErrorClass::PermissionDenied))
            .await;
    }
    let dyn_provider: Arc<dyn Provider> = provider.clone();
    let engine = ApplyEngine::new(dyn_provider)
        .with_config(ApplyConfig::default().with_max_concurrency(concurrency));

    let resolved = match engine.apply(plan).await {
        Ok(resolved) => resolved,
        Err(err) => {
            eprint!("{}", render_resolved(err.resolved()));
            return Err(err.into());
        }
    };

    let mut out = render_resolved(&resolved);
    if destroy {
        engine.destroy(plan, resolved).await?;
        out.push_str(&format!("{}\n", style("destroyed").yellow()));
    }
    out.push_str(&serde_json::to_string_pretty(&engine.metrics())?);
    out.push('\n');
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stackwright=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { source, json } => {
            let plan = source.load()?.build_plan()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print!("{}", render_plan(&plan));
            }
            Ok(())
        }
        Commands::Simulate {
            source,
            concurrency,
            deny,
            destroy,
        } => {
            let plan = source.load()?.build_plan()?;
            print!("{}", simulate(&plan, concurrency, &deny, destroy).await?);
            Ok(())
        }
        Commands::Declare { pipeline } => {
            println!("{}", pipeline.stack()?.to_json_string()?);
            Ok(())
        }
    }
}
