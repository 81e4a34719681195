//! CLI command definitions for loraforge.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::caption::{CaptionDatasetEditor, DEFAULT_TRIGGER_WORD};
use crate::pipeline::{PipelineConfig, PipelineOrchestrator, PipelineOutcome};
use crate::workflow;

use super::overrides::apply_overrides;

/// LoRA dataset preparation and training orchestration.
#[derive(Parser)]
#[command(name = "loraforge")]
#[command(about = "Prepare an image dataset and drive LoRA fine-tuning")]
#[command(version)]
#[command(
    long_about = "loraforge patches a ComfyUI captioning workflow, rewrites the generated \
captions to inject a trigger word, templates the trainer config/command files and runs the \
external cache/train tools as one sequential pipeline.\n\nExample usage:\n  loraforge run \
--root ./project tw=zed123 in=./project/dataset"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline: patch workflow, caption, rewrite, template, train.
    Run(RunArgs),

    /// Inject a trigger word into every caption file in a directory.
    #[command(alias = "tw")]
    Captions(CaptionsArgs),

    /// Point the captioning workflow at an image and output directory.
    PatchWorkflow(PatchWorkflowArgs),

    /// Substitute resolved paths into the trainer config/command files.
    PatchConfigs(PatchConfigsArgs),
}

/// Arguments for `loraforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Pipeline root directory (dataset/, input/, configs/, commands/, models/).
    #[arg(short, long, default_value = ".", env = "LORAFORGE_ROOT")]
    pub root: PathBuf,

    /// Per-stage timeout in seconds.
    #[arg(long, default_value = "3600")]
    pub stage_timeout_secs: u64,

    /// Bound on concurrently rewritten caption files.
    #[arg(long, default_value = "8")]
    pub caption_concurrency: usize,

    /// Write the full pipeline report as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Lenient key=value overrides: in=<image dir>, triggerword=<word>, tw=<word>.
    /// Unrecognized or malformed overrides are ignored.
    #[arg(trailing_var_arg = true)]
    pub overrides: Vec<String>,
}

/// Arguments for `loraforge captions`.
#[derive(Parser, Debug)]
pub struct CaptionsArgs {
    /// Directory holding the .txt caption files.
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Trigger word to inject (falls back to the default when empty).
    #[arg(short, long, default_value = DEFAULT_TRIGGER_WORD)]
    pub trigger_word: String,

    /// Process files one at a time instead of concurrently.
    #[arg(long)]
    pub blocking: bool,

    /// Bound on concurrently processed files.
    #[arg(long, default_value = "8")]
    pub concurrency: usize,
}

/// Arguments for `loraforge patch-workflow`.
#[derive(Parser, Debug)]
pub struct PatchWorkflowArgs {
    /// Workflow document to patch.
    #[arg(short, long)]
    pub workflow: PathBuf,

    /// Directory the captioner should load images from.
    #[arg(short, long)]
    pub images: PathBuf,

    /// Directory the captioner should write captions/images to.
    #[arg(short, long)]
    pub captions: PathBuf,
}

/// Arguments for `loraforge patch-configs`.
#[derive(Parser, Debug)]
pub struct PatchConfigsArgs {
    /// Pipeline root directory.
    #[arg(short, long, default_value = ".", env = "LORAFORGE_ROOT")]
    pub root: PathBuf,
}

/// Parses the command line.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Captions(args) => run_captions(args).await,
        Commands::PatchWorkflow(args) => {
            let patched = workflow::patch(&args.workflow, &args.images, &args.captions)
                .with_context(|| format!("patching {}", args.workflow.display()))?;
            info!("Patched {} nodes", patched);
            Ok(())
        }
        Commands::PatchConfigs(args) => run_patch_configs(args),
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::for_root(&args.root)
        .with_stage_timeout(Duration::from_secs(args.stage_timeout_secs))
        .with_caption_concurrency(args.caption_concurrency);
    let config = apply_overrides(config, &args.overrides);

    let orchestrator = PipelineOrchestrator::new(config)?;
    let report = orchestrator.run().await;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    match &report.outcome {
        PipelineOutcome::Succeeded => Ok(()),
        PipelineOutcome::Failed { stage, cause } => {
            anyhow::bail!("pipeline failed at stage {stage}: {cause}")
        }
    }
}

async fn run_captions(args: CaptionsArgs) -> anyhow::Result<()> {
    let editor = CaptionDatasetEditor::new(resolve_trigger_word(&args.trigger_word))
        .with_max_concurrent_files(args.concurrency);

    let summary = if args.blocking {
        editor.apply(&args.dir)?
    } else {
        editor.apply_concurrent(&args.dir).await?
    };

    info!("Rewrote {} caption files", summary.files_rewritten);
    if !summary.is_complete() {
        for failure in &summary.failures {
            warn!("Failed: {} ({})", failure.path.display(), failure.error);
        }
        anyhow::bail!("{} caption files failed to rewrite", summary.failures.len());
    }
    Ok(())
}

fn run_patch_configs(args: PatchConfigsArgs) -> anyhow::Result<()> {
    use crate::template::{self, rules};

    let config = PipelineConfig::for_root(&args.root);
    let dataset_jsonl = config.dataset_jsonl_path();

    let mut replaced = 0;
    replaced += template::rewrite_file(
        &config.dataset_config_path,
        &rules::dataset_config_rules(&dataset_jsonl),
    )?;
    replaced += template::rewrite_file(
        &config.trainer_config_path,
        &rules::trainer_config_rules(&config.dataset_config_path, &config.models),
    )?;
    let command_rules = rules::command_file_rules(&config.dataset_config_path, &config.models);
    for path in config.command_arg_files() {
        replaced += template::rewrite_file(path, &command_rules)?;
    }

    info!("Replaced {} directive lines", replaced);
    Ok(())
}

/// Resolves a trigger word, falling back to the default when empty.
fn resolve_trigger_word(raw: &str) -> String {
    let word = raw.trim();
    if word.is_empty() {
        DEFAULT_TRIGGER_WORD.to_string()
    } else {
        word.to_string()
    }
}
