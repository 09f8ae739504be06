//! Strokewatch: Stroke-Risk Prediction Pipeline
//!
//! Command-line entry point for training, prediction and artifact inspection.

#![allow(non_snake_case)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use Strokewatch::adapters::csv_table::read_table;
use Strokewatch::adapters::sanitize::SanitizingMakeWriter;
use Strokewatch::adapters::FileArtifactStore;
use Strokewatch::application::{parse_jobs, BatchWorkerPool, OutcomeBody, ServingContext, TrainingService};
use Strokewatch::config::{LogMode, RuntimeConfig};
use Strokewatch::domain::{default_form_record, CLINICAL_PIPELINE};
use Strokewatch::ports::ArtifactStore;
use Strokewatch::preprocessing::parse_record;
use Strokewatch::{FeatureRecord, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "strokewatch", version, about = "Stroke-risk prediction pipeline")]
struct Cli {
    /// Artifact root directory (overrides STROKEWATCH_ARTIFACT_DIR)
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Which pipeline to work on: a built-in id or a JSON configuration file.
#[derive(Debug, clap::Args)]
struct PipelineArgs {
    /// Built-in pipeline id (clinical or categorical)
    #[arg(long, default_value = CLINICAL_PIPELINE, conflicts_with = "pipeline_config")]
    pipeline: String,

    /// Pipeline configuration JSON file
    #[arg(long)]
    pipeline_config: Option<PathBuf>,
}

impl PipelineArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        if let Some(path) = &self.pipeline_config {
            return PipelineConfig::from_json_file(path).map_err(anyhow::Error::msg);
        }
        PipelineConfig::builtin(&self.pipeline)
            .with_context(|| format!("Unknown pipeline {:?}", self.pipeline))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fit a pipeline on a CSV dataset and publish its artifacts
    Train {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Training dataset (CSV with a header row)
        #[arg(long)]
        data: PathBuf,
    },

    /// Predict one record with the pipeline's current artifacts
    Predict {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Record as a JSON object
        #[arg(long)]
        record: Option<String>,

        /// Field assignment name=value; may be repeated
        #[arg(long = "set", value_name = "NAME=VALUE")]
        assignments: Vec<String>,

        /// Start from the pipeline's form defaults
        #[arg(long)]
        form_defaults: bool,
    },

    /// Predict newline-delimited JSON records
    Batch {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Input file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Worker threads (overrides STROKEWATCH_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the active manifest and recorded runs of a pipeline
    Show {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut runtime = RuntimeConfig::from_env().context("Invalid environment configuration")?;
    if let Some(dir) = &cli.artifact_dir {
        runtime.artifact_dir.clone_from(dir);
    }

    // Stdout carries command output, so logs never go there unless asked for.
    let (writer, _guard) = match (runtime.log_file_target(), runtime.log_mode) {
        (Some(log_file), _) => {
            if let Some(parent) = log_file.parent() {
                // Best-effort: opening the file reports the real problem.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
            tracing_appender::non_blocking(file)
        }
        (None, LogMode::Stdout) => tracing_appender::non_blocking(io::stdout()),
        (None, _) => tracing_appender::non_blocking(io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let store = Arc::new(FileArtifactStore::new(&runtime.artifact_dir));
    tracing::debug!("Artifact root: {}", store.root().display());

    match cli.command {
        Command::Train { pipeline, data } => train(store, &pipeline.resolve()?, &data),
        Command::Predict {
            pipeline,
            record,
            assignments,
            form_defaults,
        } => {
            let config = pipeline.resolve()?;
            let record = build_record(&config, record.as_deref(), &assignments, form_defaults)?;
            predict(store, config, &record)
        }
        Command::Batch {
            pipeline,
            input,
            workers,
        } => batch(
            store,
            pipeline.resolve()?,
            input.as_deref(),
            workers.unwrap_or(runtime.workers),
        ),
        Command::Show { pipeline } => show(store.as_ref(), &pipeline.resolve()?),
    }
}

fn train(store: Arc<FileArtifactStore>, config: &PipelineConfig, data: &Path) -> Result<()> {
    let table = read_table(data).with_context(|| format!("Failed to read {}", data.display()))?;
    let report = TrainingService::new(store)
        .train(config, &table)
        .with_context(|| format!("Training of pipeline {} failed", config.id))?;

    tracing::info!(
        "Published run {} of {} (held-out accuracy {:.4})",
        report.manifest.run_id,
        report.manifest.pipeline,
        report.accuracy()
    );
    println!("{}", serde_json::to_string_pretty(&report.manifest)?);
    Ok(())
}

fn build_record(
    config: &PipelineConfig,
    json: Option<&str>,
    assignments: &[String],
    form_defaults: bool,
) -> Result<FeatureRecord> {
    let mut record = if form_defaults {
        match default_form_record(&config.id) {
            Some(Ok(record)) => record,
            Some(Err(errors)) => bail!("Invalid form defaults: {}", errors.join("; ")),
            None => bail!("Pipeline {:?} has no form defaults", config.id),
        }
    } else {
        FeatureRecord::new()
    };

    if let Some(json) = json {
        let parsed = parse_record(json).context("Invalid --record JSON")?;
        for name in parsed.names() {
            if let Some(value) = parsed.get(name) {
                record.insert(name, value.clone());
            }
        }
    }

    for assignment in assignments {
        let (name, value) = FeatureRecord::parse_assignment(assignment).map_err(anyhow::Error::msg)?;
        record.insert(&name, value);
    }

    if record.is_empty() {
        bail!("No input: pass --record, --set or --form-defaults");
    }
    Ok(record)
}

fn predict(store: Arc<FileArtifactStore>, config: PipelineConfig, record: &FeatureRecord) -> Result<()> {
    let id = config.id.clone();
    let context = ServingContext::load(store, vec![config])
        .with_context(|| format!("Failed to load artifacts of pipeline {id}"))?;
    let verdict = context.predict(&id, record)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn batch(store: Arc<FileArtifactStore>, config: PipelineConfig, input: Option<&Path>, workers: usize) -> Result<()> {
    let mut text = String::new();
    match input {
        Some(path) => {
            text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
        }
        None => {
            io::stdin().read_to_string(&mut text).context("Failed to read stdin")?;
        }
    }

    let id = config.id.clone();
    let context = ServingContext::load(store, vec![config])
        .with_context(|| format!("Failed to load artifacts of pipeline {id}"))?;
    let handle = BatchWorkerPool::spawn(context.service(&id)?, parse_jobs(&text), workers);

    let total = handle.total();
    let outcomes = handle.wait();

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o.result, OutcomeBody::Error(_)))
        .count();
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    tracing::info!("Batch finished: {} requests, {} failed", total, failed);
    Ok(())
}

fn show(store: &FileArtifactStore, config: &PipelineConfig) -> Result<()> {
    let manifest = store
        .current_manifest(&config.id)
        .with_context(|| format!("Failed to read current run of {}", config.id))?;
    let runs = store.list_runs(&config.id)?;

    let summary = serde_json::json!({
        "pipeline": config.id,
        "current": manifest,
        "runs": runs,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
