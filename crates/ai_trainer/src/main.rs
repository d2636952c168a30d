//! Practicas outcome model CLI
//!
//! Exports training data, trains and stores forests, scores single records
//! and manages stored artifact versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use practicas_ai_core::{
    ArtifactStore, InMemorySource, PredictionTask, Predictor, UnknownCategoryPolicy,
};
use practicas_ai_trainer::{
    load_from_source, train_from_csv, TrainerConfig, TrainingJobs, TrainingParams,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "practicas-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and serve internship outcome predictors", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Artifact store directory (overrides the configuration)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the labeled training rows of a task as CSV
    Export {
        /// Prediction task: agreement or task
        #[arg(short, long)]
        task: PredictionTask,

        /// JSON dump of joined records
        #[arg(short, long)]
        source: PathBuf,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Train a forest and replace the stored artifact
    Train {
        #[arg(short, long)]
        task: PredictionTask,

        /// JSON dump of joined records
        #[arg(short, long, conflicts_with = "csv", required_unless_present = "csv")]
        source: Option<PathBuf>,

        /// CSV export to train from instead of a record dump
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Seed for splitting and bagging
        #[arg(long)]
        seed: Option<u64>,

        /// Refuse to store a model whose held-out F1 is below this
        #[arg(long)]
        min_f1: Option<f64>,
    },

    /// Score one record by identifier
    Predict {
        #[arg(short, long)]
        task: PredictionTask,

        /// JSON dump of joined records
        #[arg(short, long)]
        source: PathBuf,

        /// Agreement or task identifier
        #[arg(long)]
        id: Uuid,

        /// Store the predicted label back into the dump
        #[arg(long)]
        annotate: bool,

        /// Unknown-category policy at serving time: bucket or reject
        #[arg(long)]
        unknown: Option<UnknownCategoryPolicy>,
    },

    /// Describe the current artifact of a task
    Inspect {
        #[arg(short, long)]
        task: PredictionTask,
    },

    /// List stored artifact versions of a task
    Versions {
        #[arg(short, long)]
        task: PredictionTask,
    },

    /// Make an earlier artifact current again
    Rollback {
        #[arg(short, long)]
        task: PredictionTask,

        /// Artifact hash or a prefix of at least 8 characters
        hash: String,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

fn load_source(path: &Path) -> Result<Arc<InMemorySource>> {
    let source = InMemorySource::load(path)
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    Ok(Arc::new(source))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config =
        TrainerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(store) = cli.store {
        config.store_dir = store;
    }

    match cli.command {
        Commands::Export {
            task,
            source,
            output,
        } => {
            let source = load_source(&source)?;
            let table = load_from_source(source.as_ref(), task)?;
            table
                .write_csv_path(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(%task, rows = table.len(), output = %output.display(), "export written");
        }

        Commands::Train {
            task,
            source,
            csv,
            trees,
            max_depth,
            seed,
            min_f1,
        } => {
            let mut params: TrainingParams = config.training_params(task);
            if let Some(trees) = trees {
                params.forest.n_trees = trees;
            }
            if let Some(max_depth) = max_depth {
                params.forest.max_depth = max_depth;
            }
            if let Some(seed) = seed {
                params.forest.seed = seed;
            }
            if min_f1.is_some() {
                params.min_f1 = min_f1;
            }

            let store = Arc::new(config.open_store().context("Failed to open artifact store")?);
            match (source, csv) {
                (Some(source), _) => {
                    let jobs = TrainingJobs::new(store, load_source(&source)?, config.job_timeout());
                    let id = jobs.submit(params);
                    let status = jobs.wait(id).await?;
                    print_json(&status)?;
                    status
                        .state
                        .into_result(jobs.timeout())
                        .with_context(|| format!("Training job {id} did not succeed"))?;
                }
                (None, Some(csv)) => {
                    let artifact = tokio::task::spawn_blocking(move || train_from_csv(&csv, params))
                        .await
                        .context("Training worker failed")??;
                    store.put(task, &artifact)?;
                    print_json(&artifact.info())?;
                }
                (None, None) => bail!("either --source or --csv is required"),
            }
        }

        Commands::Predict {
            task,
            source,
            id,
            annotate,
            unknown,
        } => {
            let records = load_source(&source)?;
            let store = Arc::new(config.open_store().context("Failed to open artifact store")?);
            let mut predictor = Predictor::new(store, records.clone());
            if let Some(policy) = unknown {
                predictor = predictor.with_unknown_policy(policy);
            }

            let result = predictor.predict(task, id, annotate)?;
            if annotate {
                records
                    .save(&source)
                    .with_context(|| format!("Failed to annotate {}", source.display()))?;
            }
            print_json(&result)?;
        }

        Commands::Inspect { task } => {
            let store = config.open_store().context("Failed to open artifact store")?;
            let artifact = store.get(task)?;
            let forest = &artifact.pipeline.forest;
            print_json(&serde_json::json!({
                "artifact": artifact.info(),
                "params": artifact.pipeline.params,
                "unknown_policy": artifact.pipeline.preprocessor.unknown_policy,
                "columns": artifact.pipeline.schema.column_names().collect::<Vec<_>>(),
                "max_depth": forest.max_depth(),
                "split_counts": forest.split_counts(),
            }))?;
        }

        Commands::Versions { task } => {
            let store = config.open_store().context("Failed to open artifact store")?;
            print_json(&store.versions(task)?)?;
        }

        Commands::Rollback { task, hash } => {
            let store = config.open_store().context("Failed to open artifact store")?;
            let info = store.rollback(task, &hash)?;
            info!(%task, hash = %info.hash, "rolled back");
            print_json(&info)?;
        }
    }

    Ok(())
}
