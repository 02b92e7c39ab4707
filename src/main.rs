use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use docsentinel_lib::config::ClassifierConfig;
use docsentinel_lib::core_state::CoreState;
use docsentinel_lib::models::{Classification, FeedbackSubmission};

#[derive(Parser)]
#[command(name = "docsentinel", version, about = "Classify document sensitivity and learn from reviewer feedback")]
struct Cli {
    /// HITL database file (defaults to ~/DocSentinel/hitl_feedback.db)
    #[arg(long, global = true, env = "DOCSENTINEL_DB_PATH")]
    db: Option<PathBuf>,

    /// Skip secondary verification for low-confidence results
    #[arg(long, global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify files one by one and write them to the audit trail
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Classify a file again and audit it as a re-classification
    Reclassify {
        file: PathBuf,
        /// Audit entry this run supersedes
        #[arg(long)]
        previous: Option<i64>,
    },
    /// Classify files as one tracked batch job
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Record a reviewer verdict on an audited classification
    Feedback {
        #[arg(long)]
        document_id: i64,
        #[arg(long)]
        original: String,
        #[arg(long)]
        corrected: String,
        #[arg(long)]
        reviewer: String,
        #[arg(long, default_value = "")]
        comments: String,
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Frequent corrections and per-class reviewer agreement
    Insights,
    /// Audit trail totals and per-class confidence
    Stats,
    /// Classifications still waiting for review
    Unreviewed {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Every learned misclassification pattern
    Patterns,
    /// Audit trail, newest first
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long)]
        include_reviewed: bool,
    },
    /// Reviewer feedback, newest first
    History {
        #[arg(long)]
        document_id: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_label(label: &str) -> anyhow::Result<Classification> {
    match Classification::from_label(label) {
        Classification::Unknown => bail!(
            "unknown classification '{label}' (expected one of: {})",
            Classification::all()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        class => Ok(class),
    }
}

fn main() -> anyhow::Result<()> {
    docsentinel_lib::init_tracing();
    let cli = Cli::parse();

    let mut config = ClassifierConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if cli.no_verify {
        config.enable_dual_verification = false;
    }

    let state = CoreState::open(config).context("failed to initialise DocSentinel")?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    match cli.command {
        Command::Classify { files } => {
            let items = runtime.block_on(async {
                let mut items = Vec::with_capacity(files.len());
                for path in &files {
                    items.push(state.classify_file(path).await);
                }
                items
            });
            print_json(&items)
        }
        Command::Reclassify { file, previous } => {
            let item = runtime.block_on(state.reclassify(&file, previous));
            print_json(&item)
        }
        Command::Batch { files } => {
            let job = runtime.block_on(state.run_batch(files))?;
            print_json(&job)
        }
        Command::Feedback {
            document_id,
            original,
            corrected,
            reviewer,
            comments,
            confidence,
        } => {
            let submission = FeedbackSubmission {
                document_id,
                original_classification: parse_label(&original)?,
                corrected_classification: parse_label(&corrected)?,
                reviewer_name: reviewer,
                comments,
                confidence_at_review: confidence,
                evidence: serde_json::json!([]),
            };
            let id = state.recorder().record(&submission)?;
            print_json(&serde_json::json!({
                "feedback_id": id,
                "agreement": submission.is_agreement(),
            }))
        }
        Command::Insights => print_json(&state.recorder().insights()?),
        Command::Stats => print_json(&state.store().classification_stats()?),
        Command::Unreviewed { limit } => print_json(&state.store().unreviewed(limit)?),
        Command::Patterns => print_json(&state.store().learned_patterns()?),
        Command::Audit {
            limit,
            include_reviewed,
        } => print_json(&state.store().audit_trail(limit, include_reviewed)?),
        Command::History { document_id, limit } => {
            print_json(&state.store().feedback_history(document_id, limit)?)
        }
    }
}
