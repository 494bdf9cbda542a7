use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod classify;
mod db;
mod decay;
mod error;
mod interval;
mod models;
mod report;
mod source;

use models::RecordBatch;

#[derive(Parser)]
#[command(name = "review-queue")]
#[command(about = "Spaced-repetition review queue for scanned study notes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample documents
    Seed,
    /// Import documents from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show overdue, due-today and upcoming reviews
    Queue {
        /// Read documents from a .csv or .json file instead of the database
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long)]
        subject: Option<String>,
        /// Classify as of this time instead of now
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
        #[arg(long, default_value = "review-report.md")]
        out: PathBuf,
    },
    /// Record a completed review for a document
    Review {
        #[arg(long)]
        id: String,
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
    /// Print the estimated retention curve
    Curve {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    classify::parse_timestamp(value).ok_or_else(|| format!("unrecognized timestamp `{value}`"))
}

fn database_url(value: Option<String>) -> anyhow::Result<String> {
    value.filter(|url| !url.trim().is_empty()).context(
        "DATABASE_URL must be set for init-db, seed, import, review, \
         and for queue/report when --from is not given",
    )
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = database_url(std::env::var("DATABASE_URL").ok())?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_records(from: Option<&Path>, subject: Option<&str>) -> anyhow::Result<RecordBatch> {
    let batch = match from {
        Some(path) => source::filter_subject(source::load_records(path)?, subject),
        None => {
            let pool = connect().await?;
            RecordBatch::from(db::fetch_documents(&pool, subject).await?)
        }
    };

    info!(
        count = batch.records.len(),
        rejected = batch.rejected.len(),
        "loaded documents"
    );
    Ok(batch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("review_queue=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let clock = Utc::now();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let upserted = db::import_csv(&pool, &csv).await?;
            println!("Upserted {upserted} documents from {}.", csv.display());
        }
        Commands::Queue {
            from,
            subject,
            now,
            limit,
            json,
        } => {
            let now = now.unwrap_or(clock);
            let batch = load_records(from.as_deref(), subject.as_deref()).await?;
            let queue = classify::classify_batch(&batch, now);

            if json {
                let payload = serde_json::json!({
                    "generated_at": now,
                    "summary": queue.summary(),
                    "overdue": queue.overdue,
                    "due_today": queue.due_today,
                    "upcoming": queue.upcoming,
                    "skipped": queue.skipped,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if queue.is_empty() {
                println!("No documents need review.");
            }

            if !queue.overdue.is_empty() {
                println!("Overdue ({}):", queue.overdue.len());
                for entry in queue.overdue.iter().take(limit) {
                    println!(
                        "- {} [{}] {}% retained, {} days overdue",
                        report::document_label(&entry.document),
                        entry.document.id,
                        entry.retention_percent,
                        entry.overdue_days
                    );
                }
            }

            if !queue.due_today.is_empty() {
                println!("Due today ({}):", queue.due_today.len());
                for entry in queue.due_today.iter().take(limit) {
                    println!(
                        "- {} [{}] {}% retained",
                        report::document_label(&entry.document),
                        entry.document.id,
                        entry.retention_percent
                    );
                }
            }

            if !queue.upcoming.is_empty() {
                println!("Upcoming ({}):", queue.upcoming.len());
                for entry in queue.upcoming.iter().take(limit) {
                    println!(
                        "- {} [{}] due in {} days",
                        report::document_label(&entry.document),
                        entry.document.id,
                        entry.days_until_due
                    );
                }
            }

            for skipped in queue.skipped.iter() {
                eprintln!("Skipped {}: {}", skipped.document_id, skipped.reason);
            }
        }
        Commands::Report {
            from,
            subject,
            now,
            out,
        } => {
            let now = now.unwrap_or(clock);
            let batch = load_records(from.as_deref(), subject.as_deref()).await?;
            let queue = classify::classify_batch(&batch, now);
            let report = report::build_report(subject.as_deref(), now, &queue);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Review { id, now } => {
            let now = now.unwrap_or(clock);
            let pool = connect().await?;
            let document = db::record_review(&pool, &id, now).await?;
            match interval::next_due_at(&document) {
                Some(due) => println!(
                    "Recorded review {} of {}; next review {}.",
                    document.review_count,
                    document.title,
                    due.format("%Y-%m-%d")
                ),
                None => println!("Recorded review of {}.", document.title),
            }
        }
        Commands::Curve { days } => {
            println!("Estimated retention by days since last review:");
            for day in 0..=i64::from(days) {
                let percent = decay::estimate_retention(day)?;
                let marker = if decay::is_anchor_day(day) { " *" } else { "" };
                println!("{day:>4} days  {percent:>3}%{marker}");
            }
            println!("(* sampled forgetting-curve value)");
        }
    }

    Ok(())
}
