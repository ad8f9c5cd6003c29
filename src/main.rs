use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod db;
mod import;
mod models;
mod predictor;
mod ranking;
mod report;

use models::{ExamType, PredictQuery, RoundPolicy};

#[derive(Parser)]
#[command(name = "cutoff-predictor")]
#[command(about = "College admission cutoff predictor backed by historical counselling data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load exams and counselling tracks
    Seed,
    /// List counselling tracks
    CounsellingTypes,
    /// Import cutoffs from a CSV file for one counselling track
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        counselling: String,
    },
    /// List previous imports, newest first
    Imports,
    /// Delete an import and every cutoff it brought in
    DeleteImport {
        #[arg(long)]
        id: Uuid,
    },
    /// Show how much data is loaded
    CheckData,
    /// Rank colleges by admission chance
    Predict {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown prediction report
    Report {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, default_value = "prediction-report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    rank: i64,
    #[arg(long)]
    category: String,
    #[arg(long)]
    quota: String,
    #[arg(long)]
    gender: String,
    /// Counselling track name; omit or pass "Multi" for every track
    #[arg(long)]
    counselling: Option<String>,
    #[arg(long, value_enum)]
    exam_type: Option<ExamType>,
    #[arg(long, value_enum, default_value = "all")]
    rounds: RoundPolicy,
}

impl From<QueryArgs> for PredictQuery {
    fn from(args: QueryArgs) -> Self {
        PredictQuery {
            rank: args.rank,
            category: args.category,
            quota: args.quota,
            gender: args.gender,
            counselling: args.counselling,
            exam_type: args.exam_type,
            rounds: args.rounds,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Exams and counselling tracks seeded.");
        }
        Commands::CounsellingTypes => {
            let types = db::fetch_counselling_types(&pool).await?;
            if types.is_empty() {
                println!("No counselling tracks yet. Run `seed` first.");
            }
            for track in types {
                println!(
                    "- [{}] {} ({})",
                    track.id,
                    track.name,
                    track.exam_name.as_deref().unwrap_or("no exam")
                );
            }
        }
        Commands::Import { csv, counselling } => {
            info!(file = %csv.display(), %counselling, "import started");
            let stats = db::import_csv(&pool, &csv, &counselling).await?;
            println!(
                "Imported {} rows from {} ({} rejected).",
                stats.success,
                csv.display(),
                stats.failed
            );
        }
        Commands::Imports => {
            let imports = db::fetch_imports(&pool).await?;
            if imports.is_empty() {
                println!("No imports recorded.");
            }
            for record in imports {
                println!(
                    "- {} {} [{}] {} rows at {}",
                    record.id,
                    record.filename,
                    record.counselling_name.as_deref().unwrap_or("unknown track"),
                    record.record_count,
                    record.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::DeleteImport { id } => {
            if db::delete_import(&pool, id).await? {
                println!("Import {id} and its cutoffs deleted.");
            } else {
                println!("No import with id {id}.");
            }
        }
        Commands::CheckData => {
            let summary = db::data_summary(&pool).await?;
            println!("Total cutoffs: {}", summary.total_cutoffs);
            for (category, quota, gender) in summary.buckets {
                println!("- {category} / {quota} / {gender}");
            }
        }
        Commands::Predict { query, limit, json } => {
            let query = PredictQuery::from(query);
            let rows = db::fetch_history(&pool, &query).await?;
            let mut results = ranking::rank_rows(&rows, query.rank, query.rounds)?;
            if let Some(limit) = limit {
                results.truncate(limit);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }

            if results.is_empty() {
                println!("No cutoff history matched this query.");
                return Ok(());
            }

            println!("Colleges by admission chance for rank {}:", query.rank);
            for record in &results {
                println!(
                    "- {} / {} [{}] expected {} (sigma {:.2}) {} {}%",
                    record.college,
                    record.branch,
                    record.counselling_type,
                    record.prediction.expected_cutoff,
                    record.prediction.sigma,
                    record.prediction.band.label(),
                    record.prediction.probability
                );
            }
        }
        Commands::Report { query, limit, out } => {
            let query = PredictQuery::from(query);
            let rows = db::fetch_history(&pool, &query).await?;
            let results = ranking::rank_rows(&rows, query.rank, query.rounds)?;
            let report = report::build_report(&query, &results, limit);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
