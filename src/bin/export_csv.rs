use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

use repost_watch::{config, db, export, service};

#[derive(Debug, Parser)]
#[command(about = "Export the repost lineage of a URL to a local CSV file.")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Repost request URL to export
    #[arg(long)]
    url: String,

    /// Account performing the export
    #[arg(long)]
    account: i64,

    /// Only include links published at or after this instant (RFC 3339)
    #[arg(long)]
    date_from: Option<DateTime<Utc>>,

    /// Only include links published before this instant (RFC 3339)
    #[arg(long)]
    date_to: Option<DateTime<Utc>>,

    /// Output file
    #[arg(long, default_value = "export.csv")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/repost.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let records =
        service::export_lineage(&pool, &args.url, args.account, args.date_from, args.date_to)
            .await?;
    tokio::fs::write(&args.out, export::render_csv(&records)).await?;
    println!("wrote {} rows to {}", records.len(), args.out.display());
    Ok(())
}
