use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dormant_archive::config::{parse_instant, threshold_days};
use dormant_archive::{
    ArchiveStore, DeleteScope, FileArchiveStore, FileEventStore, FileReportSink, RetentionConfig,
    RetentionRun, render_text,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dormant-archive")]
#[command(about = "Archive and remove dormant users from an event log")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify dormant users, archive their history and delete it from the live store
    Run {
        /// Live event log. A plain JSON array of events is accepted on first
        /// use; the run rewrites the file with the events that remain.
        #[arg(long)]
        events: PathBuf,
        /// Archive snapshot file
        #[arg(long, default_value = "archive/archived_users.msgpack")]
        archive: PathBuf,
        #[arg(long)]
        reports_dir: Option<PathBuf>,
        /// Evaluation instant (RFC 3339 or YYYY-MM-DD); defaults to now
        #[arg(long)]
        now: Option<String>,
        #[arg(long)]
        registration_days: Option<i64>,
        #[arg(long)]
        activity_days: Option<i64>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// `snapshot` or `all`
        #[arg(long)]
        delete_scope: Option<DeleteScope>,
        /// Print the dormant users without archiving or deleting
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// List archived users
    ShowArchive {
        #[arg(long, default_value = "archive/archived_users.msgpack")]
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            events,
            archive,
            reports_dir,
            now,
            registration_days,
            activity_days,
            concurrency,
            delete_scope,
            dry_run,
        } => {
            let mut config =
                RetentionConfig::from_env().context("failed to load configuration")?;
            if let Some(raw) = now {
                config.now = Some(parse_instant(&raw)?);
            }
            if let Some(days) = registration_days {
                config.registration_age_threshold = threshold_days("--registration-days", days)?;
            }
            if let Some(days) = activity_days {
                config.activity_age_threshold = threshold_days("--activity-days", days)?;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(scope) = delete_scope {
                config.delete_scope = scope;
            }
            if let Some(dir) = reports_dir {
                config.reports_dir = dir;
            }
            run(config, events, archive, dry_run).await
        }
        Command::ShowArchive { archive } => show_archive(archive).await,
    };

    if let Err(err) = &result {
        error!(error = %err, "dormant-archive failed");
    }
    result
}

async fn run(
    config: RetentionConfig,
    events: PathBuf,
    archive: PathBuf,
    dry_run: bool,
) -> Result<()> {
    let event_store = Arc::new(
        FileEventStore::open(&events)
            .await
            .with_context(|| format!("failed to open event log '{}'", events.display()))?,
    );
    let loaded = event_store.len().await;
    info!(events = loaded, source = %events.display(), "event log opened");

    let archive_store = Arc::new(
        FileArchiveStore::open(&archive)
            .await
            .with_context(|| format!("failed to open archive '{}'", archive.display()))?,
    );
    let sink = Arc::new(FileReportSink::new(&config.reports_dir));

    let retention = RetentionRun::new(event_store, archive_store, config)?.with_report_sink(sink);

    if dry_run {
        let now = retention.config().evaluation_instant();
        let candidates = retention.plan(now).await?;
        println!("Dormant users at {}: {}", now.format("%Y-%m-%d %H:%M:%S"), candidates.len());
        for candidate in &candidates {
            println!(
                "  {}  last activity {}  registered {}  events {}",
                candidate.user_id,
                candidate.last_event_time.format("%Y-%m-%d %H:%M:%S"),
                candidate.registration_date.format("%Y-%m-%d"),
                candidate.documents_count()
            );
        }
        return Ok(());
    }

    let outcome = retention.execute().await?;
    print!("{}", render_text(&outcome.report, Some(&outcome.summary)));
    if let Some(location) = &outcome.report_location {
        println!("Report saved to: {location}");
    }
    println!("Archival finished: {}", outcome.now.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

async fn show_archive(archive: PathBuf) -> Result<()> {
    let store = FileArchiveStore::open(&archive)
        .await
        .with_context(|| format!("failed to open archive '{}'", archive.display()))?;
    let records = store.list_archive_records().await?;

    println!("Archive: {}", archive.display());
    println!("Archived users: {}", records.len());
    for record in records {
        println!(
            "- {} <{}> archived {} (last activity {}, {} events)",
            record.user_id,
            record.email,
            record.archived_date.format("%Y-%m-%d"),
            record.last_activity.format("%Y-%m-%d %H:%M:%S"),
            record.documents_count
        );
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dormant_archive=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
