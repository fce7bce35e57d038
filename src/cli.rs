// Vidshelf CLI binary

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};

use vidshelf_lib::commands::{self, BulkRequest};
use vidshelf_lib::config::ScanConfig;
use vidshelf_lib::constants::SCAN_HISTORY_RETENTION_DAYS;
use vidshelf_lib::db::schema::{MediaFilter, ScanRun, ScanStatus};
use vidshelf_lib::db::Catalog;
use vidshelf_lib::jobs::scheduler::Scheduler;
use vidshelf_lib::jobs::ScanService;
use vidshelf_lib::preview::FfmpegTranscoder;
use vidshelf_lib::tools;

#[derive(Parser)]
#[command(name = "vidshelf")]
#[command(about = "Vidshelf - keep a video folder catalogued, previewed and deduplicated", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to the per-user config if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Media root; videos/, thumbs/ and the catalog default to living under it
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,

    /// Catalog database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan and print its summary
    Scan {
        /// Require matching content on top of name+size to treat a file as moved
        #[arg(long)]
        strict_moves: bool,
        /// Skip preview generation
        #[arg(long)]
        no_thumbnails: bool,
    },

    /// Scan on an interval until stdin closes or Enter is pressed
    Watch {
        /// Seconds between scans (overrides config)
        #[arg(long)]
        interval: Option<u64>,
        /// Don't scan immediately at start
        #[arg(long)]
        no_initial_scan: bool,
    },

    /// List catalogued media
    List {
        /// Show soft-deleted records instead of active ones
        #[arg(long)]
        deleted: bool,
        /// Only records flagged as duplicates
        #[arg(long)]
        duplicates: bool,
        /// Only records without a preview
        #[arg(long)]
        missing_thumbnail: bool,
        #[arg(long, default_value = "100")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show duplicate groups
    Duplicates {
        #[arg(long)]
        json: bool,
    },

    /// Show recent scan runs
    History {
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long)]
        json: bool,
    },

    /// Generate previews for records that have none
    Thumbnails,

    /// Soft-delete a record
    Delete {
        id: i64,
    },

    /// Restore a soft-deleted record
    Restore {
        id: i64,
    },

    /// Attach (or with --remove, detach) a tag
    Tag {
        id: i64,
        name: String,
        #[arg(long)]
        remove: bool,
    },

    /// Apply one action to many records: delete, restore, add_tags, remove_tags
    Bulk {
        action: String,
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Tag names for add_tags/remove_tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete finished scan runs older than N days
    PruneHistory {
        #[arg(long, default_value_t = SCAN_HISTORY_RETENTION_DAYS)]
        days: i64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Scan { strict_moves, no_thumbnails } => cmd_scan(config, strict_moves, no_thumbnails),
        Commands::Watch { interval, no_initial_scan } => cmd_watch(config, interval, no_initial_scan),
        Commands::List { deleted, duplicates, missing_thumbnail, limit, offset, json } => {
            let filter = MediaFilter {
                deleted: Some(deleted),
                duplicate: if duplicates { Some(true) } else { None },
                missing_thumbnail,
                limit: Some(limit),
                offset: Some(offset),
            };
            cmd_list(config, filter, json)
        }
        Commands::Duplicates { json } => cmd_duplicates(config, json),
        Commands::History { limit, json } => cmd_history(config, limit, json),
        Commands::Thumbnails => cmd_thumbnails(config),
        Commands::Delete { id } => cmd_set_deleted(config, id, true),
        Commands::Restore { id } => cmd_set_deleted(config, id, false),
        Commands::Tag { id, name, remove } => cmd_tag(config, id, name, remove),
        Commands::Bulk { action, ids, tags } => cmd_bulk(config, BulkRequest { action, ids, tags }),
        Commands::PruneHistory { days } => cmd_prune_history(config, days),
    }
}

fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = ScanConfig::load(cli.config.as_deref())?;
    if let Some(root) = &cli.media_root {
        config.media_root = root.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    Ok(config)
}

fn open_catalog(config: &ScanConfig) -> Result<Catalog> {
    let db_path = config.db_path();
    Catalog::open(&db_path).with_context(|| format!("Cannot open catalog at {}", db_path.display()))
}

fn open_service(config: ScanConfig) -> Result<ScanService> {
    let catalog = open_catalog(&config)?;

    if config.generate_thumbnails && !tools::is_tool_available("ffmpeg") {
        log::warn!("ffmpeg not found; previews will fail (set VIDSHELF_FFMPEG_PATH)");
    }
    if config.probe_metadata && !tools::is_tool_available("ffprobe") {
        log::warn!("ffprobe not found; media metadata will be empty (set VIDSHELF_FFPROBE_PATH)");
    }

    let transcoder = FfmpegTranscoder::new(config.thumbnail_timeout());
    Ok(ScanService::new(Arc::new(catalog), Arc::new(transcoder), config))
}

fn cmd_scan(mut config: ScanConfig, strict_moves: bool, no_thumbnails: bool) -> Result<()> {
    config.strict_move_detection |= strict_moves;
    if no_thumbnails {
        config.generate_thumbnails = false;
    }

    let service = open_service(config)?;
    println!("Scanning {}", service.config().watched_root().display());

    let run = commands::trigger_scan(&service)?;
    print_run(&run);

    if run.status == ScanStatus::Failed {
        anyhow::bail!("Scan failed");
    }
    Ok(())
}

fn cmd_watch(config: ScanConfig, interval: Option<u64>, no_initial_scan: bool) -> Result<()> {
    let service = Arc::new(open_service(config)?);

    let mut scheduler = Scheduler::new(Arc::clone(&service));
    if let Some(secs) = interval {
        scheduler = scheduler.with_interval(std::time::Duration::from_secs(secs.max(1)));
    }
    if no_initial_scan {
        scheduler = scheduler.with_scan_on_start(false);
    }

    scheduler.start()?;
    println!(
        "Watching {} (press Enter or close stdin to stop)",
        service.config().watched_root().display()
    );

    // Block until a line arrives or stdin hits EOF
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    println!("Stopping...");
    scheduler.stop();
    Ok(())
}

fn cmd_list(config: ScanConfig, filter: MediaFilter, json: bool) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let page = commands::list_media(&catalog, &filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No media found. Use 'vidshelf scan' to catalogue {}.", config.watched_root().display());
        return Ok(());
    }

    println!("{:>5}  {:>10}  {:>8}  {:>4}  {:>5}  {}", "ID", "Size", "Duration", "Dup", "Thumb", "Path");
    println!("{}", "-".repeat(78));

    for view in &page.items {
        let m = &view.record;
        let duration = m
            .media_info
            .as_ref()
            .and_then(|i| i.duration_secs)
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:>10}  {:>8}  {:>4}  {:>5}  {}",
            m.id,
            format_size(m.byte_size),
            duration,
            if m.duplicate { "yes" } else { "" },
            if m.thumbnail_path.is_some() { "yes" } else { "" },
            m.relative_path
        );
    }

    let shown = page.offset + page.items.len() as i64;
    if shown < page.total {
        println!();
        println!("Showing {} of {} records. Use --limit/--offset to see more.", page.items.len(), page.total);
    }

    Ok(())
}

fn cmd_duplicates(config: ScanConfig, json: bool) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let groups = commands::duplicate_groups(&catalog)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No duplicates found.");
        return Ok(());
    }

    for group in &groups {
        println!(
            "{} copies, {} each ({})",
            group.members.len(),
            format_size(group.byte_size),
            group.content_fingerprint
        );
        for member in &group.members {
            let marker = if member.id == group.keeper_id { "keep" } else { "    " };
            println!("  [{}] {:>5}  {}", marker, member.id, member.relative_path);
        }
        println!();
    }

    Ok(())
}

fn cmd_history(config: ScanConfig, limit: i64, json: bool) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let runs = commands::scan_history(&catalog, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No scans yet.");
        return Ok(());
    }

    println!(
        "{:>5}  {:>9}  {:>10}  {:>19}  {:>7}  {:>6}  {:>6}  {:>7}  {:>6}",
        "ID", "Trigger", "Status", "Started", "Elapsed", "Scanned", "Added", "Updated", "Errors"
    );
    println!("{}", "-".repeat(96));

    for run in &runs {
        let elapsed = run
            .elapsed_secs()
            .map(|s| format_duration(s as f64))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:>9}  {:>10}  {:>19}  {:>7}  {:>6}  {:>6}  {:>7}  {:>6}",
            run.id,
            run.trigger.as_str(),
            run.status.as_str(),
            run.started_at,
            elapsed,
            run.counters.scanned,
            run.counters.added,
            run.counters.updated,
            run.errors.len()
        );
    }

    Ok(())
}

fn cmd_thumbnails(config: ScanConfig) -> Result<()> {
    let service = open_service(config)?;
    let report = commands::generate_missing_thumbnails(&service)?;

    println!("Preview backfill:");
    println!("  Candidates:      {}", report.candidates);
    println!("  Generated:       {}", report.generated);
    println!("  Failed:          {}", report.failed);
    println!("  Source missing:  {}", report.missing_source);
    Ok(())
}

fn cmd_set_deleted(config: ScanConfig, id: i64, deleted: bool) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let view = commands::set_deleted(&catalog, id, deleted)?;
    let verb = if deleted { "Deleted" } else { "Restored" };
    println!("{} #{} {}", verb, view.record.id, view.record.relative_path);
    Ok(())
}

fn cmd_tag(config: ScanConfig, id: i64, name: String, remove: bool) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let changed = if remove {
        commands::detach_tag(&catalog, id, &name)?
    } else {
        commands::attach_tag(&catalog, id, &name)?
    };

    let tags = commands::get_media(&catalog, id)?.tags;
    if !changed {
        println!("Nothing to do.");
    }
    println!("#{} tags: {}", id, if tags.is_empty() { "(none)".to_string() } else { tags.join(", ") });
    Ok(())
}

fn cmd_bulk(config: ScanConfig, request: BulkRequest) -> Result<()> {
    let catalog = open_catalog(&config)?;
    let result = commands::bulk_action(&catalog, &request)?;
    println!("{}: {} of {} records changed", result.action.as_str(), result.affected, request.ids.len());
    Ok(())
}

fn cmd_prune_history(config: ScanConfig, days: i64) -> Result<()> {
    let service = open_service(config)?;
    let deleted = commands::prune_scan_history(&service, days)?;
    println!("Deleted {} scan runs older than {} days", deleted, days);
    Ok(())
}

// --- Helper Functions ---

fn print_run(run: &ScanRun) {
    println!();
    println!("Scan #{} {}:", run.id, run.status);
    println!("  Scanned:     {}", run.counters.scanned);
    println!("  Added:       {}", run.counters.added);
    println!("  Updated:     {}", run.counters.updated);
    println!("  Duplicates:  {}", run.counters.duplicates_found);
    if let Some(secs) = run.elapsed_secs() {
        println!("  Elapsed:     {}", format_duration(secs as f64));
    }
    if !run.errors.is_empty() {
        println!("  Errors:      {}", run.errors.len());
        for error in run.errors.iter().take(20) {
            println!("    - {}", error);
        }
        if run.errors.len() > 20 {
            println!("    ... and {} more", run.errors.len() - 20);
        }
    }
}

fn format_duration(secs: f64) -> String {
    let total_seconds = secs.round() as i64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
