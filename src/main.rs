mod cli;

use clipshare::{
    remove_media, run_sweeper, sweep_expired, IngestRequest, Ingestor, WorkerPool, WorkerSettings,
};
use cs_av::{FfmpegConverter, ToolRegistry};
use cs_core::config::Config;
use cs_core::probe::{format_bitrate, format_duration, format_size, parse_frame_rate};
use cs_core::{EventBus, JobQueue, MediaConverter, MediaId, MediaStore};
use cs_db::{get_conn, init_pool, DbPool, SqliteJobQueue, SqliteStore};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Load config from file (or defaults), apply environment overrides and
/// reject unusable settings.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    config.apply_env().context("Invalid environment override")?;
    config.check()?;
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

fn open_pool(config: &Config) -> Result<DbPool> {
    let db_path = config.storage.database_path();
    tracing::info!("Opening database at {}", db_path.display());
    init_pool(&db_path).with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn build_converter(config: &Config) -> Arc<FfmpegConverter> {
    let tools = ToolRegistry::discover(&config.tools);
    Arc::new(FfmpegConverter::new(tools, config.conversion.clone()))
}

fn parse_media_id(id: &str) -> Result<MediaId> {
    id.parse()
        .with_context(|| format!("Invalid media id: {id:?}"))
}

async fn serve(config: Config, workers: Option<usize>) -> Result<()> {
    let db = open_pool(&config)?;
    let store: Arc<dyn MediaStore> = Arc::new(SqliteStore::new(db.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(db));
    let converter = build_converter(&config);
    let events = Arc::new(EventBus::new(config.events.subscriber_buffer));

    let mut settings = WorkerSettings::from_config(&config);
    if let Some(n) = workers {
        settings.count = n.max(1);
    }

    tracing::info!("Starting clipshare pipeline");
    let span = tracing::info_span!("pipeline", workers = settings.count);
    let pool = WorkerPool::new(queue, store.clone(), converter, events, settings).with_span(span);

    let cancel = CancellationToken::new();
    let worker_handles = pool.start(cancel.clone())?;
    let sweeper_handle = tokio::spawn(run_sweeper(
        store,
        std::time::Duration::from_secs(config.retention.sweep_interval_secs.max(1)),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    // Cleanup
    tracing::info!("Shutting down; waiting for in-flight jobs");
    cancel.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task panicked: {}", e);
        }
    }
    let _ = sweeper_handle.await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn ingest(
    config: Config,
    file: &Path,
    codecs: Vec<cs_core::Codec>,
    fps: Option<u32>,
    retention_days: Option<u32>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }

    let db = open_pool(&config)?;
    let ingestor = Ingestor::new(
        Arc::new(SqliteStore::new(db.clone())),
        Arc::new(SqliteJobQueue::new(db)),
        build_converter(&config),
        config.storage.uploads_dir(),
    );

    let days = retention_days.unwrap_or(config.retention.default_days);
    let request = IngestRequest::new(file, days).codecs(codecs).fps(fps);
    let media = ingestor.ingest(request).await?;

    println!("Media: {}", media.id);
    println!("Type: {}", media.media_type);
    println!("Status: {}", media.status);
    println!("Expires: {} ({} days)", media.expires_at.to_rfc3339(), media.days_remaining());
    for variant in &media.variants {
        println!("  queued {}", variant.codec);
    }
    Ok(())
}

async fn run_once(config: Config) -> Result<()> {
    let db = open_pool(&config)?;
    let pool = WorkerPool::new(
        Arc::new(SqliteJobQueue::new(db.clone())),
        Arc::new(SqliteStore::new(db)),
        build_converter(&config),
        Arc::new(EventBus::default()),
        WorkerSettings::from_config(&config),
    );

    let mut processed = 0usize;
    while pool.process_one().await? {
        processed += 1;
    }
    println!("Processed {} job(s)", processed);
    Ok(())
}

fn show_status(config: &Config, id: &str, json: bool) -> Result<()> {
    let id = parse_media_id(id)?;
    let db = open_pool(config)?;
    let media = SqliteStore::new(db.clone()).get(&id)?;
    let jobs = SqliteJobQueue::new(db).jobs_for_media(&id)?;

    if json {
        let value = serde_json::json!({ "media": media, "jobs": jobs });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Media: {} ({})", media.id, media.original_name);
    println!("Type: {}", media.media_type);
    print!("Status: {}", media.status);
    if let Some(ref msg) = media.error_message {
        print!(" ({})", msg);
    }
    println!();
    if let Some(ref path) = media.converted_path {
        print!("Output: {}", path);
        if let Some(codec) = media.codec {
            print!(" [{}]", codec);
        }
        if let (Some(w), Some(h)) = (media.width, media.height) {
            print!(" {}x{}", w, h);
        }
        if let Some(size) = media.file_size {
            print!(", {}", format_size(size));
        }
        println!();
    }
    if let Some(ref thumb) = media.thumb_path {
        println!("Thumbnail: {}", thumb);
    }
    if media.is_expired() {
        println!("Expired: {}", media.expires_at.to_rfc3339());
    } else {
        println!("Expires in {} day(s)", media.days_remaining());
    }

    println!("\nVariants: {}", media.variants.len());
    for v in &media.variants {
        print!("  {} {}", v.codec, v.status);
        if let Some(ref path) = v.path {
            print!(" {}", path);
        }
        if let Some(ref msg) = v.error_message {
            print!(" ({})", msg);
        }
        println!();
    }

    println!("\nJobs: {}", jobs.len());
    for job in &jobs {
        print!("  #{} {} {}", job.id, job.kind, job.status);
        if let Some(codec) = job.codec {
            print!(" [{}]", codec);
        }
        print!(" attempts={}", job.attempts);
        if let Some(ref msg) = job.error_message {
            print!(" ({})", msg);
        }
        println!();
    }
    Ok(())
}

fn list_media(config: &Config, json: bool) -> Result<()> {
    let pool = open_pool(config)?;
    let store = SqliteStore::new(pool.clone());
    let all = store.list_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    if all.is_empty() {
        println!("No media stored.");
        return Ok(());
    }
    for media in &all {
        println!(
            "{}  {:<10} {:<6} {:>3}d  {}",
            media.id,
            media.status,
            media.media_type,
            media.days_remaining(),
            media.original_name
        );
    }

    let conn = get_conn(&pool)?;
    let counts = cs_db::queries::jobs::count_by_status(&conn)?;
    if !counts.is_empty() {
        let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}: {n}")).collect();
        println!("\nJobs  {}", summary.join("  "));
    }
    Ok(())
}

async fn delete(config: &Config, id: &str) -> Result<()> {
    let id = parse_media_id(id)?;
    let store = SqliteStore::new(open_pool(config)?);
    remove_media(&store, &id).await?;
    println!("Deleted {}", id);
    Ok(())
}

async fn sweep(config: &Config) -> Result<()> {
    let store = SqliteStore::new(open_pool(config)?);
    let report = sweep_expired(&store, Utc::now()).await?;
    println!("Removed {} expired media", report.removed.len());
    for (id, err) in &report.failed {
        println!("  failed {}: {}", id, err);
    }
    Ok(())
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let converter = build_converter(config);
    let probe = converter.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Container: {}", probe.format.format_name);
    if let Some(secs) = probe.duration_secs() {
        println!("Duration: {}", format_duration(secs));
    }
    if let Some(ref rate) = probe.format.bit_rate {
        println!("Bitrate: {}", format_bitrate(rate));
    }
    println!("\nStreams: {}", probe.streams.len());
    for stream in &probe.streams {
        print!("  [{}] {} {}", stream.index, stream.codec_type, stream.codec_name);
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            print!(" {}x{}", w, h);
        }
        if let Some(fps) = stream.avg_frame_rate.as_deref().map(parse_frame_rate) {
            if fps > 0.0 {
                print!(" {:.2}fps", fps);
            }
        }
        if let Some(ch) = stream.channels {
            print!(" {}ch", ch);
        }
        println!();
    }

    match (probe.video_stream(), probe.audio_stream()) {
        (Some(_), _) => println!("\nType: video"),
        (None, Some(_)) => println!("\nType: audio"),
        (None, None) => println!("\nType: no audio or video streams"),
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions will fail until they are installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            config.check()?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Data dir: {}", config.storage.data_dir.display());
    println!("  Database: {}", config.storage.database_path().display());
    println!("  Workers: {}", config.workers.count);
    println!("  Retention: {} days", config.retention.default_days);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in &warnings {
            println!("  - {}", w);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipshare=debug,cs_db=debug,cs_av=debug,cs_core=debug".to_string()
        } else {
            "clipshare=info,cs_db=info,cs_av=info,cs_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    if let Commands::Validate { config: config_path } = &cli.command {
        let path = config_path.clone().or(cli.config);
        return validate_config(path.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve { workers } => rt.block_on(serve(config, workers)),
        Commands::Ingest {
            file,
            codecs,
            fps,
            retention_days,
        } => rt.block_on(ingest(config, &file, codecs, fps, retention_days)),
        Commands::RunOnce => rt.block_on(run_once(config)),
        Commands::Status { id, json } => show_status(&config, &id, json),
        Commands::List { json } => list_media(&config, json),
        Commands::Delete { id } => rt.block_on(delete(&config, &id)),
        Commands::Sweep => rt.block_on(sweep(&config)),
        Commands::Probe { file, json } => rt.block_on(probe_file(&config, &file, json)),
        Commands::CheckTools => check_tools(&config),
        Commands::Validate { .. } => Ok(()),
    }
}
