//! # AutoTap — scheduled tap automation
//!
//! Usage:
//!   autotap run                               # Run active configurations until Ctrl-C
//!   autotap add-config --name "Daily login" --repeat 3 --active
//!   autotap add-point 1 --x 540 --y 1200 --delay-ms 500
//!   autotap list
//!   autotap export 1 ./backups                # Write a JSON bundle
//!   autotap import ./backups/autotap_Daily_login_20260309_070501.json

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use autotap_core::traits::{Clock, GestureEffector};
use autotap_core::{ActivationWindow, AutoTapConfig, ClickPoint, ConfigId, Configuration};
use autotap_scheduler::{
    ConfigDb, DbSource, SchedulerSupervisor, TokioClock, build_effector, export_bundle,
    export_file_name, import_bundle,
};
use chrono::{DateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "autotap",
    version,
    about = "👆 AutoTap — scheduled tap automation"
)]
struct Cli {
    /// Config file (default: ~/.autotap/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every active configuration until Ctrl-C
    Run {
        /// Log worker status every N seconds (0 = never)
        #[arg(long, default_value = "0")]
        status_every: u64,
    },
    /// List configurations
    List,
    /// Create a configuration
    AddConfig {
        #[arg(long)]
        name: String,
        /// Cycles to run (0 = forever)
        #[arg(long, default_value = "0")]
        repeat: u32,
        /// Pause between cycles
        #[arg(long, default_value = "0")]
        global_delay_ms: u64,
        /// Absolute window start (RFC 3339)
        #[arg(long, requires = "until")]
        from: Option<String>,
        /// Absolute window end (RFC 3339)
        #[arg(long, requires = "from")]
        until: Option<String>,
        /// Daily window start (HH:MM[:SS], UTC)
        #[arg(long, requires = "daily_end", conflicts_with = "from")]
        daily_start: Option<String>,
        /// Daily window end (HH:MM[:SS], UTC)
        #[arg(long, requires = "daily_start")]
        daily_end: Option<String>,
        /// Activate immediately
        #[arg(long)]
        active: bool,
    },
    /// Append a click point to a configuration
    AddPoint {
        configuration: ConfigId,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        #[arg(long)]
        size: Option<f32>,
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Mark a configuration active
    Activate { id: ConfigId },
    /// Mark a configuration inactive
    Deactivate { id: ConfigId },
    /// Copy a configuration and its points
    Duplicate { id: ConfigId },
    /// Delete a configuration and its points
    Delete { id: ConfigId },
    /// Import a JSON bundle
    Import { file: PathBuf },
    /// Export a configuration as a JSON bundle into a directory
    Export { id: ConfigId, dir: String },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&str>) -> Result<(AutoTapConfig, PathBuf)> {
    let path = match path {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => AutoTapConfig::default_path(),
    };
    let config = if path.exists() {
        AutoTapConfig::load_from(&path)?
    } else {
        AutoTapConfig::default()
    };
    Ok((config, path))
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "autotap=debug,autotap_scheduler=debug"
    } else {
        "autotap=info,autotap_scheduler=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn parse_window(
    from: Option<String>,
    until: Option<String>,
    daily_start: Option<String>,
    daily_end: Option<String>,
) -> Result<Option<ActivationWindow>> {
    if let (Some(from), Some(until)) = (from, until) {
        let start = DateTime::parse_from_rfc3339(&from)
            .with_context(|| format!("invalid --from '{from}'"))?;
        let end = DateTime::parse_from_rfc3339(&until)
            .with_context(|| format!("invalid --until '{until}'"))?;
        return Ok(Some(ActivationWindow::absolute(
            start.with_timezone(&Utc),
            end.with_timezone(&Utc),
        )));
    }
    if let (Some(start), Some(end)) = (daily_start, daily_end) {
        return Ok(Some(ActivationWindow::daily(
            parse_time_of_day(&start)?,
            parse_time_of_day(&end)?,
        )));
    }
    Ok(None)
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .with_context(|| format!("invalid time of day '{s}' (expected HH:MM or HH:MM:SS)"))
}

fn describe_window(window: &Option<ActivationWindow>) -> String {
    match window {
        None => "always".into(),
        Some(ActivationWindow::Absolute { start, end }) => format!(
            "{} → {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        ),
        Some(ActivationWindow::Daily { start, end }) => {
            format!("daily {} → {} UTC", start.format("%H:%M"), end.format("%H:%M"))
        }
    }
}

async fn run(config: &AutoTapConfig, db: Arc<ConfigDb>, status_every: u64) -> Result<()> {
    let effector = build_effector(&config.effector)?;
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let source = Arc::new(DbSource::new(
        db.clone(),
        clock.clone(),
        Duration::from_millis(config.storage.poll_ms),
    ));
    let supervisor = SchedulerSupervisor::new(source, effector.clone(), clock, &config.scheduler);

    let active = db.active_configurations()?;
    println!("👆 AutoTap v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:  {}", config.storage.database_path().display());
    println!("   🎯 Effector:  {}", effector.name());
    println!("   ▶️  Active:    {} configuration(s)", active.len());
    println!("   Press Ctrl-C to stop.");
    println!();

    supervisor.start().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    if status_every > 0 {
        let mut ticker = tokio::time::interval(Duration::from_secs(status_every));
        ticker.tick().await;
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result.context("waiting for Ctrl-C")?;
                    break;
                }
                _ = ticker.tick() => {
                    for state in supervisor.workers().await {
                        tracing::info!(
                            "📊 config {}: {} | cycles {} | taps {} | missed {} | skipped {}",
                            state.configuration_id,
                            state.phase,
                            state.completed_cycles,
                            state.taps_requested,
                            state.taps_missed,
                            state.points_skipped
                        );
                    }
                }
            }
        }
    } else {
        shutdown.await.context("waiting for Ctrl-C")?;
    }

    println!("\n⏹️  Stopping...");
    supervisor.stop().await;
    Ok(())
}

fn list(db: &ConfigDb) -> Result<()> {
    let configs = db.list_configurations()?;
    if configs.is_empty() {
        println!("📭 No configurations yet. Create one with `autotap add-config`.");
        return Ok(());
    }
    for c in configs {
        let points = db.points_for(c.id)?;
        let repeat = if c.repeat_count == 0 {
            "∞".to_string()
        } else {
            c.repeat_count.to_string()
        };
        println!(
            "{} [{}] {} — {} point(s), repeat {}, delay {}ms, window {}",
            if c.is_active { "🟢" } else { "⚪" },
            c.id,
            c.name,
            points.len(),
            repeat,
            c.global_delay_ms,
            describe_window(&c.window)
        );
        for p in points {
            let label = if p.name.is_empty() { String::new() } else { format!(" {}", p.name) };
            println!(
                "     #{}{label} ({:.0}, {:.0}) size {:.0}, then {}ms",
                p.order, p.x, p.y, p.size, p.delay_ms
            );
        }
    }
    Ok(())
}

fn export(db: &ConfigDb, id: ConfigId, dir: &str) -> Result<PathBuf> {
    let configuration = db
        .get_configuration(id)?
        .with_context(|| format!("configuration {id} not found"))?;
    let points = db.points_for(id)?;
    let dir = PathBuf::from(shellexpand::tilde(dir).to_string());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(export_file_name(&configuration.name, Utc::now()));
    export_bundle(&configuration, &points, &path)?;
    Ok(path)
}

fn import(db: &ConfigDb, file: &Path) -> Result<ConfigId> {
    let bundle = import_bundle(file, db.limits())?;
    let mut configuration = bundle.configuration;
    configuration.id = 0;
    configuration.created_at = Utc::now();
    Ok(db.insert_with_points(&configuration, &bundle.click_points)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, config.logging.json);

    if let Command::InitConfig { force } = cli.command {
        if config_path.exists() && !force {
            bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }
        AutoTapConfig::default().save_to(&config_path)?;
        println!("✅ Wrote {}", config_path.display());
        return Ok(());
    }

    let db = Arc::new(
        ConfigDb::open(&config.storage.database_path())?.with_limits(config.points.clone()),
    );

    match cli.command {
        Command::Run { status_every } => run(&config, db, status_every).await?,
        Command::List => list(&db)?,
        Command::AddConfig {
            name,
            repeat,
            global_delay_ms,
            from,
            until,
            daily_start,
            daily_end,
            active,
        } => {
            let mut configuration = Configuration::new(&name).with_repeat(repeat, global_delay_ms);
            configuration.window = parse_window(from, until, daily_start, daily_end)?;
            configuration.is_active = active;
            let id = db.insert_configuration(&configuration)?;
            println!("✅ Created configuration '{name}' ({id})");
        }
        Command::AddPoint {
            configuration,
            x,
            y,
            size,
            delay_ms,
            name,
        } => {
            let mut point = ClickPoint::new(configuration, x, y, db.limits());
            if let Some(size) = size {
                point.size = size;
            }
            if let Some(delay_ms) = delay_ms {
                point.delay_ms = delay_ms;
            }
            point.name = name;
            point.order = db.next_order(configuration)?;
            let id = db.insert_point(&point)?;
            println!("✅ Added point {id} at order {}", point.order);
        }
        Command::Activate { id } => {
            db.set_active(id, true)?;
            println!("🟢 Configuration {id} active");
        }
        Command::Deactivate { id } => {
            db.set_active(id, false)?;
            println!("⚪ Configuration {id} inactive");
        }
        Command::Duplicate { id } => {
            let copy = db.duplicate_configuration(id)?;
            println!("✅ Duplicated {id} as {copy}");
        }
        Command::Delete { id } => {
            db.delete_configuration(id)?;
            println!("🗑️ Deleted configuration {id}");
        }
        Command::Import { file } => {
            let id = import(&db, &file)?;
            println!("✅ Imported {} as configuration {id}", file.display());
        }
        Command::Export { id, dir } => {
            let path = export(&db, id, &dir)?;
            println!("📦 Exported to {}", path.display());
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
