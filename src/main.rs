use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use muninflux::commands::{self, DumpSummary, FetchSummary, ImportSummary};
use muninflux::consolidate::Stage;
use muninflux::packager::{Connection, MetricMapping};
use muninflux::{MigrationSettings, PointSink};
use muninflux_adapters::influxdb::InfluxDbSink;
use muninflux_adapters::rrdtool::RrdtoolDumper;
use muninflux_adapters::{ArchiveDumper, FileSink};

#[derive(Parser, Debug)]
#[command(name = "muninflux")]
#[command(about = "Migrate Munin history to InfluxDB and forward live readings")]
#[command(version)]
struct Cli {
    /// TOML settings file layered over the built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump every archive to the staging folder
    Dump(MigrationArgs),

    /// Import the full history into InfluxDB and write the fetch mapping
    Import {
        #[command(flatten)]
        migration: MigrationArgs,

        /// One measurement per field instead of one per plugin
        #[arg(long)]
        per_field: bool,

        /// Parse documents left by an earlier `dump` instead of dumping again
        #[arg(long)]
        from_staged: bool,

        /// Leave staged documents on disk
        #[arg(long)]
        keep_temp: bool,

        /// Write line protocol to this file instead of InfluxDB
        #[arg(long, value_name = "FILE")]
        dry_run: Option<PathBuf>,
    },

    /// Send the latest readings of a running Munin to InfluxDB
    Fetch {
        /// Mapping written by `import`
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Write line protocol to this file instead of InfluxDB
        #[arg(long, value_name = "FILE")]
        dry_run: Option<PathBuf>,
    },
}

/// Flags shared by `dump` and `import`.
#[derive(Args, Debug)]
struct MigrationArgs {
    /// Munin var folder holding the archives
    #[arg(long)]
    munin: Option<PathBuf>,

    /// Folder for dumped documents
    #[arg(long)]
    staging: Option<PathBuf>,

    /// Concurrent dump jobs
    #[arg(short, long)]
    workers: Option<usize>,

    /// Walk the archive folder even when the datafile is usable
    #[arg(long)]
    discover: bool,

    /// rrdtool executable
    #[arg(long, default_value = "rrdtool")]
    rrdtool: PathBuf,
}

impl MigrationArgs {
    fn apply(&self, settings: &mut MigrationSettings) {
        if let Some(munin) = &self.munin {
            settings.paths.munin = munin.clone();
        }
        if let Some(staging) = &self.staging {
            settings.paths.staging = staging.clone();
        }
        if let Some(workers) = self.workers {
            settings.consolidation.workers = workers;
        }
        if self.discover {
            settings.discovery.always = true;
        }
    }

    fn dumper(&self) -> Arc<dyn ArchiveDumper> {
        Arc::new(RrdtoolDumper::with_program(&self.rrdtool))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = MigrationSettings::load(cli.config.as_deref())
        .context("Failed to load settings")?;

    // Build a tokio runtime
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Command::Dump(args) => {
            args.apply(&mut settings);
            let summary = rt.block_on(async {
                let cancel = cancel_on_ctrl_c();
                commands::dump(&settings, args.dumper(), cancel).await
            })?;
            print_dump(&settings, &summary);
        }
        Command::Import {
            migration,
            per_field,
            from_staged,
            keep_temp,
            dry_run,
        } => {
            migration.apply(&mut settings);
            if per_field {
                settings.influxdb.group_fields = false;
            }
            if keep_temp {
                settings.consolidation.keep_temp = true;
            }
            let stage = if from_staged {
                Stage::Parse
            } else {
                Stage::DumpAndParse
            };

            let summary = rt.block_on(async {
                let sink: Box<dyn PointSink> = match &dry_run {
                    Some(path) => Box::new(FileSink::new(path)),
                    None => {
                        let sink = influx_sink(
                            &Connection::from(&settings.influxdb),
                            settings.influxdb.timeout_secs,
                        )?;
                        sink.ensure_database()
                            .await
                            .context("Could not connect to InfluxDB")?;
                        Box::new(sink)
                    }
                };
                let cancel = cancel_on_ctrl_c();
                let summary =
                    commands::import(&settings, migration.dumper(), sink.as_ref(), stage, cancel)
                        .await?;
                Ok::<_, anyhow::Error>(summary)
            })?;
            print_import(&summary);
            if !summary.rejected.is_empty() {
                anyhow::bail!(
                    "{} of {} batches were rejected",
                    summary.rejected.len(),
                    summary.rejected.len() + summary.batches
                );
            }
        }
        Command::Fetch { mapping, dry_run } => {
            let path = mapping.unwrap_or_else(|| settings.paths.mapping.clone());
            let summary = rt.block_on(fetch(&path, dry_run.as_deref(), &settings))?;
            print_fetch(&summary);
            if !summary.rejected.is_empty() {
                anyhow::bail!("{} state files were not written", summary.rejected.len());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// A flag that turns true on the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing archives in progress");
            raise(&tx);
        }
    });
    rx
}

/// Set the cancel flag. Returns false when nothing is listening any more.
fn raise(tx: &watch::Sender<bool>) -> bool {
    let delivered = tx.send(true).is_ok();
    if !delivered {
        debug!("Interrupt arrived after the run finished");
    }
    delivered
}

fn influx_sink(connection: &Connection, timeout_secs: u64) -> Result<InfluxDbSink> {
    InfluxDbSink::builder()
        .endpoint(&connection.endpoint)
        .credentials(&connection.user, &connection.password)
        .database(&connection.database)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create InfluxDB sink")
}

async fn fetch(
    path: &Path,
    dry_run: Option<&Path>,
    settings: &MigrationSettings,
) -> Result<FetchSummary> {
    let mut mapping = MetricMapping::load(path)
        .with_context(|| format!("Could not open mapping {}", path.display()))?;
    info!("Opened mapping {}", path.display());

    let sink: Box<dyn PointSink> = match dry_run {
        Some(out) => Box::new(FileSink::new(out)),
        None => Box::new(influx_sink(
            &mapping.influxdb,
            settings.influxdb.timeout_secs,
        )?),
    };

    let summary = commands::fetch(&mut mapping, sink.as_ref()).await;

    if dry_run.is_none() {
        mapping.save(path)?;
        info!("Updated mapping {}", path.display());
    }
    Ok(summary)
}

fn print_dump(settings: &MigrationSettings, summary: &DumpSummary) {
    println!(
        "Archives: {} found, {} missing, {} orphaned",
        summary.found, summary.missing, summary.orphans
    );
    if summary.skipped_lines > 0 {
        println!("Skipped {} malformed datafile lines", summary.skipped_lines);
    }
    println!(
        "Dumped {} archives to {}",
        summary.dumped,
        settings.paths.staging.display()
    );
    if summary.failed > 0 {
        println!("{} archives could not be dumped", summary.failed);
    }
    if summary.cancelled > 0 {
        println!("Cancelled: {} archives not dumped", summary.cancelled);
    }
}

fn print_import(summary: &ImportSummary) {
    println!(
        "Archives: {} found, {} missing, {} orphaned",
        summary.found, summary.missing, summary.orphans
    );
    if summary.skipped_lines > 0 {
        println!("Skipped {} malformed datafile lines", summary.skipped_lines);
    }
    println!(
        "Consolidated {} fields ({} failed)",
        summary.consolidated, summary.failed
    );
    println!(
        "Wrote {} points in {} batches",
        summary.points, summary.batches
    );
    for err in &summary.rejected {
        println!("  {}", err);
    }
    if let Some(lastupdate) = summary.lastupdate {
        println!("Fetch will continue after {}", lastupdate);
    }
    match &summary.mapping {
        Some(path) => println!("Fetch mapping written to {}", path.display()),
        None => println!(
            "Cancelled: {} archives not processed, no mapping written",
            summary.cancelled
        ),
    }
}

fn print_fetch(summary: &FetchSummary) {
    println!(
        "Read {} state files, wrote {} points",
        summary.parsed, summary.points
    );
    for err in summary.unreadable.iter().chain(&summary.rejected) {
        println!("  {}", err);
    }
    for warning in &summary.warnings {
        println!("  {}", warning);
    }
    if summary.empty > 0 {
        println!(
            "{} state files had no data, is Munin still running?",
            summary.empty
        );
    }
}
