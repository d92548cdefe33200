use anyhow::Result;
use clap::{Parser, Subcommand};
use herdmap::{config::PipelineConfig, pipeline, report::RunReport};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Reconcile yearly HERD survey extracts into one wide table"
)]
struct Cli {
    /// YAML config; unset fields keep their defaults.
    #[arg(long, global = true, env = "HERDMAP_CONFIG")]
    config: Option<PathBuf>,
    /// Override `raw_dir`.
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,
    /// Override `threads` (0 = one per core).
    #[arg(long, global = true)]
    threads: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track every question identity across years and write the schema report.
    Scan,
    /// Turn the schema report into the mapping artifact.
    GenerateMapping,
    /// Load every extract through the mapping into the unified table.
    Reconcile,
    /// scan, generate-mapping and reconcile in order.
    Run,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.raw_dir {
        cfg.raw_dir = dir.clone();
    }
    if let Some(n) = cli.threads {
        cfg.threads = n;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) config ───────────────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    info!(raw_dir = %cfg.raw_dir.display(), threads = cfg.threads, "startup");

    // ─── 3) run the requested stage(s) ───────────────────────────────
    let reports: Vec<RunReport> = match cli.command {
        Command::Scan => vec![pipeline::run_scan(&cfg)?],
        Command::GenerateMapping => vec![pipeline::run_generate(&cfg)?],
        Command::Reconcile => vec![pipeline::run_reconcile(&cfg)?],
        Command::Run => pipeline::run_all(&cfg)?,
    };

    for report in &reports {
        print!("{}", report);
    }
    info!("all done");
    Ok(())
}
