use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use panel_merge::{
    IntegrityPolicy, PanelError, Pipeline, PipelineConfig, PipelineReport, StageSelection,
    TracingSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "panel-merge")]
#[command(about = "Build a monthly entity panel from an entity CSV and an indicator CSV")]
#[command(version)]
struct Args {
    /// JSON configuration file (defaults apply to anything it leaves out)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report integrity violations as warnings instead of failing
    #[arg(long, global = true)]
    lenient: bool,

    /// Write a JSON run report here
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw entity panel
    CleanEntity {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Clean the raw indicator series
    CleanIndicator {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Merge the cleaned tables into the analysis panel
    Merge {
        #[arg(long)]
        entity: Option<PathBuf>,
        #[arg(long)]
        indicator: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Run all three stages
    Run {
        #[arg(long)]
        raw_entity: Option<PathBuf>,
        #[arg(long)]
        raw_indicator: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        summary: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<PanelError>() {
            Some(err) if err.is_recoverable() => {
                warn!("{}", err);
                ExitCode::from(2)
            }
            _ => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.lenient {
        config.merge.policy = IntegrityPolicy::Warn;
    }
    if args.report.is_some() {
        config.paths.report = args.report.clone();
    }

    let stages = apply_overrides(&mut config, args.command);
    info!(?stages, policy = ?config.merge.policy, "starting");

    let pipeline = Pipeline::new(config);
    let report = pipeline.run(stages, &mut TracingSink)?;
    print_summary(&report);
    Ok(())
}

/// Command-line paths take precedence over the config file
fn apply_overrides(config: &mut PipelineConfig, command: Commands) -> StageSelection {
    let paths = &mut config.paths;
    let set = |slot: &mut PathBuf, value: Option<PathBuf>| {
        if let Some(v) = value {
            *slot = v;
        }
    };

    match command {
        Commands::CleanEntity { input, output } => {
            set(&mut paths.raw_entity, input);
            set(&mut paths.clean_entity, output);
            StageSelection::CleanEntity
        }
        Commands::CleanIndicator { input, output } => {
            set(&mut paths.raw_indicator, input);
            set(&mut paths.clean_indicator, output);
            StageSelection::CleanIndicator
        }
        Commands::Merge {
            entity,
            indicator,
            output,
            summary,
        } => {
            set(&mut paths.clean_entity, entity);
            set(&mut paths.clean_indicator, indicator);
            set(&mut paths.panel, output);
            set(&mut paths.summary, summary);
            StageSelection::Merge
        }
        Commands::Run {
            raw_entity,
            raw_indicator,
            output,
            summary,
        } => {
            set(&mut paths.raw_entity, raw_entity);
            set(&mut paths.raw_indicator, raw_indicator);
            set(&mut paths.panel, output);
            set(&mut paths.summary, summary);
            StageSelection::All
        }
    }
}

fn print_summary(report: &PipelineReport) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(r) = &report.entity_cleaning {
        println!("✓ {}", r.summary());
    }
    if let Some(r) = &report.indicator_cleaning {
        println!("✓ {}", r.summary());
    }
    if let Some(m) = &report.merge {
        println!(
            "✓ merge: {} rows, {} matched, {}",
            m.panel_rows,
            m.matched_rows,
            m.reconciliation.summary()
        );
    }
    if let Some(v) = &report.validation {
        println!("✓ validation: {}", v.summary());
    }
    for output in &report.outputs {
        println!("  → {} ({} rows, {} bytes)", output.path.display(), output.rows, output.bytes);
    }
    if let Some(digest) = &report.panel_sha256 {
        println!("  panel sha256: {}", digest);
    }
    println!("  run id: {}", report.run_id);
}
