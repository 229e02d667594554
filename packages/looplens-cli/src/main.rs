mod render;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use looplens_core::Timeline;
use looplens_scheduler::{LineMode, TimelineGenerator};
use render::{Detail, Summary};
use settings::Overrides;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "looplens")]
#[command(about = "Step through how an event loop schedules a script", long_about = None)]
struct Cli {
    /// JSON file with generator settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Stop after this many event-loop passes
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// How snapshots pick the highlighted source line
    #[arg(long, global = true, value_enum)]
    line_mode: Option<LineModeArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the timeline for a script and print it
    Run {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Print a single step of the timeline
    Show {
        file: PathBuf,
        /// Step index, clamped to the timeline
        #[arg(long)]
        at: usize,
    },
    /// Print each step in turn
    Play {
        file: PathBuf,
        #[arg(long, default_value_t = 800)]
        interval_ms: u64,
        #[arg(long, default_value_t = 0)]
        from: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LineModeArg {
    Heuristic,
    CallSite,
}

impl From<LineModeArg> for LineMode {
    fn from(arg: LineModeArg) -> Self {
        match arg {
            LineModeArg::Heuristic => LineMode::Heuristic,
            LineModeArg::CallSite => LineMode::CallSite,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        max_iterations: cli.max_iterations,
        line_mode: cli.line_mode.map(LineMode::from),
    };
    let config = settings::load(cli.config.as_deref(), &overrides)?;
    let generator = TimelineGenerator::with_config(config);

    match cli.command {
        Commands::Run { file, format } => {
            let timeline = timeline_for(&generator, &file)?;
            match format {
                Format::Text => print!("{}", Summary(&timeline)),
                Format::Json => {
                    let json = serde_json::to_string_pretty(&timeline)
                        .context("Failed to serialize timeline")?;
                    println!("{json}");
                }
            }
        }
        Commands::Show { file, at } => {
            let timeline = timeline_for(&generator, &file)?;
            if let Some(snapshot) = timeline.at(at) {
                print!(
                    "{}",
                    Detail {
                        snapshot,
                        total: timeline.len(),
                    }
                );
            }
        }
        Commands::Play {
            file,
            interval_ms,
            from,
        } => {
            let timeline = timeline_for(&generator, &file)?;
            let interval = Duration::from_millis(interval_ms);
            for snapshot in timeline.iter().skip(from) {
                println!(
                    "{}",
                    Detail {
                        snapshot,
                        total: timeline.len(),
                    }
                );
                std::thread::sleep(interval);
            }
        }
    }

    Ok(())
}

fn timeline_for(generator: &TimelineGenerator, file: &Path) -> Result<Timeline> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script {}", file.display()))?;
    tracing::info!(file = %file.display(), "generating timeline");
    Ok(generator.generate(&source))
}
