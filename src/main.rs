use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use smdtool::batch::{self, BatchConfig};
use smdtool::logging::{self, LogLevel, ResultExt};
use smdtool::smd;

#[derive(Parser)]
#[command(name = "smdtool")]
#[command(about = "SMD skeleton and animation editing tool")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch job file
    Run {
        /// Path to the JSON job file
        jobs: PathBuf,
    },

    /// Write an example batch job file
    Template {
        /// Where to write the job file
        jobs: PathBuf,
    },

    /// Print the bones and frame count of an SMD file
    Info {
        input: PathBuf,
    },

    /// Parse an SMD file and write it back in canonical form
    Normalize {
        input: PathBuf,
        output: PathBuf,
    },

    /// Dump one frame of an SMD file as OBJ geometry
    Obj {
        input: PathBuf,

        /// Output .obj file (default: input with .obj extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame to dump
        #[arg(long, default_value_t = 0)]
        frame: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    match run(cli.command).log_error(None) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(_) => process::exit(2),
    }
}

/// Returns `false` when the command completed but some work failed.
fn run(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Run { jobs } => {
            let config = batch::load_batch_config(&jobs)?;
            let report = batch::run_batch(&config)?;

            println!(
                "Processed: {}, Failed: {}",
                report.processed.len(),
                report.failed.len()
            );
            for label in &report.failed {
                println!("  failed: {label}");
            }
            return Ok(report.failed.is_empty());
        }

        Commands::Template { jobs } => {
            batch::save_batch_config(&jobs, &BatchConfig::example())?;
            tracing::info!("Wrote {}", jobs.display());
        }

        Commands::Info { input } => {
            let animation = smd::load_animation(&input)?;

            println!("Animation: {}", animation.name);
            println!(
                "Bones: {}, Frames: {}",
                animation.bone_count(),
                animation.frame_count()
            );
            for node in &animation.nodes {
                let parent = node
                    .parent
                    .map_or("-", |parent| animation.nodes[parent].name.as_str());
                println!("{:3} {:<32} parent: {}", node.index, node.name, parent);
            }
            println!("Hierarchy residual: {:e}", animation.hierarchy_residual());
        }

        Commands::Normalize { input, output } => {
            let animation = smd::load_animation(&input)?;
            smd::save_animation(&animation, &output)?;
        }

        Commands::Obj {
            input,
            output,
            frame,
        } => {
            let animation = smd::load_animation(&input)?;
            if frame >= animation.frame_count() {
                bail!(
                    "frame {} is out of range for {} ({} frames)",
                    frame,
                    animation.name,
                    animation.frame_count()
                );
            }

            let output = output.unwrap_or_else(|| input.with_extension("obj"));
            smd::save_skeleton_obj(&animation, frame, &output)
                .with_context(|| format!("failed to dump {}", input.display()))?;
        }
    }

    Ok(true)
}
