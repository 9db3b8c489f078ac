//! Thought Canvas CLI - grow a topic tree headlessly and inspect its layout.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use thought_canvas_layout::LayoutMode;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

mod commands;
mod config;

use commands::explore::{ExploreOptions, OutputFormat};
use config::Config;

/// Thought Canvas CLI - explore a topic as a laid-out tree.
#[derive(Parser, Debug)]
#[command(
    name = "tc",
    author,
    version,
    about = "Thought Canvas: grow and lay out topic trees",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an exploration and print the resulting layout.
    Explore {
        /// Root topic.
        topic: String,

        /// Generations to grow below the root.
        #[arg(short, long, default_value_t = 1)]
        depth: usize,

        /// Children requested per expansion (overrides config).
        #[arg(short, long)]
        breadth: Option<usize>,

        /// Use the built-in offline generator instead of an LLM endpoint.
        #[arg(long)]
        offline: bool,

        /// Layout strategy: force or deterministic (overrides config).
        #[arg(short, long)]
        layout: Option<LayoutMode>,

        /// Layout frames to simulate before printing.
        #[arg(short, long, default_value_t = 120)]
        ticks: u32,

        /// Output format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Viewport width in pixels (overrides config).
        #[arg(long)]
        width: Option<f32>,

        /// Viewport height in pixels (overrides config).
        #[arg(long)]
        height: Option<f32>,
    },

    /// Inspect CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show,

    /// Show path to config file.
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Explore {
            topic,
            depth,
            breadth,
            offline,
            layout,
            ticks,
            format,
            output,
            width,
            height,
        } => {
            let mut config = Config::load(cli.config.as_deref())?;
            let engine = &mut config.engine;
            if let Some(breadth) = breadth {
                engine.expansion.desired_children = breadth;
            }
            if let Some(layout) = layout {
                engine.layout = layout;
            }
            if let Some(width) = width {
                engine.viewport.width = width;
            }
            if let Some(height) = height {
                engine.viewport.height = height;
            }

            let format: OutputFormat = format.parse()?;
            commands::explore::execute(
                config.engine,
                ExploreOptions {
                    topic,
                    depth,
                    offline,
                    ticks,
                    format,
                    output,
                },
            )
            .await?;
        }

        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                let config = Config::load(cli.config.as_deref())?;
                commands::config::show(&config)?;
            }
            ConfigCommands::Path => commands::config::path(),
        },
    }

    Ok(())
}
