use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use offheap_core::Arch;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "offheap")]
#[command(about = "Runtime signature scanner and unmanaged object layout tool")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List modules loaded into this process
    Modules {
        /// Only show modules whose name contains this string
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Print or save the builtin pattern set
    Patterns {
        /// Write the pattern set as JSON instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scan a module image on disk for a routine
    Scan {
        /// Module image to scan
        file: PathBuf,

        /// Routine to look for
        #[arg(short, long, default_value = offheap_core::TRIAL_ALLOC_FAST)]
        routine: String,

        /// Pattern set JSON file (defaults to the builtin set)
        #[arg(short, long, env = "OFFHEAP_PATTERNS")]
        patterns: Option<PathBuf>,

        /// Architecture whose patterns are tried (x86, x86_64, aarch64, any)
        #[arg(short, long)]
        arch: Option<Arch>,
    },
    /// Locate the runtime module in this process and resolve a routine
    Locate {
        #[arg(short, long, default_value = offheap_core::TRIAL_ALLOC_FAST)]
        routine: String,

        /// Candidate module names (defaults to the known runtime modules)
        #[arg(short, long)]
        module: Vec<String>,
    },
    /// Print the native object header layout
    Layout,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("offheap=info".parse()?))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Modules { filter } => commands::modules::run(filter.as_deref()),
        Command::Patterns { output } => commands::patterns::run(output.as_deref()),
        Command::Scan {
            file,
            routine,
            patterns,
            arch,
        } => commands::scan::run(&file, &routine, patterns.as_deref(), arch),
        Command::Locate { routine, module } => commands::locate::run(&routine, &module),
        Command::Layout => commands::layout::run(),
    }
}
