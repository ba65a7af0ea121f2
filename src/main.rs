//! linkorder - dependency-ordered transitive closure
//!
//! Command line entry point: parses arguments, sets up logging and hands
//! off to the command structs in `linkorder::commands`.

use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use linkorder::commands::{
    load_config, ClasspathCommand, LibrariesCommand, OrderCommand, RunCommand,
};
use linkorder::build::BuildError;
use linkorder::core::LinkOrderError;
use linkorder::{APP_NAME, VERSION};

/// Order build and link dependencies so every node follows what it needs
#[derive(Parser)]
#[command(name = "linkorder")]
#[command(version)]
#[command(about = "Dependency-ordered transitive closure for link, load and classpath ordering")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Order the nodes of a dependency graph file (JSON or TOML)
    Order {
        /// Graph file mapping each node to its direct dependencies
        #[arg(long)]
        graph: PathBuf,
        /// Fail on dependency cycles instead of breaking them
        #[arg(long)]
        strict: bool,
        /// Print the order as a JSON array
        #[arg(long)]
        json: bool,
        /// Roots to start from; every node when omitted
        roots: Vec<String>,
    },
    /// Write the load-ordered native library list for an APK
    Libraries {
        /// Root libraries (GN list or plain names); repeatable
        #[arg(long = "input-libraries", required = true)]
        input_libraries: Vec<String>,
        /// Directory holding the built libraries; repeatable
        #[arg(long = "libraries-dir", required = true)]
        libraries_dirs: Vec<PathBuf>,
        /// Manifest output path
        #[arg(long)]
        output: PathBuf,
        /// Depfile to write
        #[arg(long)]
        depfile: Option<PathBuf>,
        /// Libraries to leave out (GN list); repeatable
        #[arg(long = "exclude-shared-libraries")]
        exclude_shared_libraries: Vec<String>,
        /// readelf binary
        #[arg(long)]
        readelf: Option<PathBuf>,
        /// NDK to take llvm-readelf from
        #[arg(long)]
        ndk: Option<PathBuf>,
        /// Concurrent readelf processes
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Fail on dependency cycles instead of breaking them
        #[arg(long)]
        strict: bool,
    },
    /// Print the jar classpath for build targets in load order
    Classpath {
        /// Build graph file (JSON or TOML)
        #[arg(long = "build-graph")]
        build_graph: PathBuf,
        /// Fail on dependency cycles instead of breaking them
        #[arg(long)]
        strict: bool,
        /// Print the classpath as a JSON array
        #[arg(long)]
        json: bool,
        /// Targets to build the classpath for
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Run tasks from a task file in dependency order
    Run {
        /// Task file with [[task]] entries
        #[arg(long)]
        tasks: PathBuf,
        /// Maximum tasks running at once
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Keep running independent tasks after a failure
        #[arg(short, long)]
        keep_going: bool,
        /// Fail on dependency cycles instead of breaking them
        #[arg(long)]
        strict: bool,
        /// Tasks to run; every task when omitted
        targets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("{} v{} starting", APP_NAME, VERSION);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let core = err.downcast_ref::<LinkOrderError>().or_else(|| {
                match err.downcast_ref::<BuildError>() {
                    Some(BuildError::Core(core)) => Some(core),
                    _ => None,
                }
            });
            match core {
                Some(core) => {
                    eprintln!("error: {}", core.user_message());
                    // Exit code 2 for bad input files, 1 for everything else
                    if core.is_input_error() {
                        ExitCode::from(2)
                    } else {
                        ExitCode::FAILURE
                    }
                }
                None => {
                    eprintln!("error: {:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Order { graph, strict, json, roots } => {
            OrderCommand { graph, roots, strict, json }.execute(&config).await?;
        }
        Commands::Libraries {
            input_libraries,
            libraries_dirs,
            output,
            depfile,
            exclude_shared_libraries,
            readelf,
            ndk,
            jobs,
            strict,
        } => {
            LibrariesCommand {
                input_libraries,
                libraries_dirs,
                output,
                depfile,
                exclude_shared_libraries,
                readelf,
                ndk,
                jobs,
                strict,
            }
            .execute(&config)
            .await?;
        }
        Commands::Classpath { build_graph, strict, json, targets } => {
            ClasspathCommand { build_graph, targets, strict, json }.execute(&config).await?;
        }
        Commands::Run { tasks, jobs, keep_going, strict, targets } => {
            RunCommand { tasks, targets, jobs, keep_going, strict }.execute(&config).await?;
        }
    }

    Ok(())
}
