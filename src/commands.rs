//! CLI commands for linkorder
//!
//! Each command is a plain options struct with an `execute` method, so the
//! same entry points work from the binary and from scripts linking the
//! library.

use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use linkorder_android_toolchain::{Readelf, ToolchainDetector};
use linkorder_build_engine::config::parse_gn_lists;
use linkorder_build_engine::{
    format_path, BuildError, BuildGraph, LibrariesConfig, LibrariesOutput, LibraryOrderRunner,
    ScheduleSummary, Scheduler, TaskFile, TaskRunner,
};
use linkorder_core::{load_structured, AppConfig};
use linkorder_graph::{nodes, CyclePolicy, DependencyGraph, DependencyOrderer, Node};

/// Load the config file named on the command line, or the user's default
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .await
            .with_context(|| format!("loading config {:?}", path))?,
        None => AppConfig::load().await?,
    };
    Ok(config)
}

fn cycle_policy(strict: bool, config: &AppConfig) -> CyclePolicy {
    if strict || config.ordering.strict_cycles {
        CyclePolicy::Error
    } else {
        CyclePolicy::Lenient
    }
}

/// Order the nodes of an explicit dependency graph
pub struct OrderCommand {
    pub graph: PathBuf,
    /// Roots; every declared node when empty
    pub roots: Vec<String>,
    pub strict: bool,
    pub json: bool,
}

impl OrderCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<Vec<Node>> {
        let graph: DependencyGraph<Node> = load_structured(&self.graph)
            .await
            .with_context(|| format!("loading graph {:?}", self.graph))?;

        let roots = if self.roots.is_empty() {
            graph.nodes().cloned().collect()
        } else {
            nodes(&self.roots)
        };
        info!("Ordering {} roots over {} nodes", roots.len(), graph.len());

        let policy = cycle_policy(self.strict, config);
        let orderer = DependencyOrderer::new().with_cycle_policy(policy);
        let ordered = if policy == CyclePolicy::Lenient && config.ordering.report_cycles {
            let (ordered, cycles) = orderer.order_with_cycles(roots, &graph);
            for cycle in &cycles {
                warn!("Dependency cycle broken: {}", format_path(cycle));
            }
            ordered
        } else {
            orderer.order(roots, &graph).map_err(BuildError::from)?
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&ordered)?);
        } else {
            for node in &ordered {
                println!("{}", node);
            }
        }
        Ok(ordered)
    }
}

/// Write the ordered native library manifest for an APK
pub struct LibrariesCommand {
    /// GN lists of root libraries
    pub input_libraries: Vec<String>,
    pub libraries_dirs: Vec<PathBuf>,
    pub output: PathBuf,
    pub depfile: Option<PathBuf>,
    /// GN lists of libraries to leave out
    pub exclude_shared_libraries: Vec<String>,
    pub readelf: Option<PathBuf>,
    pub ndk: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub strict: bool,
}

impl LibrariesCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<LibrariesOutput> {
        let mut libraries = LibrariesConfig::from_app_config(config);
        libraries.input_libraries = parse_gn_lists(&self.input_libraries)?;
        libraries.libraries_dirs = self.libraries_dirs.clone();
        libraries.output = self.output.clone();
        libraries.depfile = self.depfile.clone();
        libraries.exclude_shared_libraries = parse_gn_lists(&self.exclude_shared_libraries)?;
        libraries.cycle_policy = cycle_policy(self.strict, config);
        if let Some(jobs) = self.jobs {
            libraries.jobs = jobs.max(1);
        }

        let detector = ToolchainDetector::new(config.toolchain.clone());
        let found = detector.locate_readelf(self.readelf.as_deref(), self.ndk.as_deref())?;
        info!("Using readelf {:?} ({:?})", found.path, found.source);
        let readelf = Readelf::new(found.path)
            .with_timeout(config.build.readelf_timeout())
            .with_retries(config.build.readelf_retries);

        let output = LibraryOrderRunner::new(libraries, readelf).run().await?;
        if output.changed {
            info!("Wrote {} libraries to {:?}", output.manifest.libraries.len(), output.path);
        } else {
            info!("{:?} is up to date", output.path);
        }
        Ok(output)
    }
}

/// Print a classpath in load order
pub struct ClasspathCommand {
    pub build_graph: PathBuf,
    pub targets: Vec<String>,
    pub strict: bool,
    pub json: bool,
}

impl ClasspathCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<Vec<PathBuf>> {
        if self.targets.is_empty() {
            bail!("no targets given");
        }

        let graph = BuildGraph::load(&self.build_graph).await?;
        let classpath = graph.classpath(&nodes(&self.targets), cycle_policy(self.strict, config))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&classpath)?);
        } else {
            for jar in &classpath {
                println!("{}", jar.display());
            }
        }
        Ok(classpath)
    }
}

/// Run tasks from a task file in dependency order
pub struct RunCommand {
    pub tasks: PathBuf,
    /// Targets; every task when empty
    pub targets: Vec<String>,
    pub jobs: Option<usize>,
    pub keep_going: bool,
    pub strict: bool,
}

impl RunCommand {
    pub async fn execute(&self, config: &AppConfig) -> Result<ScheduleSummary> {
        let tasks = TaskFile::load(&self.tasks).await?;
        let jobs = self.jobs.unwrap_or_else(|| config.build.jobs());

        let scheduler = Scheduler::new(jobs)
            .with_keep_going(self.keep_going || config.build.keep_going)
            .with_cycle_policy(cycle_policy(self.strict, config));

        let cancel = scheduler.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running tasks");
                cancel.cancel();
            }
        });

        let summary = TaskRunner::new(tasks, scheduler).run(&nodes(&self.targets)).await?;

        for (name, error) in &summary.failed {
            println!("FAILED  {}: {}", name, error);
        }
        for name in &summary.skipped {
            println!("SKIPPED {}", name);
        }
        println!(
            "{} succeeded, {} failed, {} skipped",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.skipped.len()
        );

        if !summary.is_success() {
            bail!("{} of {} tasks did not complete", summary.failed.len() + summary.skipped.len(), summary.order.len());
        }
        Ok(summary)
    }
}
