//! Build Runners
//!
//! Drive the build steps end to end: the native library ordering step
//! (index, resolve, order, write) and shell tasks run through the
//! scheduler.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, debug, warn, error};

use linkorder_android_toolchain::{DepsCache, LibraryIndex, NativeDepsResolver, Readelf};
use linkorder_core::events::{Event, EventBus};
use linkorder_graph::{CyclePolicy, DependencyOrderer, Node};

use crate::config::LibrariesConfig;
use crate::manifest::{write_depfile, write_json_if_changed, LibrariesManifest};
use crate::scheduler::{ScheduleSummary, Scheduler, TaskFile};
use crate::{format_path, BuildError};

/// Result of the library ordering step
#[derive(Debug, Clone)]
pub struct LibrariesOutput {
    /// Manifest that was written (or already up to date)
    pub manifest: LibrariesManifest,
    /// Path of the manifest
    pub path: PathBuf,
    /// Whether the manifest file changed
    pub changed: bool,
    /// Cycles broken while ordering
    pub cycles: Vec<Vec<Node>>,
    /// Step duration in seconds
    pub duration_secs: f64,
}

/// Library ordering progress
#[derive(Debug, Clone)]
pub enum RunnerProgress {
    Started,
    Indexing,
    Resolving { roots: usize },
    Ordering { libraries: usize },
    Writing { path: PathBuf },
    Completed { output: LibrariesOutput },
    Failed { error: String },
}

/// Orders the native libraries an APK ships and writes the manifest
pub struct LibraryOrderRunner {
    config: LibrariesConfig,
    readelf: Readelf,
    cache: Arc<DepsCache>,
    events: Option<Arc<EventBus>>,
}

impl LibraryOrderRunner {
    pub fn new(config: LibrariesConfig, readelf: Readelf) -> Self {
        Self {
            config,
            readelf,
            cache: Arc::new(DepsCache::new()),
            events: None,
        }
    }

    /// Reuse a dependency cache across runs
    pub fn with_cache(mut self, cache: Arc<DepsCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &LibrariesConfig {
        &self.config
    }

    /// Run the step
    pub async fn run(&self) -> Result<LibrariesOutput, BuildError> {
        self.run_inner(None).await
    }

    /// Run the step with progress reporting
    pub async fn run_with_progress(&self, tx: mpsc::Sender<RunnerProgress>) -> Result<LibrariesOutput, BuildError> {
        let _ = tx.send(RunnerProgress::Started).await;

        match self.run_inner(Some(&tx)).await {
            Ok(output) => {
                let _ = tx.send(RunnerProgress::Completed { output: output.clone() }).await;
                Ok(output)
            }
            Err(e) => {
                let _ = tx.send(RunnerProgress::Failed { error: e.to_string() }).await;
                Err(e)
            }
        }
    }

    async fn run_inner(&self, tx: Option<&mpsc::Sender<RunnerProgress>>) -> Result<LibrariesOutput, BuildError> {
        let start = Instant::now();
        self.config.validate()?;

        progress(tx, RunnerProgress::Indexing).await;
        let index = LibraryIndex::scan(&self.config.libraries_dirs)?;
        info!("Found {} libraries in {} directories", index.len(), self.config.libraries_dirs.len());

        let roots = self.config.root_libraries();
        progress(tx, RunnerProgress::Resolving { roots: roots.len() }).await;

        let mut resolver = NativeDepsResolver::new(self.readelf.clone(), index, self.cache.clone())
            .with_jobs(self.config.jobs);
        if let Some(ref events) = self.events {
            resolver = resolver.with_events(events.clone());
        }
        resolver.resolve(&roots).await?;

        let orderer = DependencyOrderer::new().with_cycle_policy(self.config.cycle_policy);
        let (mut ordered, cycles) = match self.config.cycle_policy {
            CyclePolicy::Lenient if self.config.report_cycles => {
                orderer.order_with_cycles(roots.iter().cloned(), &resolver)
            }
            _ => (orderer.order(roots.iter().cloned(), &resolver)?, Vec::new()),
        };
        for cycle in &cycles {
            warn!("Dependency cycle broken: {}", format_path(cycle));
            self.emit(Event::CycleBroken {
                path: cycle.iter().map(Node::to_string).collect(),
            });
        }

        let excluded: HashSet<&str> = self
            .config
            .exclude_shared_libraries
            .iter()
            .map(String::as_str)
            .collect();
        ordered.retain(|lib| !excluded.contains(lib.as_str()));
        progress(tx, RunnerProgress::Ordering { libraries: ordered.len() }).await;
        self.emit(Event::OrderComputed { nodes: ordered.len() });

        let index = resolver.index();
        let mut inputs = Vec::new();
        let mut lib_paths = Vec::with_capacity(ordered.len());
        for lib in &ordered {
            match index.full_path(lib.as_str()) {
                Some(path) => {
                    lib_paths.push(path.to_string_lossy().into_owned());
                    inputs.push(path.to_path_buf());
                }
                None => {
                    debug!("{} was not built here, listing it by name", lib);
                    lib_paths.push(lib.to_string());
                }
            }
        }

        let manifest = LibrariesManifest::new(ordered.iter().map(Node::to_string).collect(), lib_paths);
        progress(tx, RunnerProgress::Writing { path: self.config.output.clone() }).await;
        let changed = write_json_if_changed(&self.config.output, &manifest).await?;
        self.emit(Event::OutputWritten {
            path: self.config.output.clone(),
            changed,
        });

        if let Some(ref depfile) = self.config.depfile {
            write_depfile(depfile, &self.config.output, &inputs).await?;
        }

        let duration_secs = start.elapsed().as_secs_f64();
        info!("Ordered {} libraries in {:.2}s", manifest.libraries.len(), duration_secs);

        Ok(LibrariesOutput {
            manifest,
            path: self.config.output.clone(),
            changed,
            cycles,
            duration_secs,
        })
    }

    fn emit(&self, event: Event) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }
}

async fn progress(tx: Option<&mpsc::Sender<RunnerProgress>>, update: RunnerProgress) {
    if let Some(tx) = tx {
        let _ = tx.send(update).await;
    }
}

/// Runs shell tasks from a task file in dependency order
pub struct TaskRunner {
    tasks: Arc<TaskFile>,
    scheduler: Scheduler,
}

impl TaskRunner {
    pub fn new(tasks: TaskFile, scheduler: Scheduler) -> Self {
        Self {
            tasks: Arc::new(tasks),
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run `targets` and everything they depend on. No targets means every
    /// task in the file.
    pub async fn run(&self, targets: &[Node]) -> Result<ScheduleSummary, BuildError> {
        let targets = if targets.is_empty() {
            self.tasks.names()
        } else {
            for target in targets {
                if self.tasks.task(target).is_none() {
                    return Err(BuildError::UnknownTask(target.to_string()));
                }
            }
            targets.to_vec()
        };

        let tasks = self.tasks.clone();
        self.scheduler
            .run(&targets, &*self.tasks, move |name| run_shell(tasks.clone(), name))
            .await
    }
}

async fn run_shell(tasks: Arc<TaskFile>, name: Node) -> Result<(), BuildError> {
    let Some(task) = tasks.task(&name) else {
        debug!("{} has no command", name);
        return Ok(());
    };

    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(&task.command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&task.command);
        cmd
    };
    if let Some(ref cwd) = task.cwd {
        cmd.current_dir(cwd);
    }
    cmd.kill_on_drop(true);

    debug!("Running {}: {}", name, task.command);
    let output = cmd.output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("{} failed: {}", name, stderr.trim());
        return Err(BuildError::BuildFailed(format!(
            "{} exited with {}: {}",
            name,
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
