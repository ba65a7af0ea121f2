//! Task Scheduler
//!
//! Runs a set of tasks in dependency order with bounded parallelism. The
//! orderer decides the start order; a task is launched once every
//! dependency that precedes it in that order has succeeded. Edges the
//! orderer dropped to break a cycle are not waited on.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn, error};

use linkorder_core::events::{Event, EventBus};
use linkorder_core::load_structured;
use linkorder_graph::{CyclePolicy, DependencyMap, DependencyOrderer, Node};

use crate::BuildError;

/// One task from a task file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: Node,
    /// Shell command line
    pub command: String,
    #[serde(default)]
    pub deps: Vec<Node>,
    /// Working directory, defaults to the current one
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Task file: a list of `[[task]]` tables, indexed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "TaskList", into = "TaskList")]
pub struct TaskFile {
    tasks: IndexMap<Node, TaskSpec>,
}

/// On-disk shape of a task file
#[derive(Serialize, Deserialize)]
struct TaskList {
    #[serde(default, rename = "task")]
    tasks: Vec<TaskSpec>,
}

impl TryFrom<TaskList> for TaskFile {
    type Error = BuildError;

    fn try_from(list: TaskList) -> Result<Self, Self::Error> {
        TaskFile::from_tasks(list.tasks)
    }
}

impl From<TaskFile> for TaskList {
    fn from(file: TaskFile) -> Self {
        TaskList {
            tasks: file.tasks.into_values().collect(),
        }
    }
}

impl TaskFile {
    /// Index tasks by name; a name declared twice is an error
    pub fn from_tasks(tasks: Vec<TaskSpec>) -> Result<Self, BuildError> {
        let mut index = IndexMap::with_capacity(tasks.len());
        for task in tasks {
            if index.contains_key(&task.name) {
                return Err(BuildError::ConfigError(format!("task {} declared twice", task.name)));
            }
            index.insert(task.name.clone(), task);
        }
        Ok(Self { tasks: index })
    }

    /// Load and validate a task file (TOML or JSON)
    pub async fn load(path: &Path) -> Result<Self, BuildError> {
        let file: TaskFile = load_structured(path).await?;
        file.validate();
        debug!("Loaded {} tasks from {:?}", file.tasks.len(), path);
        Ok(file)
    }

    /// Warn about dependencies nobody declares
    pub fn validate(&self) {
        for task in self.tasks.values() {
            for dep in &task.deps {
                if !self.tasks.contains_key(dep) {
                    warn!("Task {} depends on undeclared task {}", task.name, dep);
                }
            }
        }
    }

    pub fn task(&self, name: &Node) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    /// Task names in declaration order
    pub fn names(&self) -> Vec<Node> {
        self.tasks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl DependencyMap<Node> for TaskFile {
    fn deps(&self, node: &Node) -> Vec<Node> {
        self.task(node).map(|t| t.deps.clone()).unwrap_or_default()
    }
}

/// Scheduler progress
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleProgress {
    Started { name: Node, current: usize, total: usize },
    Finished { name: Node, duration_secs: f64 },
    Failed { name: Node, error: String },
    Skipped { name: Node },
}

/// What happened to every task in a run
#[derive(Debug, Clone, Default)]
pub struct ScheduleSummary {
    /// Start order chosen by the orderer
    pub order: Vec<Node>,
    pub succeeded: Vec<Node>,
    pub failed: Vec<(Node, String)>,
    /// Never started, or cancelled while running
    pub skipped: Vec<Node>,
}

impl ScheduleSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
    Blocked,
    Cancelled,
}

enum Outcome {
    Succeeded(f64),
    Failed(String),
    Cancelled,
}

/// Dependency-ordered task scheduler
pub struct Scheduler {
    jobs: usize,
    keep_going: bool,
    cycle_policy: CyclePolicy,
    events: Option<Arc<EventBus>>,
    progress: Option<mpsc::Sender<ScheduleProgress>>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler running at most `jobs` tasks at once
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            keep_going: false,
            cycle_policy: CyclePolicy::Lenient,
            events: None,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Keep starting independent tasks after a failure
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<ScheduleProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Token that cancels every run of this scheduler when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run everything reachable from `targets`.
    ///
    /// Task failures are reported in the summary, not as an error; the
    /// error path is for ordering failures (strict cycles) and scheduler
    /// faults.
    pub async fn run<D, F, Fut, E>(
        &self,
        targets: &[Node],
        deps: &D,
        execute: F,
    ) -> Result<ScheduleSummary, BuildError>
    where
        D: DependencyMap<Node> + ?Sized,
        F: Fn(Node) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let order = DependencyOrderer::new()
            .with_cycle_policy(self.cycle_policy)
            .order(targets.iter().cloned(), deps)?;
        let total = order.len();
        info!("Scheduling {} tasks with {} jobs", total, self.jobs);

        let position: HashMap<&Node, usize> = order.iter().enumerate().map(|(i, n)| (n, i)).collect();
        let mut remaining = vec![0usize; total];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
        for (index, node) in order.iter().enumerate() {
            let mut waits: Vec<usize> = deps
                .deps(node)
                .iter()
                .filter_map(|dep| position.get(dep).copied())
                .filter(|&dep_index| dep_index < index)
                .collect();
            waits.sort_unstable();
            waits.dedup();

            remaining[index] = waits.len();
            for dep_index in waits {
                dependents[dep_index].push(index);
            }
        }

        let run_token = self.cancel.child_token();
        let mut state = vec![TaskState::Pending; total];
        let mut ready: BTreeSet<usize> = (0..total).filter(|&i| remaining[i] == 0).collect();
        let mut running: JoinSet<(usize, Outcome)> = JoinSet::new();
        let mut summary = ScheduleSummary {
            order: order.clone(),
            ..Default::default()
        };
        let mut started = 0usize;
        let mut stopped = false;

        loop {
            while !stopped && running.len() < self.jobs {
                if run_token.is_cancelled() {
                    stopped = true;
                    break;
                }
                let Some(index) = ready.pop_first() else {
                    break;
                };

                let name = order[index].clone();
                state[index] = TaskState::Running;
                started += 1;
                debug!("Starting {} ({}/{})", name, started, total);
                self.emit(Event::TaskStarted { name: name.to_string() });
                self.send(ScheduleProgress::Started { name: name.clone(), current: started, total })
                    .await;

                let task = execute(name);
                let token = run_token.clone();
                running.spawn(async move {
                    let start = Instant::now();
                    let outcome = tokio::select! {
                        result = AssertUnwindSafe(task).catch_unwind() => match result {
                            Ok(Ok(())) => Outcome::Succeeded(start.elapsed().as_secs_f64()),
                            Ok(Err(err)) => Outcome::Failed(err.to_string()),
                            Err(_) => Outcome::Failed("task panicked".to_string()),
                        },
                        _ = token.cancelled() => Outcome::Cancelled,
                    };
                    (index, outcome)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (index, outcome) =
                joined.map_err(|e| BuildError::BuildFailed(format!("scheduler task lost: {}", e)))?;
            let name = order[index].clone();

            match outcome {
                Outcome::Succeeded(duration_secs) => {
                    state[index] = TaskState::Done;
                    debug!("Finished {} in {:.2}s", name, duration_secs);
                    self.emit(Event::TaskFinished { name: name.to_string(), duration_secs });
                    self.send(ScheduleProgress::Finished { name: name.clone(), duration_secs })
                        .await;
                    summary.succeeded.push(name);

                    for &dependent in &dependents[index] {
                        remaining[dependent] -= 1;
                        if remaining[dependent] == 0 && state[dependent] == TaskState::Pending {
                            ready.insert(dependent);
                        }
                    }
                }
                Outcome::Failed(message) => {
                    state[index] = TaskState::Failed;
                    error!("Task {} failed: {}", name, message);
                    self.emit(Event::TaskFailed { name: name.to_string(), error: message.clone() });
                    self.send(ScheduleProgress::Failed { name: name.clone(), error: message.clone() })
                        .await;
                    summary.failed.push((name, message));

                    block_dependents(index, &dependents, &mut state);
                    if !self.keep_going {
                        stopped = true;
                        run_token.cancel();
                    }
                }
                Outcome::Cancelled => {
                    state[index] = TaskState::Cancelled;
                    self.skip(&name).await;
                    summary.skipped.push(name);
                }
            }
        }

        for (index, task_state) in state.iter().enumerate() {
            if matches!(task_state, TaskState::Pending | TaskState::Blocked) {
                let name = order[index].clone();
                self.skip(&name).await;
                summary.skipped.push(name);
            }
        }

        info!(
            "Scheduled run finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn skip(&self, name: &Node) {
        debug!("Skipping {}", name);
        self.emit(Event::TaskSkipped { name: name.to_string() });
        self.send(ScheduleProgress::Skipped { name: name.clone() }).await;
    }

    fn emit(&self, event: Event) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }

    async fn send(&self, progress: ScheduleProgress) {
        if let Some(ref tx) = self.progress {
            let _ = tx.send(progress).await;
        }
    }
}

/// Mark everything downstream of a failed task as blocked
fn block_dependents(failed: usize, dependents: &[Vec<usize>], state: &mut [TaskState]) {
    let mut stack: Vec<usize> = dependents[failed].clone();
    while let Some(index) = stack.pop() {
        if state[index] == TaskState::Pending {
            state[index] = TaskState::Blocked;
            stack.extend(dependents[index].iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use linkorder_graph::{nodes, DependencyGraph};
    use parking_lot::Mutex;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph<Node> {
        edges
            .iter()
            .map(|(node, deps)| (Node::from(*node), nodes(deps.iter())))
            .collect()
    }

    fn index_of(log: &[String], entry: &str) -> usize {
        log.iter().position(|e| e == entry).unwrap_or_else(|| panic!("{} not in {:?}", entry, log))
    }

    #[tokio::test]
    async fn test_single_job_follows_order() {
        let deps = graph(&[("app", &["ui", "base"]), ("ui", &["base"]), ("base", &[])]);
        let log = Arc::new(Mutex::new(Vec::new()));

        let summary = Scheduler::new(1)
            .run(&nodes(["app"]), &deps, |name: Node| {
                let log = log.clone();
                async move {
                    log.lock().push(name.to_string());
                    Ok::<(), String>(())
                }
            })
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.order, nodes(["base", "ui", "app"]));
        assert_eq!(*log.lock(), vec!["base", "ui", "app"]);
    }

    #[tokio::test]
    async fn test_dependents_wait_for_all_dependencies() {
        let deps = graph(&[("link", &["a", "b", "c"]), ("a", &[]), ("b", &[]), ("c", &[])]);
        let log = Arc::new(Mutex::new(Vec::new()));

        let summary = Scheduler::new(4)
            .run(&nodes(["link"]), &deps, |name: Node| {
                let log = log.clone();
                async move {
                    log.lock().push(format!("start {}", name));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    log.lock().push(format!("end {}", name));
                    Ok::<(), String>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.succeeded.len(), 4);
        let log = log.lock();
        let link_start = index_of(&log, "start link");
        for dep in ["a", "b", "c"] {
            assert!(index_of(&log, &format!("end {}", dep)) < link_start);
        }
    }

    #[tokio::test]
    async fn test_job_limit() {
        let deps: DependencyGraph<Node> = DependencyGraph::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let summary = Scheduler::new(2)
            .run(&nodes(["t1", "t2", "t3", "t4", "t5", "t6"]), &deps, |_name: Node| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.succeeded.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_cancels_outstanding_work() {
        let deps = graph(&[("fail", &[]), ("slow", &[]), ("after", &["fail"])]);
        let started = Instant::now();

        let summary = Scheduler::new(2)
            .run(&nodes(["fail", "slow", "after"]), &deps, |name: Node| async move {
                match name.as_str() {
                    "fail" => Err("exit status 1".to_string()),
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    }
                    _ => Ok(()),
                }
            })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(summary.failed, vec![(Node::from("fail"), "exit status 1".to_string())]);
        assert!(summary.succeeded.is_empty());
        assert!(summary.skipped.contains(&Node::from("slow")));
        assert!(summary.skipped.contains(&Node::from("after")));
    }

    #[tokio::test]
    async fn test_keep_going_runs_independent_tasks() {
        let deps = graph(&[
            ("fail", &[]),
            ("ok", &[]),
            ("after", &["fail"]),
            ("after_after", &["after"]),
        ]);

        let summary = Scheduler::new(1)
            .with_keep_going(true)
            .run(&nodes(["fail", "ok", "after_after"]), &deps, |name: Node| async move {
                if name.as_str() == "fail" {
                    Err("boom".to_string())
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.succeeded, nodes(["ok"]));
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.skipped, nodes(["after", "after_after"]));
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_panicking_task_is_a_failure() {
        let deps: DependencyGraph<Node> = DependencyGraph::new();
        let summary = Scheduler::new(1)
            .run(&nodes(["p"]), &deps, |_name: Node| async move {
                if true {
                    panic!("task blew up");
                }
                Ok::<(), String>(())
            })
            .await
            .unwrap();

        assert_eq!(summary.failed, vec![(Node::from("p"), "task panicked".to_string())]);
    }

    #[tokio::test]
    async fn test_strict_cycle_is_an_error() {
        let deps = graph(&[("x", &["y"]), ("y", &["x"])]);
        let result = Scheduler::new(1)
            .with_cycle_policy(CyclePolicy::Error)
            .run(&nodes(["x"]), &deps, |_name: Node| async move { Ok::<(), String>(()) })
            .await;

        assert!(matches!(result, Err(BuildError::Cycle(ref path)) if path == "x -> y -> x"));
    }

    #[tokio::test]
    async fn test_lenient_cycle_still_runs_everything() {
        let deps = graph(&[("x", &["y"]), ("y", &["x"])]);
        let summary = Scheduler::new(2)
            .run(&nodes(["x"]), &deps, |_name: Node| async move { Ok::<(), String>(()) })
            .await
            .unwrap();

        assert_eq!(summary.succeeded, nodes(["y", "x"]));
    }

    #[tokio::test]
    async fn test_progress_and_events() {
        let deps = graph(&[("b", &["a"]), ("a", &[])]);
        let events = Arc::new(EventBus::new());
        let sub = events.subscribe();
        let (tx, mut rx) = mpsc::channel(16);

        Scheduler::new(1)
            .with_events(events)
            .with_progress(tx)
            .run(&nodes(["b"]), &deps, |_name: Node| async move { Ok::<(), String>(()) })
            .await
            .unwrap();

        let mut progress = Vec::new();
        while let Ok(p) = rx.try_recv() {
            progress.push(p);
        }
        assert_eq!(progress.len(), 4);
        assert_eq!(
            progress[0],
            ScheduleProgress::Started { name: Node::from("a"), current: 1, total: 2 }
        );

        let events = sub.drain();
        assert_eq!(events.first(), Some(&Event::TaskStarted { name: "a".into() }));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_task_file_from_toml() {
        let file: TaskFile = toml::from_str(
            r#"
[[task]]
name = "codegen"
command = "python gen.py"

[[task]]
name = "compile"
command = "cc -c out.c"
deps = ["codegen"]
cwd = "out"
"#,
        )
        .unwrap();

        file.validate();
        assert_eq!(file.len(), 2);
        assert_eq!(file.names(), nodes(["codegen", "compile"]));
        assert_eq!(file.deps(&Node::from("compile")), nodes(["codegen"]));
        assert_eq!(file.task(&Node::from("compile")).unwrap().cwd, Some(PathBuf::from("out")));
    }

    fn task(name: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            name: Node::from(name),
            command: format!("echo {}", name),
            deps: nodes(deps),
            cwd: None,
        }
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let result = TaskFile::from_tasks(vec![task("a", &[]), task("a", &[])]);
        assert!(matches!(result, Err(BuildError::ConfigError(_))));

        let parsed = toml::from_str::<TaskFile>(
            "[[task]]\nname = \"a\"\ncommand = \"true\"\n[[task]]\nname = \"a\"\ncommand = \"false\"\n",
        );
        assert!(parsed.unwrap_err().to_string().contains("declared twice"));
    }

    #[test]
    fn test_task_lookup_by_name_in_large_file() {
        const TASKS: usize = 20_000;
        let tasks: Vec<TaskSpec> = (0..TASKS)
            .map(|i| {
                let name = format!("t{}", i);
                let prev = format!("t{}", i.saturating_sub(1));
                if i == 0 {
                    task(&name, &[])
                } else {
                    task(&name, &[prev.as_str()])
                }
            })
            .collect();
        let file = TaskFile::from_tasks(tasks).unwrap();

        let last = Node::from(format!("t{}", TASKS - 1));
        assert_eq!(file.task(&last).map(|t| t.name.clone()), Some(last.clone()));
        assert_eq!(file.deps(&last), nodes([format!("t{}", TASKS - 2)]));

        let ordered = DependencyOrderer::new().order([last], &file).unwrap();
        assert_eq!(ordered.len(), TASKS);
        assert_eq!(ordered[0].as_str(), "t0");
    }

    #[test]
    fn test_task_file_serializes_as_task_list() {
        let file = TaskFile::from_tasks(vec![task("gen", &[]), task("build", &["gen"])]).unwrap();
        let text = toml::to_string(&file).unwrap();
        assert!(text.contains("[[task]]"));

        let back: TaskFile = toml::from_str(&text).unwrap();
        assert_eq!(back.names(), nodes(["gen", "build"]));
    }
}
