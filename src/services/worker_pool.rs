//! Fixed-size pool of parse worker threads fed from a FIFO backlog.
//!
//! The pool itself is single-threaded: it lives on the coordinator and is driven by
//! [`WorkerEvent`]s that worker threads send over an unbounded channel. Each worker owns
//! one parser and runs at most one task at a time.
//!
//! Every dispatched task is stamped with the pool generation. [`WorkerPool::reset`] and
//! [`WorkerPool::terminate_all`] bump the generation, so results that were already in
//! flight are recognized and dropped when they arrive.
//!
//! A worker whose parser cannot be built reports [`WorkerEvent::Failed`] and is replaced
//! a bounded number of times. Once no worker is left, the backlog is turned into failed
//! outcomes so a load always drains.

use crate::metrics::PipelineMetrics;
use crate::models::{ParseOutcome, ParseTask, WorkerPolicy};
use crate::services::parser::{ParserFactory, PluginParser, hash_plugin};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

pub type WorkerId = u64;

/// Consecutive start-up failures tolerated before dead workers stop being replaced
const MAX_INIT_FAILURES: usize = 3;

pub const NO_WORKERS_REASON: &str = "no parse workers available";

/// Errors surfaced by the worker pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Parse workers are not running")]
    NotReady,

    #[error("Failed to spawn parse worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Task message, coordinator to worker.
#[derive(Debug)]
pub struct DispatchedTask {
    pub generation: u64,
    pub task: ParseTask,
}

/// Messages from worker threads to the coordinator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Sent once, after the worker built its parser
    Ready { worker_id: WorkerId },

    /// The worker could not build its parser and exited
    Failed { worker_id: WorkerId, reason: String },

    /// A task finished, successfully or not
    Completed {
        worker_id: WorkerId,
        generation: u64,
        outcome: ParseOutcome,
        elapsed: Duration,
        panicked: bool,
    },
}

/// A current-generation result handed back to the coordinator.
#[derive(Debug)]
pub struct CompletedTask {
    /// `None` for tasks failed without reaching a worker
    pub worker_id: Option<WorkerId>,
    pub outcome: ParseOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Starting,
    Idle,
    Busy,
}

struct WorkerHandle {
    task_tx: mpsc::UnboundedSender<DispatchedTask>,
    state: WorkerState,
    // Detached on drop; the thread exits once `task_tx` is gone
    _thread: JoinHandle<()>,
}

/// Pool of parse workers with a FIFO task backlog
pub struct WorkerPool {
    size: usize,
    policy: WorkerPolicy,
    factory: Arc<dyn ParserFactory>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    workers: HashMap<WorkerId, WorkerHandle>,
    idle: VecDeque<WorkerId>,
    queue: VecDeque<ParseTask>,
    abandoned: Vec<CompletedTask>,
    init_failures: usize,
    next_worker_id: WorkerId,
    generation: u64,
    metrics: Arc<PipelineMetrics>,
}

impl WorkerPool {
    /// Create a pool and spawn `size` workers (at least one).
    ///
    /// # Returns
    /// The pool and the receiving end of its event channel. Every event must be fed back
    /// through [`handle_event`](Self::handle_event).
    pub fn new(
        size: usize,
        policy: WorkerPolicy,
        factory: Arc<dyn ParserFactory>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), PoolError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut pool = Self {
            size: size.max(1),
            policy,
            factory,
            events_tx,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            queue: VecDeque::new(),
            abandoned: Vec::new(),
            init_failures: 0,
            next_worker_id: 0,
            generation: 0,
            metrics,
        };
        pool.start()?;

        tracing::info!(
            "Worker pool started with {} workers ({:?} policy)",
            pool.size,
            pool.policy
        );

        Ok((pool, events_rx))
    }

    /// Spawn workers until the pool is back at full size.
    pub fn start(&mut self) -> Result<(), PoolError> {
        self.init_failures = 0;
        while self.workers.len() < self.size {
            self.spawn_worker()?;
        }
        Ok(())
    }

    /// Queue a task and dispatch it if a worker is idle.
    ///
    /// Fails with [`PoolError::NotReady`] when no worker is alive, instead of queueing a
    /// task that could never run.
    pub fn submit(&mut self, task: ParseTask) -> Result<(), PoolError> {
        if self.workers.is_empty() {
            return Err(PoolError::NotReady);
        }

        self.metrics.record_task_submitted();
        self.queue.push_back(task);
        self.dispatch();
        Ok(())
    }

    /// Pair queued tasks with idle workers until one side runs out.
    pub fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker_id) = self.idle.pop_front() else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                self.idle.push_front(worker_id);
                break;
            };
            let Some(worker) = self.workers.get_mut(&worker_id) else {
                self.queue.push_front(task);
                continue;
            };

            tracing::trace!("Dispatching {} to worker {}", task.filename, worker_id);
            let dispatched = DispatchedTask {
                generation: self.generation,
                task,
            };

            match worker.task_tx.send(dispatched) {
                Ok(()) => worker.state = WorkerState::Busy,
                Err(mpsc::error::SendError(returned)) => {
                    tracing::warn!("Parse worker {} exited unexpectedly, replacing it", worker_id);
                    self.queue.push_front(returned.task);
                    self.retire(worker_id);
                    self.replace_worker(worker_id);
                }
            }
        }

        if self.workers.is_empty() && !self.queue.is_empty() {
            tracing::error!(
                "No parse workers left, failing {} queued tasks",
                self.queue.len()
            );
            while let Some(task) = self.queue.pop_front() {
                self.abandon(task, NO_WORKERS_REASON);
            }
        }
    }

    /// Fail a task without parsing it.
    ///
    /// The outcome carries the file hash and `reason`, and is returned by the next
    /// [`handle_event`](Self::handle_event) or [`take_abandoned`](Self::take_abandoned).
    pub fn abandon(&mut self, task: ParseTask, reason: &str) {
        let outcome = ParseOutcome {
            hash: hash_plugin(&task.contents),
            size: task.contents.len() as u64,
            filename: task.filename,
            last_modified: task.last_modified,
            parsed: None,
            parse_error: Some(failure_reason(reason)),
        };
        self.abandoned.push(CompletedTask {
            worker_id: None,
            outcome,
            elapsed: Duration::ZERO,
        });
    }

    /// Outcomes of tasks that were failed without reaching a worker.
    pub fn take_abandoned(&mut self) -> Vec<CompletedTask> {
        std::mem::take(&mut self.abandoned)
    }

    /// Apply one worker event.
    ///
    /// # Returns
    /// The event's outcome if it belongs to a live worker and the current generation,
    /// followed by any tasks abandoned while handling it. Readiness signals and stale
    /// results yield nothing of their own.
    pub fn handle_event(&mut self, event: WorkerEvent) -> Vec<CompletedTask> {
        let mut done: Vec<CompletedTask> = self.apply_event(event).into_iter().collect();
        done.append(&mut self.abandoned);
        done
    }

    fn apply_event(&mut self, event: WorkerEvent) -> Option<CompletedTask> {
        match event {
            WorkerEvent::Ready { worker_id } => {
                match self.workers.get_mut(&worker_id) {
                    Some(worker) if worker.state == WorkerState::Starting => {
                        worker.state = WorkerState::Idle;
                        self.idle.push_back(worker_id);
                        self.init_failures = 0;
                        tracing::debug!("Parse worker {} ready", worker_id);
                        self.dispatch();
                    }
                    Some(_) => {
                        tracing::warn!("Parse worker {} signalled ready twice", worker_id);
                    }
                    None => {
                        tracing::debug!("Ignoring ready signal from retired worker {}", worker_id);
                    }
                }
                None
            }
            WorkerEvent::Failed { worker_id, reason } => {
                if !self.workers.contains_key(&worker_id) {
                    tracing::debug!("Ignoring start-up failure of retired worker {}", worker_id);
                    return None;
                }

                tracing::error!("Parse worker {} failed to start: {}", worker_id, reason);
                self.retire(worker_id);
                self.metrics.record_worker_init_failure();
                self.init_failures += 1;

                if self.init_failures <= MAX_INIT_FAILURES {
                    self.replace_worker(worker_id);
                } else {
                    tracing::error!(
                        "Not replacing parse worker {} after {} consecutive start-up failures",
                        worker_id,
                        self.init_failures
                    );
                }
                self.dispatch();
                None
            }
            WorkerEvent::Completed {
                worker_id,
                generation,
                outcome,
                elapsed,
                panicked,
            } => {
                if !self.workers.contains_key(&worker_id) {
                    tracing::debug!(
                        "Discarding result for {} from retired worker {}",
                        outcome.filename,
                        worker_id
                    );
                    self.metrics.record_stale_outcome();
                    return None;
                }

                self.release_worker(worker_id, panicked);
                self.dispatch();

                if generation != self.generation {
                    tracing::debug!(
                        "Discarding result for {} from generation {} (current {})",
                        outcome.filename,
                        generation,
                        self.generation
                    );
                    self.metrics.record_stale_outcome();
                    return None;
                }

                self.metrics.record_parse_time(elapsed);
                Some(CompletedTask {
                    worker_id: Some(worker_id),
                    outcome,
                    elapsed,
                })
            }
        }
    }

    /// Drop the backlog and start a new generation.
    ///
    /// Workers keep running; whatever they are parsing now is discarded on arrival.
    ///
    /// # Returns
    /// The number of queued tasks that were dropped
    pub fn reset(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.abandoned.clear();
        self.generation += 1;
        tracing::debug!(
            "Worker pool reset: dropped {} queued tasks, generation {}",
            dropped,
            self.generation
        );
        dropped
    }

    /// Retire every worker and drop the backlog.
    ///
    /// Busy threads finish their current file and exit; their results are discarded.
    /// Call [`start`](Self::start) to bring the pool back.
    pub fn terminate_all(&mut self) {
        let count = self.workers.len();
        self.queue.clear();
        self.abandoned.clear();
        self.idle.clear();
        self.workers.clear();
        self.generation += 1;
        tracing::info!("Terminated {} parse workers", count);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn policy(&self) -> WorkerPolicy {
        self.policy
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while at least one worker is alive to take tasks
    pub fn is_ready(&self) -> bool {
        !self.workers.is_empty()
    }

    /// True once every live worker has signalled readiness
    pub fn all_started(&self) -> bool {
        self.count_in(WorkerState::Starting) == 0
    }

    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn idle_workers(&self) -> usize {
        self.idle.len()
    }

    pub fn busy_workers(&self) -> usize {
        self.count_in(WorkerState::Busy)
    }

    pub fn queued_tasks(&self) -> usize {
        self.queue.len()
    }

    fn count_in(&self, state: WorkerState) -> usize {
        self.workers.values().filter(|w| w.state == state).count()
    }

    fn spawn_worker(&mut self) -> Result<WorkerId, PoolError> {
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let factory = Arc::clone(&self.factory);
        let events_tx = self.events_tx.clone();

        let thread = thread::Builder::new()
            .name(format!("parse-worker-{}", worker_id))
            .spawn(move || run_worker(worker_id, factory, task_rx, events_tx))?;

        self.workers.insert(
            worker_id,
            WorkerHandle {
                task_tx,
                state: WorkerState::Starting,
                _thread: thread,
            },
        );
        self.metrics.record_worker_spawned();

        Ok(worker_id)
    }

    /// Return a finished worker to the idle list, or replace it.
    fn release_worker(&mut self, worker_id: WorkerId, panicked: bool) {
        if panicked || self.policy == WorkerPolicy::Recycle {
            self.retire(worker_id);
            self.metrics.record_worker_recycled();
            self.replace_worker(worker_id);
        } else if let Some(worker) = self.workers.get_mut(&worker_id) {
            worker.state = WorkerState::Idle;
            self.idle.push_back(worker_id);
        }
    }

    fn replace_worker(&mut self, worker_id: WorkerId) {
        if let Err(e) = self.spawn_worker() {
            tracing::error!("Failed to replace parse worker {}: {}", worker_id, e);
        }
    }

    fn retire(&mut self, worker_id: WorkerId) {
        self.workers.remove(&worker_id);
        self.idle.retain(|id| *id != worker_id);
    }
}

/// Worker thread body: build a parser, announce readiness, then parse until the task
/// channel closes.
fn run_worker(
    worker_id: WorkerId,
    factory: Arc<dyn ParserFactory>,
    mut tasks: mpsc::UnboundedReceiver<DispatchedTask>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut parser = match panic::catch_unwind(AssertUnwindSafe(|| factory.create_parser())) {
        Ok(parser) => parser,
        Err(payload) => {
            let reason = failure_reason(&panic_message(payload.as_ref()));
            let _ = events.send(WorkerEvent::Failed { worker_id, reason });
            return;
        }
    };

    if events.send(WorkerEvent::Ready { worker_id }).is_err() {
        return;
    }

    while let Some(DispatchedTask { generation, task }) = tasks.blocking_recv() {
        let started = Instant::now();
        let (outcome, panicked) = parse_task(parser.as_mut(), task);

        let event = WorkerEvent::Completed {
            worker_id,
            generation,
            outcome,
            elapsed: started.elapsed(),
            panicked,
        };

        if events.send(event).is_err() || panicked {
            break;
        }
    }

    tracing::trace!("Parse worker {} exiting", worker_id);
}

/// Run one task through a parser, turning errors and panics into a failure reason.
///
/// # Returns
/// The outcome and whether the parser panicked
pub fn parse_task(parser: &mut dyn PluginParser, task: ParseTask) -> (ParseOutcome, bool) {
    let ParseTask {
        filename,
        last_modified,
        contents,
        skip_parsing,
    } = task;
    let size = contents.len() as u64;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let parsed = if skip_parsing {
            None
        } else {
            Some(parser.parse(&contents))
        };
        (parser.hash(&contents), parsed)
    }));

    match result {
        Ok((hash, parsed)) => {
            let (parsed, parse_error) = match parsed {
                None => (None, None),
                Some(Ok(plugin)) => (Some(plugin), None),
                Some(Err(e)) => {
                    tracing::warn!("Failed to parse {}: {}", filename, e);
                    (None, Some(failure_reason(&e.to_string())))
                }
            };

            let outcome = ParseOutcome {
                filename,
                last_modified,
                hash,
                size,
                parsed,
                parse_error,
            };
            (outcome, false)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!("Parser panicked on {}: {}", filename, message);

            let outcome = ParseOutcome {
                filename,
                last_modified,
                hash: hash_plugin(&contents),
                size,
                parsed: None,
                parse_error: Some(failure_reason(&message)),
            };
            (outcome, true)
        }
    }
}

fn failure_reason(message: &str) -> String {
    if message.trim().is_empty() {
        "unknown error".to_string()
    } else {
        message.to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParsedPlugin;
    use crate::services::parser::{MockPluginParser, ParserError};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    /// Parses "ok:*" contents, fails on "fail", panics on "panic".
    struct ScriptedParser;

    impl PluginParser for ScriptedParser {
        fn parse(&mut self, contents: &[u8]) -> Result<ParsedPlugin, ParserError> {
            match contents {
                b"fail" => Err(ParserError::Other("bad header".to_string())),
                b"fail-silently" => Err(ParserError::Other(String::new())),
                b"panic" => panic!("boom"),
                _ => Ok(ParsedPlugin::default()),
            }
        }
    }

    fn scripted_pool(
        size: usize,
        policy: WorkerPolicy,
    ) -> (WorkerPool, mpsc::UnboundedReceiver<WorkerEvent>, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let factory: Arc<dyn ParserFactory> =
            Arc::new(|| -> Box<dyn PluginParser> { Box::new(ScriptedParser) });
        let (pool, rx) = WorkerPool::new(size, policy, factory, Arc::clone(&metrics)).unwrap();
        (pool, rx, metrics)
    }

    fn task(name: &str, contents: &[u8]) -> ParseTask {
        ParseTask::new(name, 0, contents.to_vec())
    }

    /// Feed events back into the pool until `count` current results arrive.
    fn collect(
        pool: &mut WorkerPool,
        rx: &mut mpsc::UnboundedReceiver<WorkerEvent>,
        count: usize,
    ) -> Vec<CompletedTask> {
        let mut done = Vec::new();
        while done.len() < count {
            let event = rx.blocking_recv().expect("event channel closed");
            done.extend(pool.handle_event(event));
        }
        done
    }

    fn wait_started(pool: &mut WorkerPool, rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) {
        while !pool.all_started() {
            let event = rx.blocking_recv().expect("event channel closed");
            assert!(pool.handle_event(event).is_empty());
        }
    }

    #[test]
    fn test_every_task_completes_once() {
        let (mut pool, mut rx, metrics) = scripted_pool(3, WorkerPolicy::Reuse);
        wait_started(&mut pool, &mut rx);

        for i in 0..10 {
            pool.submit(task(&format!("Plugin{}.esp", i), b"ok")).unwrap();
        }

        let done = collect(&mut pool, &mut rx, 10);
        let names: HashSet<String> = done.into_iter().map(|d| d.outcome.filename).collect();

        assert_eq!(names.len(), 10);
        assert_eq!(pool.queued_tasks(), 0);
        assert_eq!(pool.idle_workers(), 3);
        assert_eq!(pool.busy_workers(), 0);
        assert_eq!(metrics.tasks_submitted.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.workers_spawned.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_recycle_policy_replaces_workers() {
        let (mut pool, mut rx, metrics) = scripted_pool(2, WorkerPolicy::Recycle);

        for i in 0..4 {
            pool.submit(task(&format!("Plugin{}.esp", i), b"ok")).unwrap();
        }
        let done = collect(&mut pool, &mut rx, 4);

        assert_eq!(done.len(), 4);
        assert_eq!(pool.live_workers(), 2);
        assert_eq!(metrics.workers_recycled.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.workers_spawned.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_parse_failure_becomes_failure_reason() {
        let (mut pool, mut rx, _metrics) = scripted_pool(1, WorkerPolicy::Reuse);

        pool.submit(task("Broken.esp", b"fail")).unwrap();
        pool.submit(task("Quiet.esp", b"fail-silently")).unwrap();
        let mut done = collect(&mut pool, &mut rx, 2);
        done.sort_by(|a, b| a.outcome.filename.cmp(&b.outcome.filename));

        assert_eq!(done[0].outcome.parse_error.as_deref(), Some("bad header"));
        assert!(done[0].outcome.parsed.is_none());
        assert_eq!(done[0].outcome.hash, hash_plugin(b"fail"));
        assert_eq!(done[1].outcome.parse_error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_panicking_parser_is_replaced() {
        let (mut pool, mut rx, metrics) = scripted_pool(1, WorkerPolicy::Reuse);

        pool.submit(task("Crash.esp", b"panic")).unwrap();
        let crashed = collect(&mut pool, &mut rx, 1);
        assert_eq!(crashed[0].outcome.parse_error.as_deref(), Some("boom"));
        assert_eq!(metrics.workers_recycled.load(Ordering::Relaxed), 1);

        pool.submit(task("Fine.esp", b"ok")).unwrap();
        let fine = collect(&mut pool, &mut rx, 1);
        assert!(fine[0].outcome.parsed.is_some());
        assert_eq!(pool.live_workers(), 1);
    }

    #[test]
    fn test_skip_parsing_hashes_only() {
        let (mut pool, mut rx, _metrics) = scripted_pool(1, WorkerPolicy::Reuse);

        pool.submit(task("Skyrim.esm", b"fail").skip_parsing(true)).unwrap();
        let done = collect(&mut pool, &mut rx, 1);

        let outcome = &done[0].outcome;
        assert!(outcome.parsed.is_none());
        assert!(outcome.parse_error.is_none());
        assert_eq!(outcome.hash, hash_plugin(b"fail"));
        assert_eq!(outcome.size, 4);
    }

    #[test]
    fn test_reset_discards_in_flight_result() {
        let (mut pool, mut rx, metrics) = scripted_pool(1, WorkerPolicy::Reuse);
        wait_started(&mut pool, &mut rx);

        pool.submit(task("Old.esp", b"ok")).unwrap();
        assert_eq!(pool.busy_workers(), 1);

        pool.reset();
        pool.submit(task("New.esp", b"ok")).unwrap();

        let done = collect(&mut pool, &mut rx, 1);
        assert_eq!(done[0].outcome.filename, "New.esp");
        assert_eq!(metrics.stale_outcomes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reset_drops_queued_tasks() {
        let (mut pool, _rx, _metrics) = scripted_pool(1, WorkerPolicy::Reuse);

        // No worker has signalled readiness yet, so both tasks wait in the backlog
        pool.submit(task("A.esp", b"ok")).unwrap();
        pool.submit(task("B.esp", b"ok")).unwrap();

        assert_eq!(pool.reset(), 2);
        assert_eq!(pool.queued_tasks(), 0);
        assert_eq!(pool.generation(), 1);
    }

    #[test]
    fn test_terminate_all_rejects_submissions() {
        let (mut pool, _rx, _metrics) = scripted_pool(2, WorkerPolicy::Reuse);

        pool.terminate_all();

        assert!(!pool.is_ready());
        assert!(matches!(
            pool.submit(task("A.esp", b"ok")),
            Err(PoolError::NotReady)
        ));

        pool.start().unwrap();
        assert!(pool.is_ready());
        assert_eq!(pool.live_workers(), 2);
    }

    #[test]
    fn test_result_after_terminate_is_discarded() {
        let (mut pool, mut rx, metrics) = scripted_pool(1, WorkerPolicy::Reuse);
        wait_started(&mut pool, &mut rx);

        pool.submit(task("Late.esp", b"ok")).unwrap();
        pool.terminate_all();

        let event = rx.blocking_recv().unwrap();
        assert!(matches!(event, WorkerEvent::Completed { .. }));
        assert!(pool.handle_event(event).is_empty());
        assert_eq!(metrics.stale_outcomes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_parser_init_panic_fails_queued_tasks() {
        let metrics = Arc::new(PipelineMetrics::new());
        let factory: Arc<dyn ParserFactory> =
            Arc::new(|| -> Box<dyn PluginParser> { panic!("parser init failed") });
        let (mut pool, mut rx) =
            WorkerPool::new(1, WorkerPolicy::Reuse, factory, Arc::clone(&metrics)).unwrap();

        pool.submit(task("Stuck.esp", b"ok")).unwrap();
        let done = collect(&mut pool, &mut rx, 1);

        assert_eq!(done[0].worker_id, None);
        assert_eq!(done[0].outcome.filename, "Stuck.esp");
        assert_eq!(
            done[0].outcome.parse_error.as_deref(),
            Some("no parse workers available")
        );
        assert_eq!(done[0].outcome.hash, hash_plugin(b"ok"));
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.queued_tasks(), 0);
        assert_eq!(
            metrics.worker_init_failures.load(Ordering::Relaxed),
            MAX_INIT_FAILURES + 1
        );
        assert!(matches!(
            pool.submit(task("Later.esp", b"ok")),
            Err(PoolError::NotReady)
        ));
    }

    #[test]
    fn test_worker_recovers_from_one_init_failure() {
        use std::sync::atomic::AtomicBool;

        let failed_once = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed_once);
        let factory: Arc<dyn ParserFactory> = Arc::new(move || -> Box<dyn PluginParser> {
            if !flag.swap(true, Ordering::SeqCst) {
                panic!("first parser init failed");
            }
            Box::new(ScriptedParser)
        });
        let metrics = Arc::new(PipelineMetrics::new());
        let (mut pool, mut rx) =
            WorkerPool::new(1, WorkerPolicy::Reuse, factory, Arc::clone(&metrics)).unwrap();

        pool.submit(task("Fine.esp", b"ok")).unwrap();
        let done = collect(&mut pool, &mut rx, 1);

        assert!(done[0].worker_id.is_some());
        assert!(done[0].outcome.parsed.is_some());
        assert_eq!(pool.live_workers(), 1);
        assert_eq!(metrics.worker_init_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.workers_spawned.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_parse_task_skips_parser_for_masters() {
        let mut parser = MockPluginParser::new();
        parser.expect_parse().never();
        parser
            .expect_hash()
            .times(1)
            .returning(|_| "zz".to_string());

        let (outcome, panicked) =
            parse_task(&mut parser, task("Update.esm", b"TES4").skip_parsing(true));

        assert!(!panicked);
        assert_eq!(outcome.hash, "zz");
        assert!(outcome.parsed.is_none());
    }

    #[test]
    fn test_parse_task_passes_contents_to_parser() {
        let mut parser = MockPluginParser::new();
        parser
            .expect_parse()
            .withf(|contents| contents.to_vec() == b"TES4".to_vec())
            .times(1)
            .returning(|_| Ok(ParsedPlugin::default()));
        parser.expect_hash().returning(|_| "1a".to_string());

        let (outcome, _) = parse_task(&mut parser, task("Mod.esp", b"TES4"));

        assert!(outcome.parsed.is_some());
        assert_eq!(outcome.hash, "1a");
        assert_eq!(outcome.filename, "Mod.esp");
    }
}
