//! Dispatcher — the process-wide supervisor.
//!
//! Owns the worker pool, the level-triggered dispatch tick, the periodic
//! cleanup tick (orphan sweep + retention sweep), and graceful drain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use docpress_core::{defaults, EngineConfig, JobType};
use docpress_db::Database;
use docpress_ocr::OcrProvider;
use docpress_storage::ObjectStore;

use crate::archive::ArchiveHandler;
use crate::convert::ConvertHandler;
use crate::handler::JobHandler;
use crate::worker::{Worker, WorkerEvent, WorkerMessage};

struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    join: JoinHandle<()>,
}

/// Supervisor for the worker pool and periodic maintenance.
pub struct Dispatcher {
    config: EngineConfig,
    db: Database,
    handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
    drain: Arc<AtomicBool>,
    events: broadcast::Sender<WorkerEvent>,
    workers: Vec<WorkerHandle>,
    timers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Build a dispatcher with the standard convert/archive handlers wired
    /// to the injected collaborators.
    pub fn new(
        config: EngineConfig,
        db: Database,
        store: Arc<dyn ObjectStore>,
        ocr: Arc<dyn OcrProvider>,
    ) -> Self {
        let mut handlers: HashMap<JobType, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(
            JobType::Convert,
            Arc::new(ConvertHandler::new(
                db.clone(),
                store.clone(),
                ocr,
                &config,
            )),
        );
        handlers.insert(
            JobType::Archive,
            Arc::new(ArchiveHandler::new(db.clone(), store)),
        );

        let (events, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            config,
            db,
            handlers: Arc::new(handlers),
            drain: Arc::new(AtomicBool::new(false)),
            events,
            workers: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Start the worker pool and the dispatch/cleanup timers.
    ///
    /// Worker construction is staggered to reduce initial contention on the
    /// store. One dispatch runs immediately so preexisting work is picked up
    /// without waiting for the first tick.
    pub async fn start(&mut self) {
        info!(
            subsystem = "jobs",
            component = "dispatcher",
            workers = self.config.worker_count,
            dispatch_interval_secs = self.config.dispatch_interval.as_secs_f64(),
            cleanup_interval_secs = self.config.cleanup_interval.as_secs_f64(),
            "Starting dispatcher"
        );

        for i in 0..self.config.worker_count {
            if i > 0 {
                sleep(self.config.start_stagger).await;
            }
            let (tx, rx) = mpsc::channel(defaults::WORKER_CONTROL_CAPACITY);
            let worker = Worker::new(
                format!("worker-{i}"),
                self.db.clone(),
                self.handlers.clone(),
                self.config.worker_poll_interval,
                self.drain.clone(),
                self.events.clone(),
            );
            let join = tokio::spawn(worker.run(rx));
            self.workers.push(WorkerHandle { tx, join });
        }

        let senders: Vec<mpsc::Sender<WorkerMessage>> =
            self.workers.iter().map(|w| w.tx.clone()).collect();

        // Initial dispatch, before the first timer tick.
        Self::dispatch_tick(&self.db, &senders).await;

        {
            let db = self.db.clone();
            let senders = senders.clone();
            let drain = self.drain.clone();
            let dispatch_interval = self.config.dispatch_interval;
            self.timers.push(tokio::spawn(async move {
                let mut ticker = interval(dispatch_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await; // first tick is immediate
                loop {
                    ticker.tick().await;
                    if drain.load(Ordering::SeqCst) {
                        break;
                    }
                    Self::dispatch_tick(&db, &senders).await;
                }
            }));
        }

        {
            let db = self.db.clone();
            let drain = self.drain.clone();
            let cleanup_interval = self.config.cleanup_interval;
            let orphan_threshold = self.config.orphan_threshold;
            self.timers.push(tokio::spawn(async move {
                let mut ticker = interval(cleanup_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await; // first tick is immediate
                loop {
                    ticker.tick().await;
                    if drain.load(Ordering::SeqCst) {
                        break;
                    }
                    match db.cleanup_orphaned_jobs(orphan_threshold).await {
                        Ok(0) => {}
                        Ok(processed) => {
                            info!(
                                subsystem = "jobs",
                                component = "dispatcher",
                                op = "cleanup_orphaned_jobs",
                                processed,
                                "Orphan sweep recovered stuck jobs"
                            );
                        }
                        Err(e) => {
                            // Try again next tick.
                            warn!(
                                subsystem = "jobs",
                                component = "dispatcher",
                                error = %e,
                                "Orphan sweep failed"
                            );
                        }
                    }
                    match db.documents.archive_old_documents().await {
                        Ok(0) => {}
                        Ok(archived) => {
                            info!(
                                subsystem = "jobs",
                                component = "dispatcher",
                                op = "archive_old_documents",
                                archived,
                                "Retention sweep archived documents"
                            );
                        }
                        Err(e) => {
                            warn!(
                                subsystem = "jobs",
                                component = "dispatcher",
                                error = %e,
                                "Retention sweep failed"
                            );
                        }
                    }
                }
            }));
        }
    }

    /// Level-triggered queue check: when any pending job is due, signal
    /// every worker. The signal is idempotent and lossy by design — a full
    /// control channel means the worker is already awake, and a missed
    /// signal is repaired by the next tick.
    async fn dispatch_tick(db: &Database, senders: &[mpsc::Sender<WorkerMessage>]) {
        match db.jobs.pending_ready_count().await {
            Ok(0) => {}
            Ok(pending) => {
                debug!(
                    subsystem = "jobs",
                    component = "dispatcher",
                    pending,
                    "Signaling workers"
                );
                for tx in senders {
                    let _ = tx.try_send(WorkerMessage::Drain);
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "dispatcher",
                    error = %e,
                    "Queue check failed"
                );
            }
        }
    }

    /// Drain and stop the pool: set the drain flag, tell every worker to
    /// stop, wait up to the configured grace period per worker for its
    /// in-flight job, then force-terminate. A force-killed worker's job
    /// stays in processing and is recovered by the orphan sweep.
    pub async fn stop(&mut self) {
        info!(
            subsystem = "jobs",
            component = "dispatcher",
            "Stopping dispatcher"
        );
        self.drain.store(true, Ordering::SeqCst);

        for timer in self.timers.drain(..) {
            timer.abort();
        }

        for worker in &self.workers {
            let _ = worker.tx.try_send(WorkerMessage::Stop);
        }

        for (i, mut worker) in self.workers.drain(..).enumerate() {
            match timeout(self.config.shutdown_wait, &mut worker.join).await {
                Ok(_) => {}
                Err(_) => {
                    let worker_id = format!("worker-{i}");
                    error!(
                        subsystem = "jobs",
                        component = "dispatcher",
                        worker_id = %worker_id,
                        "Worker did not drain in time, force-terminating"
                    );
                    worker.join.abort();
                }
            }
        }

        info!(
            subsystem = "jobs",
            component = "dispatcher",
            "Dispatcher stopped"
        );
    }
}
