//! Worker — a single-threaded execution unit owning one job at a time.
//!
//! The run loop claims one job, executes the typed handler, records the
//! terminal outcome, and repeats until the queue is empty, then suspends
//! until a dispatcher signal or the safety-net poll tick. A drain flag is
//! observed before each claim; an in-flight job is always finished and its
//! outcome recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use docpress_core::{Job, JobStatus, JobType};
use docpress_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Control message from the dispatcher. The channel is bounded and carries
/// exactly these two kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// The queue has ready work: wake up and claim until empty.
    Drain,
    /// Finish the in-flight job (if any) and exit the run loop.
    Stop,
}

/// Event emitted by a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker entered its run loop.
    WorkerStarted { worker_id: String },
    /// Worker left its run loop.
    WorkerStopped { worker_id: String },
    /// A job was claimed and handed to its handler.
    JobStarted {
        worker_id: String,
        job_id: String,
        job_type: JobType,
    },
    /// A job's handler completed and co-committed.
    JobCompleted {
        worker_id: String,
        job_id: String,
        job_type: JobType,
    },
    /// A job failed (retry or terminal is the queue's decision).
    JobFailed {
        worker_id: String,
        job_id: String,
        job_type: JobType,
        error: String,
    },
}

/// A single-threaded worker processing at most one job at a time.
pub struct Worker {
    id: String,
    db: Database,
    handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
    poll_interval: Duration,
    drain: Arc<AtomicBool>,
    events: broadcast::Sender<WorkerEvent>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        db: Database,
        handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
        poll_interval: Duration,
        drain: Arc<AtomicBool>,
        events: broadcast::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            id: id.into(),
            db,
            handlers,
            poll_interval,
            drain,
            events,
        }
    }

    /// Run until stopped. Claims eagerly while work is available; otherwise
    /// suspends until signaled or the next safety-net tick.
    pub async fn run(self, mut control_rx: mpsc::Receiver<WorkerMessage>) {
        info!(
            subsystem = "jobs",
            component = "worker",
            worker_id = %self.id,
            "Worker started"
        );
        let _ = self.events.send(WorkerEvent::WorkerStarted {
            worker_id: self.id.clone(),
        });

        loop {
            if self.drain.load(Ordering::SeqCst) {
                break;
            }

            match self.claim().await {
                Some(job) => {
                    self.execute(job).await;
                }
                None => {
                    tokio::select! {
                        msg = control_rx.recv() => match msg {
                            Some(WorkerMessage::Drain) => {}
                            Some(WorkerMessage::Stop) | None => break,
                        },
                        _ = sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        let _ = self.events.send(WorkerEvent::WorkerStopped {
            worker_id: self.id.clone(),
        });
        info!(
            subsystem = "jobs",
            component = "worker",
            worker_id = %self.id,
            "Worker stopped"
        );
    }

    /// Claim the next available job. Claim errors (including a busy store
    /// after retries) are logged and treated as "try next tick".
    async fn claim(&self) -> Option<Job> {
        match self.db.jobs.claim_next(&self.id).await {
            Ok(job) => job,
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    worker_id = %self.id,
                    error = %e,
                    "Failed to claim job"
                );
                None
            }
        }
    }

    /// Execute a claimed job and record its outcome. Handler panics are
    /// contained at the task boundary and become ordinary job failures.
    async fn execute(&self, job: Job) {
        let start = Instant::now();
        let job_id = job.id.clone();
        let job_type = job.job_type;

        debug!(
            subsystem = "jobs",
            component = "worker",
            worker_id = %self.id,
            job_id = %job_id,
            job_type = %job_type,
            attempt = job.attempts,
            "Processing job"
        );
        let _ = self.events.send(WorkerEvent::JobStarted {
            worker_id: self.id.clone(),
            job_id: job_id.clone(),
            job_type,
        });

        let result = match self.handlers.get(&job_type).cloned() {
            Some(handler) => {
                let ctx = JobContext::new(job.clone(), self.id.clone());
                let task = tokio::spawn(async move { handler.execute(ctx).await });
                match task.await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => {
                        error!(
                            subsystem = "jobs",
                            component = "worker",
                            worker_id = %self.id,
                            job_id = %job_id,
                            "Job handler panicked"
                        );
                        JobResult::Failed("job handler panicked".to_string())
                    }
                    Err(_) => JobResult::Failed("job handler was cancelled".to_string()),
                }
            }
            None => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    job_type = %job_type,
                    "No handler registered for job type"
                );
                JobResult::FailedTerminal(format!("no handler for job type: {job_type}"))
            }
        };

        match result {
            JobResult::Completed => {
                info!(
                    subsystem = "jobs",
                    component = "worker",
                    worker_id = %self.id,
                    job_id = %job_id,
                    job_type = %job_type,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
                let _ = self.events.send(WorkerEvent::JobCompleted {
                    worker_id: self.id.clone(),
                    job_id,
                    job_type,
                });
            }
            JobResult::Failed(error) => {
                self.record_failure(&job, &error, false).await;
                let _ = self.events.send(WorkerEvent::JobFailed {
                    worker_id: self.id.clone(),
                    job_id,
                    job_type,
                    error,
                });
            }
            JobResult::FailedTerminal(error) => {
                self.record_failure(&job, &error, true).await;
                let _ = self.events.send(WorkerEvent::JobFailed {
                    worker_id: self.id.clone(),
                    job_id,
                    job_type,
                    error,
                });
            }
        }
    }

    /// Route a failure into the queue's retry policy, then apply the
    /// convert-side secondary effects. Secondary failures are logged and
    /// swallowed — the job row write is authoritative.
    ///
    /// A terminal short-cut means the document is missing or was resolved by
    /// another outcome, so only the job row is written. A budget-exhausted
    /// failure fails the document with the same error and recomputes batch
    /// progress; a retryable failure returns the document to pending so the
    /// next claim passes the processing gate.
    async fn record_failure(&self, job: &Job, error: &str, terminal: bool) {
        warn!(
            subsystem = "jobs",
            component = "worker",
            worker_id = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            error,
            "Job failed"
        );

        if terminal {
            if let Err(e) = self.db.jobs.fail_terminal(&job.id, error).await {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    worker_id = %self.id,
                    job_id = %job.id,
                    error = %e,
                    "Failed to record job failure"
                );
            }
            return;
        }

        let outcome = match self.db.jobs.fail(&job.id, error).await {
            Ok(status) => status,
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    worker_id = %self.id,
                    job_id = %job.id,
                    error = %e,
                    "Failed to record job failure"
                );
                return;
            }
        };

        if job.job_type != JobType::Convert {
            return;
        }
        match outcome {
            JobStatus::Pending => {
                if let Err(e) = self.db.documents.reset_to_pending(&job.document_id).await {
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        document_id = %job.document_id,
                        error = %e,
                        "Document reset ahead of retry failed"
                    );
                }
            }
            JobStatus::Failed => {
                if let Err(e) = self
                    .db
                    .documents
                    .mark_failed(&job.document_id, error)
                    .await
                {
                    warn!(
                        subsystem = "jobs",
                        component = "worker",
                        document_id = %job.document_id,
                        error = %e,
                        "Best-effort document failure write failed"
                    );
                }
                match self.db.documents.get(&job.document_id).await {
                    Ok(Some(doc)) => {
                        if let Some(batch_id) = doc.batch_id {
                            if let Err(e) = self.db.batches.update_progress(&batch_id).await {
                                warn!(
                                    subsystem = "jobs",
                                    component = "worker",
                                    batch_id = %batch_id,
                                    error = %e,
                                    "Batch recompute after failure failed"
                                );
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            document_id = %job.document_id,
                            error = %e,
                            "Could not load document for batch recompute"
                        );
                    }
                }
            }
            _ => {}
        }
    }
}
