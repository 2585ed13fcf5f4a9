//! In-process export dispatcher
//!
//! Receives jobs over a bounded channel and runs them on the tokio runtime,
//! at most `concurrency` at a time. Match `concurrency` to the driver pool
//! size: extra jobs would only queue on the pool's lease semaphore.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::job::{ExportJob, ExportRunner};
use crate::render::RenderCapture;

/// Totals reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ExportWorker {
    sender: mpsc::Sender<ExportJob>,
    handle: JoinHandle<WorkerReport>,
}

impl ExportWorker {
    /// Start the dispatch loop
    pub fn spawn<R>(runner: Arc<ExportRunner<R>>, concurrency: usize, queue_capacity: usize) -> Self
    where
        R: RenderCapture + 'static,
    {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = tokio::spawn(dispatch_loop(runner, receiver, concurrency.max(1)));
        Self { sender, handle }
    }

    /// Queue a job; waits while the queue is full
    pub async fn submit(&self, job: ExportJob) -> Result<(), mpsc::error::SendError<ExportJob>> {
        self.sender.send(job).await
    }

    /// Stop accepting jobs, wait for queued and in-flight jobs, report totals
    pub async fn shutdown(self) -> WorkerReport {
        drop(self.sender);
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Export worker loop ended abnormally: {e}");
                WorkerReport::default()
            }
        }
    }
}

async fn dispatch_loop<R>(
    runner: Arc<ExportRunner<R>>,
    mut receiver: mpsc::Receiver<ExportJob>,
    concurrency: usize,
) -> WorkerReport
where
    R: RenderCapture + 'static,
{
    let limiter = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut report = WorkerReport::default();

    info!(concurrency, "Export worker started");

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
            break;
        };
        let runner = Arc::clone(&runner);
        tasks.spawn(async move {
            let _permit = permit;
            runner.run(&job).await.is_ok()
        });

        // Reap whatever already finished so the set does not grow unbounded
        while let Some(done) = tasks.try_join_next() {
            tally(&mut report, done);
        }
    }

    debug!("Export queue closed, draining in-flight jobs");
    while let Some(done) = tasks.join_next().await {
        tally(&mut report, done);
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "Export worker stopped"
    );
    report
}

fn tally(report: &mut WorkerReport, done: Result<bool, tokio::task::JoinError>) {
    match done {
        Ok(true) => report.succeeded += 1,
        Ok(false) => report.failed += 1,
        Err(e) => {
            warn!("Export task panicked or was cancelled: {e}");
            report.failed += 1;
        }
    }
}
