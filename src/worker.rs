//! Fixed-size worker pool.
//!
//! Workers poll the queue and dispatch jobs by kind. Concurrency is bounded
//! by the pool size rather than per-job spawning, so a burst of deliveries
//! never amplifies into an unbounded number of in-flight pipelines.

use crate::fetcher::TranscriptFetcher;
use crate::processor::TranscriptProcessor;
use crate::queue::{Job, JobConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(500);

/// A running pool of workers consuming the job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers against the consumer.
    pub fn spawn(
        concurrency: usize,
        consumer: Arc<dyn JobConsumer>,
        processor: Arc<TranscriptProcessor>,
        fetcher: Arc<TranscriptFetcher>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::with_capacity(concurrency);

        for worker_id in 0..concurrency {
            let consumer = Arc::clone(&consumer);
            let processor = Arc::clone(&processor);
            let fetcher = Arc::clone(&fetcher);
            let mut shutdown_rx = shutdown.subscribe();

            handles.push(tokio::spawn(async move {
                info!(worker_id, "worker started");
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    let delivered = match consumer.next_job().await {
                        Some(delivered) => delivered,
                        None => {
                            // Idle: wait for more work or shutdown.
                            tokio::select! {
                                _ = tokio::time::sleep(IDLE_POLL) => continue,
                                _ = shutdown_rx.changed() => continue,
                            }
                        }
                    };

                    debug!(
                        worker_id,
                        job_id = %delivered.job_id,
                        kind = delivered.job.kind(),
                        "picked up job"
                    );
                    run_job(&consumer, &processor, &fetcher, delivered).await;
                }
                info!(worker_id, "worker stopped");
            }));
        }

        Self { handles, shutdown }
    }

    /// Signal shutdown and wait for in-flight jobs to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }
}

async fn run_job(
    consumer: &Arc<dyn JobConsumer>,
    processor: &Arc<TranscriptProcessor>,
    fetcher: &Arc<TranscriptFetcher>,
    delivered: crate::queue::DeliveredJob,
) {
    let job_id = delivered.job_id;
    let result: Result<(), String> = match &delivered.job {
        Job::ProcessCall(job) => processor
            .process_call(job)
            .await
            .map_err(|e| e.to_string()),
        Job::FetchTranscript(job) => fetcher
            .fetch_transcript(job)
            .await
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => consumer.ack(&job_id).await,
        Err(reason) => {
            warn!(job_id = %job_id, %reason, "job failed");
            consumer.nack(&job_id, &reason).await;
        }
    }
}
