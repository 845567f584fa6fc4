//! Bounded worker pool for media transfers.
//!
//! Downloads and uploads are submitted as jobs on one bounded channel and
//! executed by a fixed set of tokio workers, keeping slow network I/O off the
//! ingestion path. Every job answers on its own oneshot channel, and
//! [`TransferQueue::shutdown`] drains whatever is still queued before it
//! returns.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MediaError, Result};
use crate::pipeline::{FetchedMedia, MediaPipeline, OutboundMedia};

/// Work items executed by the pool.
enum TransferJob {
    /// Download and cache the attachment of a message.
    Fetch {
        message_id: String,
        chat_jid: String,
        reply: oneshot::Sender<Result<FetchedMedia>>,
    },
    /// Encrypt and upload a local file.
    Outbound {
        path: PathBuf,
        reply: oneshot::Sender<Result<OutboundMedia>>,
    },
}

/// Completion of a submitted job. Resolves to the job's result, or
/// [`MediaError::QueueClosed`] if the pool went away before running it.
pub struct TransferHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for TransferHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(MediaError::QueueClosed)))
    }
}

pub struct TransferQueue {
    tx: Mutex<Option<mpsc::Sender<TransferJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransferQueue {
    /// Start `workers` tasks reading from a queue of `depth` pending jobs.
    pub fn spawn(pipeline: Arc<MediaPipeline>, workers: usize, depth: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<TransferJob>(depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker| {
                let rx = rx.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        run_job(&pipeline, worker, job).await;
                    }
                    debug!(worker, "transfer worker stopped");
                })
            })
            .collect();

        info!(workers, depth, "transfer queue started");

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    pub async fn submit_fetch(
        &self,
        message_id: &str,
        chat_jid: &str,
    ) -> Result<TransferHandle<FetchedMedia>> {
        let (reply, rx) = oneshot::channel();
        self.send(TransferJob::Fetch {
            message_id: message_id.to_string(),
            chat_jid: chat_jid.to_string(),
            reply,
        })
        .await?;
        Ok(TransferHandle { rx })
    }

    pub async fn submit_outbound(&self, path: PathBuf) -> Result<TransferHandle<OutboundMedia>> {
        let (reply, rx) = oneshot::channel();
        self.send(TransferJob::Outbound { path, reply }).await?;
        Ok(TransferHandle { rx })
    }

    async fn send(&self, job: TransferJob) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(MediaError::QueueClosed)?;
        tx.send(job).await.map_err(|_| MediaError::QueueClosed)
    }

    /// Stop accepting jobs, let the workers finish everything already
    /// queued, and wait for them to exit.
    pub async fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("transfer worker panicked: {e}");
            }
        }
        if count > 0 {
            info!(workers = count, "transfer queue drained");
        }
    }
}

async fn run_job(pipeline: &MediaPipeline, worker: usize, job: TransferJob) {
    match job {
        TransferJob::Fetch {
            message_id,
            chat_jid,
            reply,
        } => {
            debug!(worker, message_id = %message_id, chat = %chat_jid, "fetch job");
            let result = pipeline.fetch(&message_id, &chat_jid).await;
            if let Err(e) = &result {
                warn!(message_id = %message_id, chat = %chat_jid, "fetch failed: {e}");
            }
            // The submitter may have stopped waiting.
            let _ = reply.send(result);
        }
        TransferJob::Outbound { path, reply } => {
            debug!(worker, path = %path.display(), "outbound job");
            let result = pipeline.prepare_outbound(&path).await;
            if let Err(e) = &result {
                warn!(path = %path.display(), "outbound failed: {e}");
            }
            let _ = reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::pipeline::tests::{archive_media, fixture, fixture_with, MemoryTransport, CHAT};

    #[tokio::test]
    async fn fetch_job_completes() {
        let fx = fixture();
        archive_media(&fx, "m1", b"bytes");
        let queue = TransferQueue::spawn(fx.pipeline.clone(), 2, 8);

        let fetched = queue.submit_fetch("m1", CHAT).await.unwrap().await.unwrap();
        assert_eq!(std::fs::read(fetched.path).unwrap(), b"bytes");

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn failures_are_reported_to_the_submitter() {
        let fx = fixture();
        let queue = TransferQueue::spawn(fx.pipeline.clone(), 1, 4);

        let err = queue.submit_fetch("missing", CHAT).await.unwrap().await.unwrap_err();
        assert!(matches!(err, MediaError::NotFound));

        let err = queue
            .submit_outbound(fx.dir.path().join("absent.png"))
            .await
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let fx = fixture_with(MemoryTransport {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        for i in 0..5 {
            archive_media(&fx, &format!("m{i}"), format!("payload {i}").as_bytes());
        }
        let queue = TransferQueue::spawn(fx.pipeline.clone(), 2, 8);

        let mut handles = Vec::new();
        for i in 0..5 {
            handles.push(queue.submit_fetch(&format!("m{i}"), CHAT).await.unwrap());
        }
        queue.shutdown().await;

        assert_eq!(fx.transport.downloads.load(Ordering::SeqCst), 5);
        for handle in handles {
            assert!(handle.await.is_ok());
        }
    }

    #[tokio::test]
    async fn submissions_after_shutdown_fail() {
        let fx = fixture();
        let queue = TransferQueue::spawn(fx.pipeline.clone(), 1, 1);
        queue.shutdown().await;

        assert!(matches!(
            queue.submit_fetch("m1", CHAT).await,
            Err(MediaError::QueueClosed)
        ));
        assert!(matches!(
            queue.submit_outbound(PathBuf::from("x.png")).await,
            Err(MediaError::QueueClosed)
        ));
    }
}
