//! Background work queues.
//!
//! Two independent queues connect the import pipeline to slower follow-up
//! work:
//!
//! - **Thumbnails**: bounded. [`ThumbnailQueue::enqueue`] waits while the
//!   queue is full, so imports slow down instead of dropping requests.
//! - **Repository changes**: unbounded intake, drained in batches.
//!
//! Each queue is created once with its worker half and handed to whoever
//! needs it. Workers publish [`QueueState`] on a `watch` channel and stop
//! when cancelled or when every sender is gone.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hoard_core::models::Repository;
use hoard_core::store::MediaStore;
use hoard_core::ContentHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

/// Bytes of a freshly stored file, waiting for a thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub hash: ContentHash,
    pub bytes: Vec<u8>,
}

/// Receives thumbnail requests off the queue.
#[async_trait]
pub trait ThumbnailConsumer: Send + Sync {
    async fn create_thumbnail(&self, bytes: &[u8], hash: &ContentHash) -> Result<()>;
}

/// Producer half of the bounded thumbnail queue.
#[derive(Clone)]
pub struct ThumbnailQueue {
    tx: mpsc::Sender<ThumbnailRequest>,
}

/// Consumer half of the thumbnail queue.
pub struct ThumbnailWorker {
    rx: mpsc::Receiver<ThumbnailRequest>,
    state: watch::Sender<QueueState>,
}

pub fn thumbnail_queue(capacity: usize) -> (ThumbnailQueue, ThumbnailWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (state, _) = watch::channel(QueueState::Idle);
    (ThumbnailQueue { tx }, ThumbnailWorker { rx, state })
}

impl ThumbnailQueue {
    /// Hand a request to the worker, waiting for space if the queue is full.
    pub async fn enqueue(&self, request: ThumbnailRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|e| anyhow!("thumbnail worker stopped; dropped {}", e.0.hash))
    }

    /// Free slots left before producers start waiting.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

impl ThumbnailWorker {
    pub fn state(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Process requests until cancelled or every producer is dropped.
    ///
    /// Requests already buffered when cancellation arrives are still
    /// processed. Returns the number of thumbnails created.
    pub async fn run(mut self, consumer: Arc<dyn ThumbnailConsumer>, cancel: CancellationToken) -> usize {
        let mut created = 0usize;
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            self.state.send_replace(QueueState::Draining);
            created += process_thumbnail(consumer.as_ref(), request).await;
            while let Ok(request) = self.rx.try_recv() {
                created += process_thumbnail(consumer.as_ref(), request).await;
            }
            self.state.send_replace(QueueState::Idle);
        }

        self.rx.close();
        let mut flushed = 0usize;
        while let Some(request) = self.rx.recv().await {
            self.state.send_replace(QueueState::Draining);
            flushed += process_thumbnail(consumer.as_ref(), request).await;
        }
        self.state.send_replace(QueueState::Idle);
        if flushed > 0 {
            debug!(flushed, "thumbnail queue flushed on shutdown");
        }
        info!(created = created + flushed, "thumbnail worker stopped");
        created + flushed
    }
}

async fn process_thumbnail(consumer: &dyn ThumbnailConsumer, request: ThumbnailRequest) -> usize {
    match consumer.create_thumbnail(&request.bytes, &request.hash).await {
        Ok(()) => 1,
        Err(e) => {
            error!(hash = %request.hash, error = %e, "thumbnail creation failed");
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Repository changes
// ---------------------------------------------------------------------------

/// Move the item with `hash` to `repository`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryChange {
    pub hash: ContentHash,
    pub repository: Repository,
}

/// Producer half of the repository-change queue. Never blocks.
#[derive(Clone)]
pub struct RepositoryQueue {
    tx: mpsc::UnboundedSender<RepositoryChange>,
}

pub struct RepositoryWorker {
    rx: mpsc::UnboundedReceiver<RepositoryChange>,
    state: watch::Sender<QueueState>,
    batch_size: usize,
}

pub fn repository_queue(batch_size: usize) -> (RepositoryQueue, RepositoryWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state, _) = watch::channel(QueueState::Idle);
    (
        RepositoryQueue { tx },
        RepositoryWorker {
            rx,
            state,
            batch_size: batch_size.max(1),
        },
    )
}

impl RepositoryQueue {
    pub fn enqueue(&self, change: RepositoryChange) -> Result<()> {
        self.tx
            .send(change)
            .map_err(|e| anyhow!("repository worker stopped; dropped change for {}", e.0.hash))
    }
}

impl RepositoryWorker {
    pub fn state(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Apply changes in batches until cancelled or every producer is dropped.
    ///
    /// Cancellation between two changes of a batch keeps what was already
    /// applied and stops. A failed change is logged and skipped. Returns the
    /// number of changes applied.
    pub async fn run(mut self, store: Arc<dyn MediaStore>, cancel: CancellationToken) -> usize {
        let mut applied = 0usize;
        let mut batch = Vec::with_capacity(self.batch_size);

        'outer: loop {
            batch.clear();
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                n = self.rx.recv_many(&mut batch, self.batch_size) => n,
            };
            if received == 0 {
                break;
            }

            self.state.send_replace(QueueState::Draining);
            debug!(batch = received, "applying repository changes");
            for change in batch.drain(..) {
                if cancel.is_cancelled() {
                    break 'outer;
                }
                match store.set_repository(&change.hash, change.repository).await {
                    Ok(true) => applied += 1,
                    Ok(false) => {
                        warn!(hash = %change.hash, "repository change for unknown item")
                    }
                    Err(e) => {
                        error!(hash = %change.hash, error = %e, "repository change failed")
                    }
                }
            }
            if self.rx.is_empty() {
                self.state.send_replace(QueueState::Idle);
            }
        }

        self.state.send_replace(QueueState::Idle);
        info!(applied, "repository worker stopped");
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::store::memory::InMemoryStore;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ContentHash>>,
    }

    #[async_trait]
    impl ThumbnailConsumer for Recorder {
        async fn create_thumbnail(&self, bytes: &[u8], hash: &ContentHash) -> Result<()> {
            if bytes == b"broken" {
                anyhow::bail!("cannot decode");
            }
            self.seen.lock().unwrap().push(*hash);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bounded_queue_applies_backpressure_without_dropping() {
        let (queue, worker) = thumbnail_queue(2);
        for i in 0..2u8 {
            queue
                .enqueue(ThumbnailRequest {
                    hash: hoard_core::hash(&[i]),
                    bytes: vec![i],
                })
                .await
                .unwrap();
        }
        assert_eq!(queue.available(), 0);

        // Third send waits until the worker starts draining.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            queue.enqueue(ThumbnailRequest {
                hash: hoard_core::hash(&[9]),
                bytes: vec![9],
            }),
        )
        .await;
        assert!(blocked.is_err());

        let recorder = Arc::new(Recorder::default());
        let handle = tokio::spawn(worker.run(recorder.clone(), CancellationToken::new()));
        queue
            .enqueue(ThumbnailRequest {
                hash: hoard_core::hash(&[2]),
                bytes: b"broken".to_vec(),
            })
            .await
            .unwrap();
        drop(queue);

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn thumbnail_worker_flushes_buffer_on_cancel() {
        let (queue, worker) = thumbnail_queue(4);
        for i in 0..3u8 {
            queue
                .enqueue(ThumbnailRequest {
                    hash: hoard_core::hash(&[i]),
                    bytes: vec![i],
                })
                .await
                .unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let recorder = Arc::new(Recorder::default());
        let state = worker.state();
        assert_eq!(worker.run(recorder.clone(), cancel).await, 3);
        assert_eq!(*state.borrow(), QueueState::Idle);
        assert!(queue
            .enqueue(ThumbnailRequest {
                hash: hoard_core::hash(b"late"),
                bytes: vec![],
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn repository_worker_applies_and_skips_unknown() {
        let store = Arc::new(InMemoryStore::new());
        let a = store.create_item(&hoard_core::hash(b"a")).await.unwrap();
        let b = store.create_item(&hoard_core::hash(b"b")).await.unwrap();

        let (queue, worker) = repository_queue(2);
        for hash in [a.hash, hoard_core::hash(b"ghost"), b.hash] {
            queue
                .enqueue(RepositoryChange {
                    hash,
                    repository: Repository::Archive,
                })
                .unwrap();
        }
        drop(queue);

        let applied = worker.run(store.clone(), CancellationToken::new()).await;
        assert_eq!(applied, 2);
        for id in [a.id, b.id] {
            let item = store.get_item(id).await.unwrap().unwrap();
            assert_eq!(item.repository, Repository::Archive);
        }
    }

    #[tokio::test]
    async fn repository_worker_exits_cleanly_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let (queue, worker) = repository_queue(50);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(store, cancel.clone()));
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 0);
        assert!(queue
            .enqueue(RepositoryChange {
                hash: hoard_core::hash(b"x"),
                repository: Repository::Trash,
            })
            .is_err());
    }
}
