use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::metrics::DeliveryMetrics;
use crate::registry::SessionRegistry;

/// A queued fan-out job. Connection totals are deliberately absent: they are
/// computed by the worker at fan-out time, after the registry mutation that
/// triggered the notice, so a departing session never counts itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A client connected; announce to everyone but the new session.
    Joined { exclude: String },
    /// A client disconnected; announce to everyone remaining.
    Left,
    /// Relay an inbound chat message to everyone but the sender.
    Chat { text: String, exclude: String },
}

/// Bounded notice queue drained by a pool of worker tasks.
///
/// Transport callbacks hand their fan-out here and return immediately;
/// establishing or tearing down a connection is never slowed by delivery to
/// existing peers. A full queue drops the notice — missed notifications are
/// fire-and-forget.
pub struct Notifier {
    tx: mpsc::Sender<Notice>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Notifier {
    pub fn start(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<Broadcaster>,
        queue_depth: usize,
        worker_count: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let queue = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let queue = queue.clone();
                let registry = registry.clone();
                let broadcaster = broadcaster.clone();
                let mut shutdown = shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        let notice = tokio::select! {
                            _ = shutdown.recv() => break,
                            notice = Self::next(&queue) => match notice {
                                Some(notice) => notice,
                                None => break,
                            },
                        };
                        Self::deliver(&registry, &broadcaster, notice);
                    }
                    tracing::debug!(worker_id, "Notifier worker stopped");
                })
            })
            .collect();

        tracing::info!(worker_count, queue_depth, "Notifier started");
        Self {
            tx,
            workers: std::sync::Mutex::new(workers),
        }
    }

    /// Queue a notice without blocking. Returns whether it was accepted.
    pub fn enqueue(&self, notice: Notice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(notice)) => {
                tracing::warn!(?notice, "Notice queue full, dropping notice");
                DeliveryMetrics::record_notice_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notice queue closed, dropping notice");
                false
            }
        }
    }

    /// Wait for the workers to finish. Meaningful only after the shutdown
    /// signal has fired; queued notices drain unless the signal reaches a
    /// worker first.
    pub async fn join(&self) {
        let workers = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("Notifier stopped");
    }

    async fn next(queue: &Mutex<mpsc::Receiver<Notice>>) -> Option<Notice> {
        queue.lock().await.recv().await
    }

    fn deliver(registry: &SessionRegistry, broadcaster: &Broadcaster, notice: Notice) {
        match notice {
            Notice::Joined { exclude } => {
                let text = format!(
                    "A new client connected. Total: {}",
                    registry.live_count()
                );
                broadcaster.broadcast(&text, Some(&exclude));
            }
            Notice::Left => {
                let text = format!(
                    "A client disconnected. Total: {}",
                    registry.live_count()
                );
                broadcaster.broadcast(&text, None);
            }
            Notice::Chat { text, exclude } => {
                broadcaster.broadcast(&text, Some(&exclude));
            }
        }
    }
}
