//! [`MessageManager`]: asynchronous intake and dispatch.
//!
//! `manage` only enqueues and returns. A fixed pool of worker tasks takes
//! messages off the queue; each unit of work asks the router for the
//! per-recipient routes and hands every route to the adaptor manager. A unit
//! that fails or panics is logged and does not affect any other unit.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use beast_adaptors::AdaptorManager;
use beast_core::config::ManagerConfig;
use beast_core::{Message, MessageSink};
use beast_router::Router;

type SharedReceiver = Arc<tokio::sync::Mutex<UnboundedReceiver<Message>>>;

/// Dispatch counters, readable while the manager runs.
#[derive(Debug, Default)]
struct Stats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    /// Messages queued by `manage`.
    pub accepted: u64,
    /// Messages rejected because the manager was shut down.
    pub dropped: u64,
    /// Messages a worker has finished with, whether or not they produced routes.
    pub processed: u64,
    /// Routes handed to an adaptor successfully.
    pub delivered: u64,
    /// Routes whose delivery failed, including units that panicked.
    pub failed: u64,
}

pub struct MessageManager {
    sender: Mutex<Option<UnboundedSender<Message>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    grace: Duration,
    stats: Arc<Stats>,
}

impl MessageManager {
    /// Spawn `config.pool_size` workers on the current tokio runtime.
    pub fn start(
        router: Arc<Router>,
        adaptors: Arc<AdaptorManager>,
        config: &ManagerConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(Stats::default());
        let pool_size = config.pool_size.max(1);

        let workers = (0..pool_size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&router),
                    Arc::clone(&adaptors),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        info!(pool_size, "message manager started");
        Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            grace: config.shutdown_grace(),
            stats,
        })
    }

    /// Queue `message` for dispatch and return immediately.
    ///
    /// After [`shutdown`](Self::shutdown) the message is dropped.
    pub fn manage(&self, message: Message) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(kind = message.kind(), "message manager shut down, dropping message");
            return;
        };
        let kind = message.kind();
        match tx.send(message) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind, "dispatch queue closed, dropping message");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting messages, let the workers drain what is already
    /// queued, and abort whatever is still running after the grace period.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            debug!("message manager already shut down");
            return;
        }
        // Dropping the only sender closes the queue; workers exit once it is empty.
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        info!(workers = workers.len(), grace = ?self.grace, "message manager shutting down");

        match tokio::time::timeout(self.grace, futures::future::join_all(workers)).await {
            Ok(_) => info!("message manager stopped"),
            Err(_) => {
                warn!(grace = ?self.grace, "in-flight work did not finish in time, aborting workers");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

impl MessageSink for MessageManager {
    fn manage(&self, message: Message) {
        MessageManager::manage(self, message);
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: SharedReceiver,
    router: Arc<Router>,
    adaptors: Arc<AdaptorManager>,
    stats: Arc<Stats>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };
        let kind = message.kind();
        let unit = dispatch(&router, &adaptors, &stats, message);
        if AssertUnwindSafe(unit).catch_unwind().await.is_err() {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(worker_id, kind, "dispatch panicked");
        }
        stats.processed.fetch_add(1, Ordering::Relaxed);
    }
    debug!(worker_id, "dispatch worker exiting");
}

/// One unit of work: expand through the router, then deliver each route.
async fn dispatch(router: &Router, adaptors: &AdaptorManager, stats: &Stats, message: Message) {
    let routes = router.expand(&message);
    if routes.is_empty() {
        debug!(kind = message.kind(), "no routes for message");
        return;
    }
    for route in &routes {
        match adaptors.handle(route).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    destination = %route.destination,
                    kind = route.payload.kind(),
                    error = %e,
                    "delivery failed"
                );
            }
        }
    }
}
