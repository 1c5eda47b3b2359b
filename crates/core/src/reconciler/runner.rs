//! Reconciler implementation.
//!
//! Runs the two passes on their own timers:
//! - Announce: feed items to tagged download jobs
//! - Import: finished jobs to library files linked to subjects
//!
//! Each loop is non-reentrant. A pass triggered by hand waits for a running
//! pass of the same loop to finish instead of overlapping it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SettingsCell;
use crate::metrics;

use super::context::{Collaborators, PassContext};
use super::types::{
    AnnounceReport, ImportPassReport, LoopKind, PassRecord, PassSettings, ReconcilerError,
    ReconcilerStatus,
};
use super::{announce, import};

/// Serializes passes of one loop and remembers the last result.
struct PassSlot<R> {
    lock: Mutex<()>,
    last: RwLock<Option<PassRecord<R>>>,
}

impl<R: Clone> PassSlot<R> {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            last: RwLock::new(None),
        }
    }

    async fn run<F>(&self, kind: LoopKind, pass: F) -> Result<R, ReconcilerError>
    where
        F: Future<Output = Result<R, ReconcilerError>>,
    {
        let _guard = self.lock.lock().await;
        let started = Instant::now();
        let result = pass.await;
        let elapsed = started.elapsed();

        let outcome = if result.is_ok() { "success" } else { "failed" };
        metrics::PASSES_TOTAL
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
        metrics::PASS_DURATION
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());

        *self.last.write().await = Some(PassRecord::new(elapsed, &result));
        result
    }

    async fn last(&self) -> Option<PassRecord<R>> {
        self.last.read().await.clone()
    }
}

struct Inner {
    ctx: PassContext,
    announce: PassSlot<AnnounceReport>,
    import: PassSlot<ImportPassReport>,
}

impl Inner {
    async fn run_announce(&self) -> Result<AnnounceReport, ReconcilerError> {
        self.announce
            .run(LoopKind::Announce, announce::run_pass(&self.ctx))
            .await
    }

    async fn run_import(&self) -> Result<ImportPassReport, ReconcilerError> {
        self.import
            .run(LoopKind::Import, import::run_pass(&self.ctx))
            .await
    }

    async fn run(&self, kind: LoopKind) {
        let result = match kind {
            LoopKind::Announce => self.run_announce().await.map(|_| ()),
            LoopKind::Import => self.run_import().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(pass = kind.as_str(), error = %e, "Pass failed, retrying on next tick");
        }
    }
}

/// Drives the announce and import loops.
pub struct Reconciler {
    inner: Arc<Inner>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Reconciler {
    pub fn new(collaborators: Collaborators, settings: SettingsCell, pass: PassSettings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                ctx: PassContext::new(collaborators, settings, pass),
                announce: PassSlot::new(),
                import: PassSlot::new(),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start both loops. The first pass of each runs immediately.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reconciler already running");
            return;
        }
        self.inner.ctx.walk_enabled.store(true, Ordering::SeqCst);

        let config = &self.inner.ctx.pass.reconciler;
        info!(
            announce_interval_secs = config.announce_interval().as_secs(),
            import_interval_secs = config.import_interval().as_secs(),
            mode = ?config.mode,
            "Starting reconciler"
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_loop(LoopKind::Announce, config.announce_interval()));
        tasks.push(self.spawn_loop(LoopKind::Import, config.import_interval()));
    }

    /// Stop both loops and wait for them. An in-flight pass finishes first;
    /// directory walks stop at the next entry.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Reconciler not running");
            return;
        }

        info!("Stopping reconciler");
        self.inner.ctx.walk_enabled.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Reconciler loop task failed");
            }
        }
        info!("Reconciler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Run an announce pass now.
    pub async fn run_announce_pass(&self) -> Result<AnnounceReport, ReconcilerError> {
        self.inner.run_announce().await
    }

    /// Run an import pass now.
    pub async fn run_import_pass(&self) -> Result<ImportPassReport, ReconcilerError> {
        self.inner.run_import().await
    }

    pub async fn status(&self) -> ReconcilerStatus {
        let config = &self.inner.ctx.pass.reconciler;
        ReconcilerStatus {
            running: self.is_running(),
            announce_interval_secs: config.announce_interval().as_secs(),
            import_interval_secs: config.import_interval().as_secs(),
            last_announce: self.inner.announce.last().await,
            last_import: self.inner.import.last().await,
        }
    }

    fn spawn_loop(&self, kind: LoopKind, period: Duration) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(pass = kind.as_str(), "Loop started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(pass = kind.as_str(), "Loop received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        inner.run(kind).await;
                    }
                }
            }
            info!(pass = kind.as_str(), "Loop stopped");
        })
    }
}
