use super::flush::{FlushOutcome, Flusher};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Default delay between dirty checks
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Background worker that flushes the registry whenever it is dirty
pub struct FlushWorker {
    flusher: Arc<Flusher>,
    interval: Duration,
    started: AtomicBool,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushWorker {
    pub fn new(flusher: Arc<Flusher>, interval: Duration) -> Self {
        Self {
            flusher,
            interval,
            started: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Start the background loop.
    ///
    /// Only the first call spawns a task; later calls return `false`.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.running.store(true, Ordering::SeqCst);

        let flusher = Arc::clone(&self.flusher);
        let running = Arc::clone(&self.running);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!("Flush worker started with interval {:?}", period);

            // First check happens one full period after start
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;

                if !flusher.is_dirty() {
                    continue;
                }

                let task_flusher = Arc::clone(&flusher);
                match tokio::task::spawn_blocking(move || task_flusher.flush()).await {
                    Ok(Ok(FlushOutcome::Written { bytes })) => {
                        tracing::debug!("Flushed {} bytes", bytes);
                    }
                    Ok(Ok(FlushOutcome::Clean)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Flush failed, retrying in {:?}: {}", period, e);
                    }
                    Err(e) => {
                        tracing::warn!("Flush task aborted: {}", e);
                    }
                }
            }

            tracing::info!("Flush worker stopped");
        });

        *self.handle.lock() = Some(handle);
        true
    }

    /// Stop the worker; an in-progress flush still runs to completion
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
