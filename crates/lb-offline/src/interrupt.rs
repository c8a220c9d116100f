//! Cancellation and process interrupt handling
//!
//! On Ctrl-C (or SIGTERM on unix) the handler thread cancels the batch,
//! removes every registered scratch file and exits the process with status 1.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::error::{OfflineError, OfflineResult};
use crate::scratch::ScratchStore;

/// Exit status used after an interrupt
pub const INTERRUPT_EXIT_CODE: i32 = 1;

/// Shared cancellation flag checked by long-running stages
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> OfflineResult<()> {
        if self.is_cancelled() {
            Err(OfflineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Cancel, purge scratch storage and return the number of files removed
pub fn handle_interrupt(cancel: &CancelToken, store: &ScratchStore) -> usize {
    cancel.cancel();
    let removed = store.purge_all();
    log::warn!("Interrupted, removed {} scratch file(s)", removed);
    removed
}

/// Run [`handle_interrupt`] on a dedicated thread once `trigger` resolves,
/// then pass the number of removed files to `on_handled`
pub(crate) fn spawn_interrupt_thread<F, H>(
    cancel: CancelToken,
    store: &'static ScratchStore,
    trigger: F,
    on_handled: H,
) -> OfflineResult<thread::JoinHandle<()>>
where
    F: Future<Output = io::Result<()>> + Send + 'static,
    H: FnOnce(usize) + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| OfflineError::InvalidConfig(format!("Signal runtime: {}", e)))?;

    thread::Builder::new()
        .name("lb-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = trigger.await {
                    log::error!("Failed to listen for interrupt signal: {}", e);
                    return;
                }
                on_handled(handle_interrupt(&cancel, store));
            });
        })
        .map_err(OfflineError::Io)
}

#[cfg(unix)]
pub(crate) async fn wait_for_interrupt() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_interrupt() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
