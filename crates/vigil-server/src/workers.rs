// crates/vigil-server/src/workers.rs
// ============================================================================
// Module: Worker Harness
// Description: Interval-driven background loops with shutdown fan-out.
// Purpose: Give every long-running loop the same start/stop shape.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Every background loop is a tokio task driven by an interval and a shared
//! shutdown signal. A worker finishes its current unit before exiting, and a
//! panic inside one tick is caught by the harness so the loop survives and
//! the next tick runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Shutdown Signal
// ============================================================================

/// Root shutdown signal fanned out to every worker.
#[derive(Clone)]
pub struct Shutdown {
    /// Receiver observed by workers.
    receiver: watch::Receiver<bool>,
}

/// The sending half held by the process entrypoint.
pub struct ShutdownHandle {
    /// Sender flipping the signal.
    sender: watch::Sender<bool>,
}

/// Creates a shutdown signal pair.
#[must_use]
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownHandle {
            sender,
        },
        Shutdown {
            receiver,
        },
    )
}

impl ShutdownHandle {
    /// Signals every worker to stop after its current unit.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

impl Shutdown {
    /// Returns true once shutdown has been signaled.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until shutdown is signaled.
    pub async fn triggered(&mut self) {
        // An error means the sender dropped, which also means shut down.
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// SECTION: Worker Loop
// ============================================================================

/// Spawns an interval-driven worker observing the shutdown signal.
///
/// The tick closure runs to completion even when shutdown triggers midway;
/// the loop then exits before the next tick.
pub fn spawn_worker<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: Shutdown,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(worker = name, "worker started");
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // Isolate tick panics so one bad cycle cannot kill the loop.
                    let unit = tokio::spawn(tick());
                    if let Err(err) = unit.await {
                        tracing::error!(worker = name, error = %err, "worker tick panicked");
                    }
                    if shutdown.is_triggered() {
                        break;
                    }
                }
                () = shutdown.triggered() => break,
            }
        }
        tracing::debug!(worker = name, "worker stopped");
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn worker_ticks_until_shutdown() {
        let (handle, shutdown) = shutdown_channel();
        let ticks = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&ticks);
        let worker = spawn_worker("test", Duration::from_millis(5), shutdown, move || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.trigger();
        worker.await.unwrap();
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn panicking_tick_does_not_kill_the_worker() {
        let (handle, shutdown) = shutdown_channel();
        let ticks = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&ticks);
        let worker = spawn_worker("test", Duration::from_millis(5), shutdown, move || {
            let seen = Arc::clone(&seen);
            async move {
                let count = seen.fetch_add(1, Ordering::SeqCst);
                assert!(count != 0, "first tick fails on purpose");
            }
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.trigger();
        worker.await.unwrap();
        assert!(ticks.load(Ordering::SeqCst) >= 2, "loop survived the panicking tick");
    }
}
