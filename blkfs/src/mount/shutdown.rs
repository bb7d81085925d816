// SPDX-License-Identifier: MIT

//! One-shot shutdown wake-up shared between the signal handler, the bridge
//! and the lifecycle controller.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, SyncSender, sync_channel},
};

use crate::core::errors::*;

#[derive(Debug)]
struct Inner {
    fired: AtomicBool,
    tx: SyncSender<()>,
    rx: Mutex<Receiver<()>>,
}

/// Cloneable one-shot signal. Only the first [`ShutdownSignal::trigger`] counts.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = sync_channel(1);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                tx,
                rx: Mutex::new(rx),
            }),
        }
    }

    /// Routes SIGINT and SIGTERM to [`Self::trigger`]. Callable once per process.
    pub fn install(&self) -> FsResult {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            if signal.trigger() {
                tracing::info!("termination signal received");
            } else {
                tracing::debug!("termination signal ignored, shutdown already under way");
            }
        })?;
        Ok(())
    }

    /// Fires the signal. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Capacity 1 and a single sender call: this never blocks.
        let _ = self.inner.tx.try_send(());
        true
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Blocks until the signal fires. Returns immediately once it has.
    pub fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        let rx = self.inner.rx.lock();
        if self.is_triggered() {
            return;
        }
        // The sender lives in `inner`, so the channel never disconnects here.
        let _ = rx.recv();
    }
}
