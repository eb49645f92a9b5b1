use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// A completion signal that fires at most once and never re-arms.
///
/// Any number of tasks may wait on it; firing an already fired latch is a no-op.
#[derive(Debug)]
pub struct Latch {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
    // Kept so that `send` always has a receiver
    rx: watch::Receiver<bool>,
}

impl Default for Latch {
    fn default() -> Self {
        let (tx, rx) = watch::channel(false);
        Latch { fired: AtomicBool::new(false), tx, rx }
    }
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the latch. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self.fired.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }
        let _ = self.tx.send(true);
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the latch has fired (immediately if it already has).
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
