// src/monitor/shutdown.rs

//! Broadcast-once cancellation signal shared by all rule loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Cloneable handle; the first `request` wins, later ones are no-ops.
///
/// Loops should both subscribe (to wake from interval sleeps) and check
/// `is_requested` (a receiver created after the broadcast would miss it).
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown; broadcast exactly once.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_wakes_subscribers() {
        let handle = ShutdownHandle::new();
        let mut rx = handle.subscribe();

        let remote = handle.clone();
        tokio::spawn(async move {
            remote.request();
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_requested());
    }

    #[test]
    fn repeated_requests_are_idempotent() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());
        handle.request();
        handle.request();
        assert!(handle.is_requested());
    }
}
