// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("queue wait timed out")]
pub struct QueueTimedOut;

struct Inner<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

/// The FIFO channel backing a run's event stream.
///
/// Puts never block; gets wait until an item arrives or the queue is
/// closed and drained. Clones share the same queue, so a producer task and
/// a consuming handle can each hold one end.
pub struct EventQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner { tx, rx: Mutex::new(rx) }),
        }
    }

    /// Enqueue an item. A no-op after `close`.
    pub fn put(&self, item: T) {
        let _ = self.inner.tx.send(item);
    }

    /// Wait for the next item; `None` once the queue is closed and empty.
    pub async fn get(&self) -> Option<T> {
        self.inner.rx.lock().await.recv().await
    }

    /// Like `get`, but gives up after `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueTimedOut> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| QueueTimedOut)
    }

    /// Non-blocking read; `None` when nothing is queued right now.
    pub fn try_get(&self) -> Option<T> {
        self.inner.rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        match self.inner.rx.try_lock() {
            Ok(rx) => rx.is_empty(),
            // A concurrent reader holds the lock; treat as busy, not empty.
            Err(_) => false,
        }
    }

    /// Close the queue. Pending items remain readable; `get` returns
    /// `None` once they are drained.
    pub async fn close(&self) {
        self.inner.rx.lock().await.close();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
