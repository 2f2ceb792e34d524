//! Fan-out of decoded events to registered handlers

use crate::event::EslEvent;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Handle returned by handler registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Per-session event fan-out.
///
/// Each handler owns a bounded queue drained by its own task, so a slow or
/// panicking handler never stalls the reader or the other handlers. When a
/// queue is full the event is dropped for that handler only.
pub(crate) struct EventDispatcher {
    handlers: RwLock<HashMap<HandlerId, mpsc::Sender<Arc<EslEvent>>>>,
    next_id: AtomicU64,
    queue_size: usize,
    dropped: AtomicU64,
}

impl EventDispatcher {
    pub(crate) fn new(queue_size: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn read_handlers(&self) -> RwLockReadGuard<'_, HashMap<HandlerId, mpsc::Sender<Arc<EslEvent>>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<HandlerId, mpsc::Sender<Arc<EslEvent>>>> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn add_queue(&self) -> (HandlerId, mpsc::Receiver<Arc<EslEvent>>) {
        let id = HandlerId(
            self.next_id
                .fetch_add(1, Ordering::Relaxed),
        );
        let (tx, rx) = mpsc::channel(self.queue_size);
        self.write_handlers()
            .insert(id, tx);
        (id, rx)
    }

    /// Spawn a task that runs `handler` for every event, in arrival order.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn register<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(Arc<EslEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (id, mut rx) = self.add_queue();
        tokio::spawn(async move {
            while let Some(event) = rx
                .recv()
                .await
            {
                // The handler is invoked inside the guarded future so that a
                // panic before its first await is caught too.
                let run = AssertUnwindSafe(async { handler(event).await });
                if run
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(handler = %id, "Event handler panicked, continuing with next event");
                }
            }
            debug!(handler = %id, "Event handler task finished");
        });
        debug!(handler = %id, "Registered event handler");
        id
    }

    /// Register a queue whose receiving end is handed to the caller.
    pub(crate) fn stream(&self) -> EslEventStream {
        let (id, rx) = self.add_queue();
        debug!(handler = %id, "Registered event stream");
        EslEventStream { id, rx }
    }

    /// Remove a handler. Events already queued for it are still delivered.
    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        self.write_handlers()
            .remove(&id)
            .is_some()
    }

    /// Drop every queue. Handler tasks exit once their queued events are
    /// delivered, releasing whatever the handlers captured; streams yield `None`.
    pub(crate) fn close(&self) {
        let removed = std::mem::take(&mut *self.write_handlers());
        debug!("Closed {} event handler queue(s)", removed.len());
    }

    /// Offer `event` to every handler without blocking.
    pub(crate) fn dispatch(&self, event: EslEvent) {
        let event = Arc::new(event);
        let mut closed = Vec::new();
        for (id, tx) in self
            .read_handlers()
            .iter()
        {
            match tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(handler = %id, "Event queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        if !closed.is_empty() {
            let mut handlers = self.write_handlers();
            for id in closed {
                debug!(handler = %id, "Event receiver gone, removing");
                handlers.remove(&id);
            }
        }
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.read_handlers()
            .len()
    }

    /// Events dropped across all handlers because a queue was full.
    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped
            .load(Ordering::Relaxed)
    }
}

/// Pull-style event subscription, fed like any registered handler.
///
/// Yields `None` once the client is closed. Dropping the stream
/// unregisters it on the next dispatched event.
pub struct EslEventStream {
    id: HandlerId,
    rx: mpsc::Receiver<Arc<EslEvent>>,
}

impl fmt::Debug for EslEventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslEventStream")
            .field("id", &self.id)
            .finish()
    }
}

impl EslEventStream {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Receive the next event, or `None` once the client is closed.
    pub async fn recv(&mut self) -> Option<Arc<EslEvent>> {
        self.rx
            .recv()
            .await
    }
}

impl futures_util::Stream for EslEventStream {
    type Item = Arc<EslEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
