//! Notification Dispatcher
//!
//! Single-consumer queue plus worker thread that delivers [`ScreenEvent`]s
//! to registered listeners in enqueue order.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::{ScreenEvent, ScreenEventListener};

type ListenerList = Arc<RwLock<Vec<Arc<dyn ScreenEventListener>>>>;

/// Commands consumed by the dispatcher thread
enum DispatchCommand {
    /// Deliver an event to every listener
    Deliver(ScreenEvent),

    /// Acknowledge once everything queued before this has been delivered
    Flush(Sender<()>),

    /// Stop the worker
    Shutdown,
}

/// Ordered, asynchronous event fan-out
pub struct NotificationDispatcher {
    /// Queue into the worker
    tx: Sender<DispatchCommand>,

    /// Registered listeners
    listeners: ListenerList,

    /// Worker thread handle
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Spawn the dispatcher thread
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));

        let worker_listeners = Arc::clone(&listeners);
        let handle = std::thread::Builder::new()
            .name("screen-notify".to_string())
            .spawn(move || run_worker(rx, worker_listeners))
            .map_err(|e| warn!("Failed to spawn notification thread: {}", e))
            .ok();

        Self {
            tx,
            listeners,
            worker: Mutex::new(handle),
        }
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ScreenEventListener>) {
        let mut listeners = self.listeners.write();
        listeners.push(listener);
        debug!("Registered screen event listener ({} total)", listeners.len());
    }

    /// Register an async subscriber and return its receiving end
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ScreenEvent> {
        let (listener, rx) = ChannelListener::new();
        self.add_listener(Arc::new(listener));
        rx
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Queue an event
    pub fn publish(&self, event: ScreenEvent) {
        trace!("Queue {}", event.name());
        if self.tx.send(DispatchCommand::Deliver(event)).is_err() {
            warn!("Notification queue closed, dropping event");
        }
    }

    /// Queue a batch, preserving order
    pub fn publish_all(&self, events: impl IntoIterator<Item = ScreenEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Block until every event queued so far has been delivered
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(DispatchCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Stop the worker after draining the queue
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.tx.send(DispatchCommand::Shutdown);
        if handle.join().is_err() {
            warn!("Notification thread panicked");
        }
        info!("Notification dispatcher stopped");
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(rx: Receiver<DispatchCommand>, listeners: ListenerList) {
    debug!("Notification thread started");
    while let Ok(command) = rx.recv() {
        match command {
            DispatchCommand::Deliver(event) => {
                // Clone the list so listeners may register further listeners.
                let snapshot: Vec<_> = listeners.read().iter().cloned().collect();
                for listener in snapshot {
                    // A failing listener must not stop delivery to the others.
                    if panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
                        error!("Screen event listener panicked on {}", event.name());
                    }
                }
            }
            DispatchCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            DispatchCommand::Shutdown => break,
        }
    }
    debug!("Notification thread exiting");
}

/// Listener that forwards events into a tokio channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ScreenEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScreenEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ScreenEventListener for ChannelListener {
    fn on_event(&self, event: &ScreenEvent) {
        // Receiver dropped: subscriber went away, nothing to do.
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{GroupChangeKind, ScreenEvent};

    #[test]
    fn test_events_delivered_in_order() {
        let dispatcher = NotificationDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.add_listener(Arc::new(move |event: &ScreenEvent| {
            sink.lock().push(event.clone());
        }));

        dispatcher.publish_all(vec![
            ScreenEvent::DisplayDestroyed(1001),
            ScreenEvent::GroupChanged {
                kind: GroupChangeKind::Remove,
                screens: vec![],
            },
            ScreenEvent::ScreenDisconnected(1001),
        ]);
        dispatcher.flush();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], ScreenEvent::DisplayDestroyed(1001));
        assert_eq!(seen[2], ScreenEvent::ScreenDisconnected(1001));
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let dispatcher = NotificationDispatcher::new();
        dispatcher.add_listener(Arc::new(|event: &ScreenEvent| {
            panic!("listener failed on {}", event.name());
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.add_listener(Arc::new(move |event: &ScreenEvent| {
            sink.lock().push(event.clone());
        }));

        dispatcher.publish_all(vec![
            ScreenEvent::DisplayDestroyed(1001),
            ScreenEvent::ScreenDisconnected(1001),
            ScreenEvent::DisplayDestroyed(1002),
        ]);
        dispatcher.flush();

        assert_eq!(seen.lock().len(), 3);
        assert_eq!(dispatcher.listener_count(), 2);
    }

    #[test]
    fn test_flush_without_listeners_returns() {
        let dispatcher = NotificationDispatcher::new();
        dispatcher.publish(ScreenEvent::DisplayDestroyed(1000));
        dispatcher.flush();
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dispatcher = NotificationDispatcher::new();
        dispatcher.shutdown();
        dispatcher.shutdown();
        // publishing after shutdown only logs
        dispatcher.publish(ScreenEvent::DisplayDestroyed(1000));
    }

    #[tokio::test]
    async fn test_subscribe_bridges_to_async() {
        let dispatcher = NotificationDispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.publish(ScreenEvent::ScreenDisconnected(1002));

        let event = rx.recv().await.expect("event forwarded");
        assert_eq!(event, ScreenEvent::ScreenDisconnected(1002));
    }
}
