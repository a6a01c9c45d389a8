//! In-process notification scheduler.
//!
//! Each scheduled notification is a tokio task sleeping until its fire time.
//! Fired notifications are logged and published on a broadcast channel that
//! the REST backend streams to clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use asis_core::clock::Clock;

use super::{Notification, NotificationScheduler};
use crate::error::ServiceError;

const CHANNEL_CAPACITY: usize = 64;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    pending: HashMap<String, Pending>,
}

pub struct LocalNotificationScheduler {
    registry: Arc<Mutex<Registry>>,
    sender: broadcast::Sender<Notification>,
    clock: Arc<dyn Clock>,
    shutdown: Arc<Notify>,
    enabled: bool,
}

impl LocalNotificationScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            sender,
            clock,
            shutdown: Arc::new(Notify::new()),
            enabled: true,
        }
    }

    /// A disabled scheduler refuses every notification.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Receive every notification fired from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Handle for subscribing later without holding the scheduler.
    pub fn sender(&self) -> broadcast::Sender<Notification> {
        self.sender.clone()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop every pending notification without firing it.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        let mut registry = self.lock();
        for (_, pending) in registry.pending.drain() {
            pending.handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl NotificationScheduler for LocalNotificationScheduler {
    async fn schedule_at(&self, notification: Notification) -> Result<(), ServiceError> {
        if !self.enabled {
            return Err(ServiceError::NotConfigured("local notifications"));
        }
        let delay = (notification.at - self.clock.now())
            .to_std()
            .map_err(|_| {
                ServiceError::InvalidInput(format!(
                    "notification {} is scheduled in the past",
                    notification.id
                ))
            })?;

        let id = notification.id.clone();
        let registry = Arc::clone(&self.registry);
        let sender = self.sender.clone();
        let shutdown = Arc::clone(&self.shutdown);

        let mut guard = self.lock();
        guard.next_generation += 1;
        let generation = guard.next_generation;

        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    info!(id = %notification.id, title = %notification.title, "Notification fired");
                    // No receivers is fine; the log line above is the fallback.
                    let _ = sender.send(notification);
                    let mut registry = registry.lock().unwrap_or_else(|p| p.into_inner());
                    if registry
                        .pending
                        .get(&task_id)
                        .is_some_and(|p| p.generation == generation)
                    {
                        registry.pending.remove(&task_id);
                    }
                }
                _ = shutdown.notified() => {}
            }
        });

        if let Some(previous) = guard.pending.insert(id.clone(), Pending { generation, handle }) {
            previous.handle.abort();
            debug!(id = %id, "Replaced pending notification");
        }
        debug!(id = %id, delay_secs = delay.as_secs(), "Notification scheduled");
        Ok(())
    }

    async fn cancel(&self, id: &str) -> Result<bool, ServiceError> {
        match self.lock().pending.remove(id) {
            Some(pending) => {
                pending.handle.abort();
                debug!(id, "Notification cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for LocalNotificationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
