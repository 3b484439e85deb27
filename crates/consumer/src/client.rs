// SPDX-License-Identifier: Apache-2.0

//! Client Lifecycle: tracks every live multi-topic consumer spawned from a shared client and
//! coordinates `close_all` (quiesce every consumer, then release shared resources).

use crate::consumer::MultiTopicConsumer;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Tracks every consumer spawned from one client, so `close_all` can quiesce them together.
///
/// Grounded on the same "registry of live handles, close fans out to each" shape used for
/// connection-pool shutdown: a consumer registers itself on construction and deregisters on
/// `dispose`, via [`ClientRegistry::register`]/[`ClientRegistry::deregister`].
pub struct ClientRegistry {
    next_id: Mutex<u64>,
    consumers: Mutex<HashMap<u64, Arc<MultiTopicConsumer>>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(0),
            consumers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a freshly constructed consumer, returning the id to later pass to
    /// [`ClientRegistry::deregister`].
    #[must_use]
    pub fn register(&self, consumer: Arc<MultiTopicConsumer>) -> u64 {
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(|poison| poison.into_inner());
            let id = *next_id;
            *next_id += 1;
            id
        };
        let mut consumers = self
            .consumers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let _ = consumers.insert(id, consumer);
        id
    }

    /// Deregisters a consumer that has finished its own teardown.
    pub fn deregister(&self, id: u64) {
        let mut consumers = self
            .consumers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let _ = consumers.remove(&id);
    }

    /// Number of consumers currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.lock().unwrap_or_else(|poison| poison.into_inner()).len()
    }

    /// `true` when no consumer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every currently registered consumer concurrently, in `close()` (best-effort)
    /// rather than `unsubscribe()` semantics. Individual failures are logged, never
    /// propagated: a client shutdown should not be blocked by one misbehaving consumer.
    pub async fn close_all(&self) {
        let snapshot: Vec<Arc<MultiTopicConsumer>> = {
            let consumers = self
                .consumers
                .lock()
                .unwrap_or_else(|poison| poison.into_inner());
            consumers.values().cloned().collect()
        };
        debug!(count = snapshot.len(), "closing all registered consumers");
        let mut handles = Vec::with_capacity(snapshot.len());
        for consumer in snapshot {
            handles.push(tokio::spawn(async move { consumer.close().await }));
        }
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "close_all: a consumer failed to close"),
                Err(err) => warn!(error = %err, "close_all: a consumer's close task panicked"),
            }
        }
    }
}

/// Closes every consumer in `registry`, returning once all have completed (or failed)
/// teardown.
pub async fn close_all(registry: &ClientRegistry) -> Result<()> {
    registry.close_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn register_and_deregister_round_trips() {
        // `MultiTopicConsumer` construction requires a running actor, so unit coverage here is
        // limited to the id bookkeeping exercised directly against the map; end-to-end
        // close_all behavior is covered in the integration scenarios.
        let registry = ClientRegistry::new();
        assert_eq!(registry.len(), 0);
        {
            let mut next_id = registry.next_id.lock().unwrap();
            assert_eq!(*next_id, 0);
            *next_id = 5;
        }
        assert_eq!(*registry.next_id.lock().unwrap(), 5);
    }
}
