//! Message dispatch to registered topic-filter callbacks.

use mqtt_duplex_protocol::{Message, Result, TopicTrie};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;
pub type CallbackId = u64;

#[derive(Clone)]
struct CallbackEntry {
    id: CallbackId,
    callback: MessageCallback,
}

/// Routes delivered messages to callbacks by topic filter, wildcards
/// included. Callbacks run on spawned tasks, so a slow handler never
/// stalls the read loop.
pub struct CallbackManager {
    trie: RwLock<TopicTrie<CallbackEntry>>,
    next_id: AtomicU64,
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            trie: RwLock::new(TopicTrie::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a raw message callback. The filter is validated like
    /// any subscription filter.
    pub fn register(
        &self,
        filter: impl Into<String>,
        callback: MessageCallback,
    ) -> Result<CallbackId> {
        let filter = filter.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.trie
            .write()
            .insert(&filter, CallbackEntry { id, callback })?;
        Ok(id)
    }

    /// Registers a callback that receives the payload as UTF-8 text.
    /// Non-UTF-8 payloads are dropped with a warning.
    pub fn register_string<F>(&self, filter: impl Into<String>, handler: F) -> Result<CallbackId>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.register(
            filter,
            Arc::new(move |message: Message| match String::from_utf8(message.payload) {
                Ok(text) => handler(text),
                Err(_) => {
                    tracing::warn!(topic = %message.topic, "payload is not valid UTF-8");
                }
            }),
        )
    }

    /// Registers a callback that deserializes the payload as JSON.
    /// Payloads that fail to parse are dropped with a warning.
    pub fn register_json<T, F>(&self, filter: impl Into<String>, handler: F) -> Result<CallbackId>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.register(
            filter,
            Arc::new(
                move |message: Message| match serde_json::from_slice::<T>(&message.payload) {
                    Ok(value) => handler(value),
                    Err(e) => {
                        tracing::warn!(topic = %message.topic, error = %e, "JSON payload failed to parse");
                    }
                },
            ),
        )
    }

    /// Removes every callback registered under `filter`. Returns how
    /// many were removed.
    pub fn unregister(&self, filter: &str) -> usize {
        self.trie.write().remove(filter, |_| true)
    }

    /// Removes one callback by its id.
    pub fn unregister_id(&self, filter: &str, id: CallbackId) -> bool {
        self.trie.write().remove(filter, |entry| entry.id == id) > 0
    }

    /// Fans a delivered message out to every matching callback.
    pub fn dispatch(&self, message: &Message) {
        let callbacks: Vec<MessageCallback> = {
            let trie = self.trie.read();
            trie.matches(&message.topic)
                .into_iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };

        if callbacks.is_empty() {
            tracing::debug!(topic = %message.topic, "no callback registered for delivered message");
            return;
        }

        for callback in callbacks {
            let message = message.clone();
            tokio::spawn(async move {
                callback(message);
            });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }

    pub fn clear(&self) {
        *self.trie.write() = TopicTrie::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::AtomicU32;

    fn counting_callback(counter: &Arc<AtomicU32>) -> MessageCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn settle() {
        // Dispatch spawns; give the spawned tasks a chance to run.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_exact_and_wildcard_dispatch() {
        let manager = CallbackManager::new();
        let exact = Arc::new(AtomicU32::new(0));
        let wildcard = Arc::new(AtomicU32::new(0));

        manager
            .register("metrics/cpu", counting_callback(&exact))
            .unwrap();
        manager
            .register("metrics/#", counting_callback(&wildcard))
            .unwrap();

        manager.dispatch(&Message::new("metrics/cpu", vec![1]));
        settle().await;
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.load(Ordering::SeqCst), 1);

        manager.dispatch(&Message::new("metrics/mem", vec![2]));
        settle().await;
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unregister_stops_dispatch() {
        let manager = CallbackManager::new();
        let counter = Arc::new(AtomicU32::new(0));
        manager
            .register("a/b", counting_callback(&counter))
            .unwrap();

        manager.dispatch(&Message::new("a/b", vec![]));
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(manager.unregister("a/b"), 1);
        manager.dispatch(&Message::new("a/b", vec![]));
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_by_id_leaves_others() {
        let manager = CallbackManager::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let first_id = manager
            .register("a/+", counting_callback(&first))
            .unwrap();
        manager.register("a/+", counting_callback(&second)).unwrap();

        assert!(manager.unregister_id("a/+", first_id));
        manager.dispatch(&Message::new("a/x", vec![]));
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_json_callback() {
        #[derive(Deserialize)]
        struct Reading {
            value: u32,
        }

        let manager = CallbackManager::new();
        let total = Arc::new(AtomicU32::new(0));
        let total_clone = Arc::clone(&total);
        manager
            .register_json::<Reading, _>("sensors/+", move |reading| {
                total_clone.fetch_add(reading.value, Ordering::SeqCst);
            })
            .unwrap();

        manager.dispatch(&Message::new("sensors/temp", br#"{"value": 21}"#.to_vec()));
        manager.dispatch(&Message::new("sensors/temp", b"not json".to_vec()));
        settle().await;
        assert_eq!(total.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let manager = CallbackManager::new();
        assert!(manager.register("bad/#/filter", Arc::new(|_| {})).is_err());
        assert!(manager.is_empty());
    }
}
