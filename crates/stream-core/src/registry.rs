//! Subscription bookkeeping.
//!
//! The registry tracks which subscription strings have been sent to the
//! server and which listeners wait for events. It performs no I/O; the
//! [`Stream`](crate::Stream) decides when a newly tracked string must be sent.

use dashmap::DashMap;
use iotstream_protocol::path;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::handler::{ChannelHandler, SignalHandler, SignalKind, StreamModel};

/// Identifier of a registered channel handler.
pub type HandlerId = u64;

/// Subscription strings in first-registration order.
#[derive(Debug, Default)]
struct Tracked {
    order: Vec<String>,
    seen: HashSet<String>,
}

#[derive(Clone)]
struct ChannelEntry {
    id: HandlerId,
    handler: Arc<dyn ChannelHandler>,
}

/// Registry of subscriptions and listeners.
#[derive(Default)]
pub struct SubscriptionRegistry {
    tracked: Mutex<Tracked>,
    /// Models keyed by their routing key.
    models: DashMap<String, Vec<Arc<dyn StreamModel>>>,
    /// Models whose path was empty when they registered.
    unresolved: Mutex<Vec<Arc<dyn StreamModel>>>,
    channels: DashMap<String, Vec<ChannelEntry>>,
    signals: DashMap<SignalKind, Vec<Arc<dyn SignalHandler>>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a subscription string.
    ///
    /// Returns `true` the first time a string is seen, meaning it still has
    /// to be sent to the server.
    pub fn track(&self, subscription: &str) -> bool {
        let mut tracked = lock(&self.tracked);
        if tracked.seen.contains(subscription) {
            trace!(subscription = %subscription, "Already subscribed");
            return false;
        }
        tracked.seen.insert(subscription.to_string());
        tracked.order.push(subscription.to_string());
        true
    }

    /// All tracked subscription strings, in first-registration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.tracked).order.clone()
    }

    /// Register a model listener.
    ///
    /// Returns the model's path when it could be keyed, or `None` when the
    /// path is still empty and the model was parked as unresolved.
    pub fn add_model(&self, model: Arc<dyn StreamModel>) -> Option<String> {
        let model_path = model.path();
        match path::model_key(&model_path) {
            Some(key) => {
                debug!(path = %model_path, key = %key, "Model registered");
                self.models.entry(key).or_default().push(model);
                Some(model_path)
            }
            None => {
                debug!("Model has no path yet, deferring");
                lock(&self.unresolved).push(model);
                None
            }
        }
    }

    /// Key every parked model whose path is now known.
    ///
    /// Returns the paths of the models that were resolved.
    pub fn resolve_pending(&self) -> Vec<String> {
        let mut unresolved = lock(&self.unresolved);
        let mut resolved = Vec::new();

        unresolved.retain(|model| {
            let model_path = model.path();
            match path::model_key(&model_path) {
                Some(key) => {
                    debug!(path = %model_path, key = %key, "Deferred model resolved");
                    self.models.entry(key).or_default().push(model.clone());
                    resolved.push(model_path);
                    false
                }
                None => true,
            }
        });

        resolved
    }

    /// Models registered under any of `keys`.
    #[must_use]
    pub fn models_for(&self, keys: &[String]) -> Vec<Arc<dyn StreamModel>> {
        keys.iter()
            .filter_map(|key| self.models.get(key))
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Register a channel handler under a normalized channel name.
    pub fn add_channel(&self, channel: &str, handler: Arc<dyn ChannelHandler>) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(ChannelEntry { id, handler });
        debug!(channel = %channel, handler = id, "Channel handler registered");
        id
    }

    /// Handlers registered on a channel, in registration order.
    #[must_use]
    pub fn channel_handlers(&self, channel: &str) -> Vec<(HandlerId, Arc<dyn ChannelHandler>)> {
        self.channels
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| (e.id, e.handler.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a channel handler. Returns `true` if it was registered.
    pub fn remove_channel_handler(&self, channel: &str, id: HandlerId) -> bool {
        let Some(mut entries) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if removed {
            debug!(channel = %channel, handler = id, "Channel handler removed");
        }
        removed
    }

    /// Register a signal handler.
    pub fn add_signal(&self, kind: SignalKind, handler: Arc<dyn SignalHandler>) {
        self.signals.entry(kind).or_default().push(handler);
    }

    /// Handlers registered for a signal kind.
    #[must_use]
    pub fn signal_handlers(&self, kind: SignalKind) -> Vec<Arc<dyn SignalHandler>> {
        self.signals
            .get(&kind)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            subscriptions: lock(&self.tracked).order.len(),
            models: self.models.iter().map(|e| e.len()).sum(),
            unresolved_models: lock(&self.unresolved).len(),
            channel_handlers: self.channels.iter().map(|e| e.len()).sum(),
            signal_handlers: self.signals.iter().map(|e| e.len()).sum(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of tracked subscription strings.
    pub subscriptions: usize,
    /// Number of keyed model listeners.
    pub models: usize,
    /// Number of models still waiting for a path.
    pub unresolved_models: usize,
    /// Number of channel handlers.
    pub channel_handlers: usize,
    /// Number of signal handlers.
    pub signal_handlers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{channel_fn, HandlerOutcome, Signal};
    use crate::testing::RecordingModel;

    const STATE: &str =
        "/value/6c06b63e-5e3a-4b9d-9c8b-2a1f1d7e3c11/state/cda4d978-39e9-47bf-8497-9813b0f94973";

    #[test]
    fn test_track_deduplicates() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.track("/network"));
        assert!(!registry.track("/network"));
        assert!(registry.track("/device"));
        assert_eq!(registry.subscriptions(), vec!["/network", "/device"]);
    }

    #[test]
    fn test_models_keyed_by_path() {
        let registry = SubscriptionRegistry::new();
        let a = RecordingModel::new(STATE);
        let b = RecordingModel::new(STATE);

        assert_eq!(registry.add_model(a), Some(STATE.to_string()));
        assert_eq!(registry.add_model(b), Some(STATE.to_string()));

        let keys = path::routing_keys(STATE);
        assert_eq!(registry.models_for(&keys).len(), 2);
        assert!(registry
            .models_for(&["state/other".to_string()])
            .is_empty());
    }

    #[test]
    fn test_unresolved_models() {
        let registry = SubscriptionRegistry::new();
        let model = RecordingModel::new("");

        assert_eq!(registry.add_model(model.clone()), None);
        assert_eq!(registry.stats().unresolved_models, 1);
        assert!(registry.resolve_pending().is_empty());

        model.set_path(STATE);
        assert_eq!(registry.resolve_pending(), vec![STATE.to_string()]);
        assert_eq!(registry.stats().unresolved_models, 0);
        assert_eq!(registry.models_for(&path::routing_keys(STATE)).len(), 1);
    }

    #[test]
    fn test_channel_handlers() {
        let registry = SubscriptionRegistry::new();
        let handler = channel_fn(|_| async { HandlerOutcome::Continue });

        let first = registry.add_channel("/extsync", handler.clone());
        let second = registry.add_channel("/extsync", handler);
        assert_ne!(first, second);
        assert_eq!(registry.channel_handlers("/extsync").len(), 2);

        assert!(registry.remove_channel_handler("/extsync", first));
        assert!(!registry.remove_channel_handler("/extsync", first));
        assert!(!registry.remove_channel_handler("/unknown", second));

        let remaining = registry.channel_handlers("/extsync");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, second);
    }

    #[test]
    fn test_signal_handlers() {
        let registry = SubscriptionRegistry::new();
        registry.add_signal(SignalKind::Close, Arc::new(|_: &Signal| {}));

        assert_eq!(registry.signal_handlers(SignalKind::Close).len(), 1);
        assert!(registry.signal_handlers(SignalKind::Error).is_empty());
        assert_eq!(registry.stats().signal_handlers, 1);
    }
}
