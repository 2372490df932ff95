//! Event handler registry and dispatch

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::{constants::WILDCARD_EVENT, packet::Packet};

/// Everything a handler gets to see about one event.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    /// Event name, lower-cased.
    pub event: &'a str,
    /// All fields of the event packet.
    pub packet: &'a Packet,
    /// Manager host the event came from.
    pub server: &'a str,
    /// Manager port the event came from.
    pub port: u16,
}

/// Callback invoked for a dispatched event.
///
/// Implemented for any `Fn(&EventContext) -> Value`; return `Value::Null`
/// when there is nothing to report.
pub trait EventHandler: Send + Sync {
    /// Handle one event. Runs inline on the task awaiting a response.
    fn handle(&self, ctx: &EventContext<'_>) -> Value;
}

impl<F> EventHandler for F
where
    F: Fn(&EventContext<'_>) -> Value + Send + Sync,
{
    fn handle(&self, ctx: &EventContext<'_>) -> Value {
        self(ctx)
    }
}

/// Registry mapping lower-cased event names (or `*`) to a single handler.
///
/// One router belongs to one client; pass it in at construction so
/// connections keep independent registries.
#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .read_handlers()
            .keys()
            .cloned()
            .collect();
        keys.sort();
        f.debug_struct("EventRouter")
            .field("events", &keys)
            .finish()
    }
}

impl EventRouter {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_handlers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn EventHandler>>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_handlers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn EventHandler>>> {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a closure for `event` (case-insensitive), or `*` for the fallback.
    ///
    /// Returns `false` and keeps the existing handler if one is already registered.
    ///
    /// ```
    /// use asterisk_ami_tokio::EventRouter;
    /// use serde_json::Value;
    ///
    /// let router = EventRouter::new();
    /// assert!(router.register("Hangup", |ctx| {
    ///     println!("{} hung up", ctx.packet.get("Channel").unwrap_or("?"));
    ///     Value::Null
    /// }));
    /// assert!(!router.register("hangup", |_| Value::Null));
    /// ```
    pub fn register<F>(&self, event: &str, handler: F) -> bool
    where
        F: Fn(&EventContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.register_handler(event, Arc::new(handler))
    }

    /// Register a shared [`EventHandler`] implementation. Same rules as [`register`](Self::register).
    pub fn register_handler(&self, event: &str, handler: Arc<dyn EventHandler>) -> bool {
        let key = event.to_lowercase();
        let mut handlers = self.write_handlers();
        if handlers.contains_key(&key) {
            warn!("{} handler is already defined, not over-writing", key);
            return false;
        }
        debug!("Registered handler for event '{}'", key);
        handlers.insert(key, handler);
        true
    }

    /// Remove the handler for `event`. Returns `true` if one was removed.
    pub fn unregister(&self, event: &str) -> bool {
        self.write_handlers()
            .remove(&event.to_lowercase())
            .is_some()
    }

    /// `true` if a handler is registered for exactly this name (case-insensitive).
    pub fn contains(&self, event: &str) -> bool {
        self.read_handlers()
            .contains_key(&event.to_lowercase())
    }

    /// Number of registered handlers, wildcard included.
    pub fn len(&self) -> usize {
        self.read_handlers()
            .len()
    }

    /// `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.read_handlers()
            .is_empty()
    }

    /// Route an event packet to its handler and return the handler's result.
    ///
    /// Exact name matches win over the wildcard. A missing handler, or a
    /// packet without an `Event` field, is logged and yields `None`.
    pub fn dispatch(&self, packet: &Packet, server: &str, port: u16) -> Option<Value> {
        let Some(name) = packet.event() else {
            warn!("Dispatch called on a packet without an Event field");
            return None;
        };
        let event = name.to_lowercase();
        debug!("Got event: {}", event);

        // Clone the handler out so it can register/unregister without deadlocking.
        let handler = {
            let handlers = self.read_handlers();
            handlers
                .get(&event)
                .or_else(|| handlers.get(WILDCARD_EVENT))
                .cloned()
        };

        match handler {
            Some(handler) => {
                debug!("Execute handler for event: {}", event);
                let ctx = EventContext {
                    event: &event,
                    packet,
                    server,
                    port,
                };
                Some(handler.handle(&ctx))
            }
            None => {
                debug!("No event handler for event: {}", event);
                None
            }
        }
    }
}
