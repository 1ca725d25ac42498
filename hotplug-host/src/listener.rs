//! Per-plugin event listener collection

use crate::error::HandlerError;
use crate::registry::Handler;
use std::collections::HashMap;
use std::fmt;

/// A handler registered for one event
#[derive(Clone)]
pub struct EventListener {
    /// Id of the owning plugin
    pub plugin: String,

    /// Callback invoked on dispatch
    pub callback: Handler,

    /// Higher numbers run later
    pub priority: i32,

    /// Export name the callback was bound from, for default listeners
    pub handler_name: Option<String>,
}

impl EventListener {
    pub fn new(plugin: impl Into<String>, callback: Handler, priority: i32) -> Self {
        Self {
            plugin: plugin.into(),
            callback,
            priority,
            handler_name: None,
        }
    }

    pub fn with_handler_name(mut self, name: impl Into<String>) -> Self {
        self.handler_name = Some(name.into());
        self
    }

    pub fn execute(&self) -> Result<(), HandlerError> {
        (self.callback)()
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("plugin", &self.plugin)
            .field("priority", &self.priority)
            .field("handler_name", &self.handler_name)
            .finish_non_exhaustive()
    }
}

/// Listeners of a single plugin, grouped by event id
#[derive(Debug, Default)]
pub struct ListenerCollection {
    listeners: HashMap<String, Vec<EventListener>>,
}

impl ListenerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; same-priority listeners keep registration order
    pub fn add(&mut self, event_id: &str, listener: EventListener) {
        let listeners = self.listeners.entry(event_id.to_string()).or_default();
        let pos = listeners.partition_point(|l| l.priority <= listener.priority);
        listeners.insert(pos, listener);
    }

    /// Whether a default listener bound from `handler_name` exists for the event
    pub fn has_default(&self, event_id: &str, handler_name: &str) -> bool {
        self.get(event_id)
            .iter()
            .any(|l| l.handler_name.as_deref() == Some(handler_name))
    }

    /// Listeners for an event, in dispatch order
    pub fn get(&self, event_id: &str) -> &[EventListener] {
        self.listeners
            .get(event_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ids of events that have at least one listener
    pub fn event_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .listeners
            .iter()
            .filter(|(_, listeners)| !listeners.is_empty())
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
