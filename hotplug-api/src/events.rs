//! Event catalog
//!
//! Every event a plugin may listen to, and the conventional name of the
//! handler export that is bound automatically when a plugin becomes ready.

/// Priority given to listeners bound by handler-name convention
pub const DEFAULT_LISTENER_PRIORITY: i32 = 1000;

/// A known event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginEvent {
    /// Stable event identifier
    pub id: &'static str,

    /// Name of the guest export bound to this event by default, if any
    pub default_handler: Option<&'static str>,
}

impl PluginEvent {
    pub const fn new(id: &'static str, default_handler: Option<&'static str>) -> Self {
        Self {
            id,
            default_handler,
        }
    }
}

/// Source of the events scanned when binding default listeners
pub trait EventCatalog: Send + Sync {
    fn events(&self) -> &[PluginEvent];

    /// Look up an event by id
    fn find(&self, id: &str) -> Option<&PluginEvent> {
        self.events().iter().find(|event| event.id == id)
    }
}

impl EventCatalog for Vec<PluginEvent> {
    fn events(&self) -> &[PluginEvent] {
        self
    }
}

/// Events raised by the host itself
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEvents;

impl HostEvents {
    pub const GENERAL_INFO: PluginEvent = PluginEvent::new("general_info", Some("on_info"));
    pub const USER_INFO: PluginEvent = PluginEvent::new("user_info", Some("on_user_info"));
    pub const HOST_START_PRE: PluginEvent =
        PluginEvent::new("host_start_pre", Some("on_host_start_pre"));
    pub const HOST_START: PluginEvent = PluginEvent::new("host_start", Some("on_host_start"));
    pub const HOST_STARTUP: PluginEvent =
        PluginEvent::new("host_startup", Some("on_host_startup"));
    pub const HOST_STOP: PluginEvent = PluginEvent::new("host_stop", Some("on_host_stop"));
    pub const PLUGIN_LOADED: PluginEvent = PluginEvent::new("plugin_loaded", Some("on_load"));
    pub const PLUGIN_UNLOADED: PluginEvent =
        PluginEvent::new("plugin_unloaded", Some("on_unload"));
    // Dispatched by the manager once the plugin is gone; nothing left to bind to
    pub const PLUGIN_REMOVED: PluginEvent = PluginEvent::new("plugin_removed", None);
}

static HOST_EVENTS: [PluginEvent; 9] = [
    HostEvents::GENERAL_INFO,
    HostEvents::USER_INFO,
    HostEvents::HOST_START_PRE,
    HostEvents::HOST_START,
    HostEvents::HOST_STARTUP,
    HostEvents::HOST_STOP,
    HostEvents::PLUGIN_LOADED,
    HostEvents::PLUGIN_UNLOADED,
    HostEvents::PLUGIN_REMOVED,
];

impl EventCatalog for HostEvents {
    fn events(&self) -> &[PluginEvent] {
        &HOST_EVENTS
    }
}
