//! Plugin lifecycle states
//!
//! ```text
//! Uninitialized --load--> Loaded --ready--> Ready
//!       |                  |  ^ reload       | ^ reload, ready
//!       +------------------+--+---unload-----+
//!                          v
//!                      Unloading --remove--> Unloaded
//! ```

use crate::error::PluginError;
use crate::PluginMetadata;
use std::fmt;

/// Lifecycle state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PluginState {
    /// Created, nothing loaded yet
    #[default]
    Uninitialized,
    /// Code unit loaded
    Loaded,
    /// Default listeners registered
    Ready,
    /// Registry entries evicted, waiting for removal
    Unloading,
    /// Terminal
    Unloaded,
}

impl PluginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unloaded)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loaded => "loaded",
            Self::Ready => "ready",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Holds the state of one plugin and guards its transitions
#[derive(Debug, Default)]
pub struct StateMachine {
    state: PluginState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Fail with `IllegalCall` unless the current state is one of `allowed`
    pub fn assert_state(
        &self,
        allowed: &[PluginState],
        owner: &dyn fmt::Display,
    ) -> Result<(), PluginError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PluginError::illegal_state(owner, self.state, allowed))
        }
    }

    pub fn set_state(&mut self, state: PluginState) {
        tracing::trace!(from = %self.state, to = %state, "Plugin state transition");
        self.state = state;
    }
}

/// Lifecycle interface a plugin manager drives
///
/// Implementations must check their precondition state before doing
/// anything and fail with [`PluginError::IllegalCall`] otherwise.
pub trait Plugin: fmt::Display + Send {
    fn state(&self) -> PluginState;

    /// Whether the plugin is backed by a loadable file
    fn is_regular(&self) -> bool;

    /// Metadata of the loaded unit; `IllegalCall` before the first successful load
    fn metadata(&self) -> Result<&PluginMetadata, PluginError>;

    fn load(&mut self) -> Result<(), PluginError>;

    fn ready(&mut self) -> Result<(), PluginError>;

    fn reload(&mut self) -> Result<(), PluginError>;

    fn unload(&mut self) -> Result<(), PluginError>;

    fn remove(&mut self) -> Result<(), PluginError>;
}
