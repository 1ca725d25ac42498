//! hotplug-api: Shared types for the hotplug plugin system
//!
//! This crate defines the contract between the host and a guest Wasm module:
//! the export names the host looks for, how pointers into guest memory are
//! packed, the metadata record a plugin may declare, and the catalog of
//! events a plugin can handle.

pub mod events;
pub mod metadata;

pub use events::{EventCatalog, HostEvents, PluginEvent, DEFAULT_LISTENER_PRIORITY};
pub use metadata::{is_valid_plugin_id, PluginMetadata};

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// Optional export `() -> i32` reporting the API version the guest was built for
pub const API_VERSION_EXPORT: &str = "plugin_api_version";

/// Optional export `() -> i64` returning a packed pointer to UTF-8 JSON metadata
pub const METADATA_EXPORT: &str = "plugin_metadata";

/// Linear memory the metadata pointer refers to
pub const MEMORY_EXPORT: &str = "memory";

/// File extensions recognised as plugin or library modules
pub const MODULE_EXTENSIONS: [&str; 2] = ["wasm", "wat"];

/// Pack a guest pointer and length into the i64 returned by guest exports
#[inline]
pub fn pack_ptr_len(ptr: i32, len: i32) -> i64 {
    ((ptr as i64) << 32) | (len as i64 & 0xFFFF_FFFF)
}

/// Unpack ptr and len from a packed i64
#[inline]
pub fn unpack_ptr_len(packed: i64) -> (i32, i32) {
    let ptr = (packed >> 32) as i32;
    let len = (packed & 0xFFFF_FFFF) as i32;
    (ptr, len)
}
