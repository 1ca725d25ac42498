//! Plugin metadata
//!
//! A plugin may export a JSON metadata record. Parsing is lenient: a missing
//! record, a malformed record or an invalid id never fails a load, the
//! affected values fall back to defaults derived from the plugin file name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_VERSION: &str = "0.0.0";
const MAX_ID_LEN: usize = 64;

/// Structured metadata of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin id (`[a-z0-9_]{1,64}`)
    pub id: String,

    /// Plugin version
    pub version: String,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// Plugin authors
    #[serde(default)]
    pub authors: Vec<String>,

    /// Homepage or repository link
    #[serde(default)]
    pub link: Option<String>,

    /// Declared dependencies, id to version requirement
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Wire form of the metadata record; every field is optional
#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    id: Option<String>,
    version: Option<String>,
    name: Option<String>,
    description: Option<String>,
    author: Option<Authors>,
    /// Accepted spelling of `author`; `author` wins when both are present
    authors: Option<Authors>,
    link: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Authors {
    One(String),
    Many(Vec<String>),
}

impl PluginMetadata {
    /// Default record for a plugin that declares nothing
    pub fn fallback(fallback_id: &str) -> Self {
        Self {
            id: fallback_id.to_string(),
            version: DEFAULT_VERSION.to_string(),
            name: fallback_id.to_string(),
            description: None,
            authors: Vec::new(),
            link: None,
            dependencies: BTreeMap::new(),
        }
    }

    /// Build metadata from the raw value a plugin exported, if any
    pub fn parse(raw: Option<&Value>, fallback_id: &str) -> Self {
        let Some(raw) = raw else {
            return Self::fallback(fallback_id);
        };

        let raw: RawMetadata = match serde_json::from_value(raw.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    fallback_id,
                    error = %e,
                    "Malformed plugin metadata, using defaults"
                );
                return Self::fallback(fallback_id);
            }
        };

        let id = match raw.id {
            Some(id) if is_valid_plugin_id(&id) => id,
            Some(id) => {
                tracing::warn!(%id, fallback_id, "Invalid plugin id in metadata, using fallback id");
                fallback_id.to_string()
            }
            None => fallback_id.to_string(),
        };

        Self {
            version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            name: raw.name.unwrap_or_else(|| id.clone()),
            id,
            description: raw.description,
            authors: match raw.author.or(raw.authors) {
                Some(Authors::One(author)) => vec![author],
                Some(Authors::Many(authors)) => authors,
                None => Vec::new(),
            },
            link: raw.link,
            dependencies: raw.dependencies,
        }
    }
}

/// Check a plugin id against `[a-z0-9_]{1,64}`
pub fn is_valid_plugin_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
