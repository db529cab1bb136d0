//! Ordered, name-unique set of server descriptors.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use super::types::{McpEnvEntry, McpServerConfig, McpServerDescriptor, McpServerType};
use crate::ports::DescriptorError;

/// The caller-supplied set of servers for one initialization pass.
///
/// Insertion order is preserved; the sequencer relies on it to break ties
/// between servers with equal reachability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpServerDescriptorSet {
    servers: IndexMap<String, McpServerDescriptor>,
}

/// One entry of the inbound JSON shape `{ name -> entry }`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorEntry {
    #[serde(default, rename = "type", alias = "kind")]
    server_type: Option<McpServerType>,
    #[serde(flatten)]
    config: McpServerConfig,
    #[serde(default)]
    env: IndexMap<String, String>,
}

impl DescriptorEntry {
    fn into_descriptor(self, name: String) -> McpServerDescriptor {
        // Untyped entries are inferred from which connection field is present
        let server_type = self.server_type.unwrap_or(if self.config.url.is_some() {
            McpServerType::Http
        } else {
            McpServerType::Stdio
        });

        McpServerDescriptor {
            name,
            server_type,
            config: self.config,
            env: self
                .env
                .into_iter()
                .map(|(key, value)| McpEnvEntry { key, value })
                .collect(),
        }
    }
}

/// Top-level `{ name -> entry }` object with every key kept, duplicates
/// included, in document order.
struct DescriptorEntries(Vec<(String, DescriptorEntry)>);

impl<'de> Deserialize<'de> for DescriptorEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = DescriptorEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping server names to server entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, DescriptorEntry>()? {
                    entries.push((name, entry));
                }
                Ok(DescriptorEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl McpServerDescriptorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from descriptors, rejecting duplicate names.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = McpServerDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let mut set = Self::new();
        for descriptor in descriptors {
            set.insert(descriptor)?;
        }
        Ok(set)
    }

    /// Parse the `{ name -> { type, command|url, args, env, headers } }` shape.
    ///
    /// Entries are not validated here so that one bad entry fails only its
    /// own server during initialization. Use [`Self::validate`] to check
    /// everything up front.
    pub fn from_json_str(json: &str) -> Result<Self, DescriptorError> {
        let DescriptorEntries(entries) =
            serde_json::from_str(json).map_err(|e| DescriptorError::Parse(e.to_string()))?;

        // A repeated key must not silently replace the earlier server
        let mut set = Self::new();
        for (name, entry) in entries {
            set.insert(entry.into_descriptor(name))?;
        }
        Ok(set)
    }

    /// Add a descriptor; names must be unique.
    pub fn insert(&mut self, descriptor: McpServerDescriptor) -> Result<(), DescriptorError> {
        if self.servers.contains_key(&descriptor.name) {
            return Err(DescriptorError::DuplicateName(descriptor.name));
        }
        self.servers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&McpServerDescriptor> {
        self.servers.get(name)
    }

    /// Server names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    /// Descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &McpServerDescriptor> {
        self.servers.values()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Validate every descriptor, collecting all failures.
    pub fn validate(&self) -> Result<(), Vec<DescriptorError>> {
        let errors: Vec<DescriptorError> = self
            .iter()
            .filter_map(|descriptor| descriptor.validate().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl<'a> IntoIterator for &'a McpServerDescriptorSet {
    type Item = &'a McpServerDescriptor;
    type IntoIter = indexmap::map::Values<'a, String, McpServerDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.values()
    }
}
