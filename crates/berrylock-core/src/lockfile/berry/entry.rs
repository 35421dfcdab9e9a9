//! Lockfile entry bodies and the `__metadata` block.

use std::collections::BTreeMap;

use serde::Serialize;

/// Top-level format markers from the `__metadata` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Lockfile format version.
    pub version: u32,
    /// Cache compatibility key as written (`8` in Yarn 3, `10c0` in Yarn 4).
    pub cache_key: String,
}

impl Metadata {
    #[must_use]
    pub fn new(version: u32, cache_key: impl Into<String>) -> Self {
        Self {
            version,
            cache_key: cache_key.into(),
        }
    }

    /// The cache key as an integer, when it is one.
    #[must_use]
    pub fn cache_key_number(&self) -> Option<u32> {
        self.cache_key.parse().ok()
    }
}

/// How a package is installed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Copied into the install tree.
    Hard,
    /// Symlinked (workspaces, portals, links).
    Soft,
}

impl LinkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }

    pub(crate) fn parse(text: &str) -> Option<Self> {
        match text {
            "hard" => Some(Self::Hard),
            "soft" => Some(Self::Soft),
            _ => None,
        }
    }
}

/// Per-dependency install flags from `dependenciesMeta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unplugged: Option<bool>,
}

/// Per-peer flags from `peerDependenciesMeta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerDependencyMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

/// The body of one lockfile block.
///
/// Maps are `BTreeMap` so iteration matches the sorted order Yarn writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockfileEntry {
    /// Locked version (`4.17.21`, or `0.0.0-use.local` for workspaces).
    pub version: String,
    /// Locator text the block's descriptors resolve to.
    pub resolution: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies_meta: BTreeMap<String, DependencyMeta>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Platform conditions such as `os=darwin & cpu=arm64`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
}

impl LockfileEntry {
    /// Create an entry with only the required fields set.
    #[must_use]
    pub fn new(version: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            resolution: resolution.into(),
            dependencies: BTreeMap::new(),
            peer_dependencies: BTreeMap::new(),
            dependencies_meta: BTreeMap::new(),
            peer_dependencies_meta: BTreeMap::new(),
            bin: BTreeMap::new(),
            checksum: None,
            conditions: None,
            language_name: None,
            link_type: None,
        }
    }

    /// Add a dependency.
    pub fn add_dependency(&mut self, name: impl Into<String>, range: impl Into<String>) {
        self.dependencies.insert(name.into(), range.into());
    }

    /// Add a peer dependency.
    pub fn add_peer_dependency(&mut self, name: impl Into<String>, range: impl Into<String>) {
        self.peer_dependencies.insert(name.into(), range.into());
    }

    /// Dependencies and peer dependencies as one name -> range map.
    ///
    /// A name listed in both keeps its regular dependency range.
    #[must_use]
    pub fn all_dependencies(&self) -> BTreeMap<String, String> {
        let mut all = self.peer_dependencies.clone();
        all.extend(
            self.dependencies
                .iter()
                .map(|(name, range)| (name.clone(), range.clone())),
        );
        all
    }
}
