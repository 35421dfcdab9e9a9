//! Yarn Berry (`yarn.lock` v2 and later) lockfiles.
//!
//! A [`BerryLockfile`] is decoded once from lockfile text and is read-only
//! afterwards. It keeps the source's block order and heading grouping, so
//! encoding an unmodified lockfile reproduces the input byte for byte.
//!
//! ## Layout
//!
//! ```text
//! # This file is generated by running "yarn install" inside your project.
//!
//! __metadata:
//!   version: 6
//!   cacheKey: 8
//!
//! "js-tokens@npm:^3.0.0 || ^4.0.0, js-tokens@npm:^4.0.0":
//!   version: 4.0.0
//!   resolution: "js-tokens@npm:4.0.0"
//!   ...
//! ```
//!
//! Each block heading lists one or more descriptors that all resolve to the
//! locator named by `resolution`.

mod de;
mod entry;
mod identity;
mod ser;
mod subgraph;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;

pub use de::decode;
pub use entry::{DependencyMeta, LinkType, LockfileEntry, Metadata, PeerDependencyMeta};
pub use identity::{
    split_protocol, Descriptor, Ident, Locator, PatchParams, PatchReference, Protocol,
};

use crate::error::{DecodeError, EncodeError};
use crate::lockfile::Package;
use crate::range::range_satisfies;

/// Key of the top-level metadata block.
pub(crate) const METADATA_KEY: &str = "__metadata";

/// Protocols tried, in order, when looking a requested range up verbatim.
const EXACT_PREFIXES: [&str; 5] = ["", "npm:", "file:", "workspace:", "yarn:"];

/// One top-level block: the heading descriptors and the entry they share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryBlock {
    pub(crate) descriptors: Vec<Descriptor>,
    pub(crate) locator: Locator,
    pub(crate) entry: LockfileEntry,
}

/// Lookup tables derived from the blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Index {
    /// Locator -> position in `blocks`.
    packages: HashMap<Locator, usize>,
    descriptors: HashMap<Descriptor, Locator>,
    /// Heading descriptors per ident, in decode order.
    by_ident: HashMap<Ident, Vec<Descriptor>>,
}

impl Index {
    fn build(blocks: &[EntryBlock]) -> Self {
        let mut index = Self::default();
        for (position, block) in blocks.iter().enumerate() {
            index.packages.insert(block.locator.clone(), position);
            for descriptor in &block.descriptors {
                index
                    .descriptors
                    .insert(descriptor.clone(), block.locator.clone());
                index
                    .by_ident
                    .entry(descriptor.ident().clone())
                    .or_default()
                    .push(descriptor.clone());
            }
        }
        index
    }
}

/// A decoded Yarn Berry lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BerryLockfile {
    header: Vec<String>,
    metadata: Metadata,
    blocks: Vec<EntryBlock>,
    index: Index,
    /// Base locator -> patch locator.
    patches: BTreeMap<Locator, Locator>,
    package_extensions: BTreeSet<Descriptor>,
}

impl BerryLockfile {
    /// Create a lockfile with no entries.
    #[must_use]
    pub fn new(metadata: Metadata) -> Self {
        Self {
            header: Vec::new(),
            metadata,
            blocks: Vec::new(),
            index: Index::default(),
            patches: BTreeMap::new(),
            package_extensions: BTreeSet::new(),
        }
    }

    /// Decode lockfile bytes. Same as [`decode`].
    pub fn decode(input: &[u8]) -> Result<Self, DecodeError> {
        decode(input)
    }

    /// Assemble a lockfile from decoded blocks, validating cross-block
    /// invariants and deriving the patch table and package extensions.
    pub(crate) fn from_blocks(
        header: Vec<String>,
        metadata: Metadata,
        blocks: Vec<EntryBlock>,
    ) -> Result<Self, DecodeError> {
        let mut seen_locators = HashSet::new();
        let mut seen_descriptors = HashSet::new();
        for block in &blocks {
            if !seen_locators.insert(&block.locator) {
                return Err(DecodeError::DuplicateLocator(block.locator.to_string()));
            }
            for descriptor in &block.descriptors {
                if !seen_descriptors.insert(descriptor) {
                    return Err(DecodeError::DuplicateDescriptor(descriptor.to_string()));
                }
            }
        }

        let index = Index::build(&blocks);

        let mut patches = BTreeMap::new();
        for block in &blocks {
            let Some(patch) = block.locator.patch() else {
                continue;
            };
            let base = patch.base_locator()?;
            if !index.packages.contains_key(&base) {
                return Err(DecodeError::MissingPatchBase {
                    patch: block.locator.to_string(),
                    base: base.to_string(),
                });
            }
            patches.entry(base).or_insert_with(|| block.locator.clone());
        }

        let package_extensions = detect_extensions(&blocks);

        Ok(Self {
            header,
            metadata,
            blocks,
            index,
            patches,
            package_extensions,
        })
    }

    /// Assemble a lockfile from a subset of this one's blocks.
    pub(crate) fn with_blocks(
        &self,
        blocks: Vec<EntryBlock>,
        package_extensions: BTreeSet<Descriptor>,
    ) -> Self {
        let index = Index::build(&blocks);
        let patches = self
            .patches
            .iter()
            .filter(|(base, patch)| {
                index.packages.contains_key(*base) && index.packages.contains_key(*patch)
            })
            .map(|(base, patch)| (base.clone(), patch.clone()))
            .collect();

        Self {
            header: self.header.clone(),
            metadata: self.metadata.clone(),
            blocks,
            index,
            patches,
            package_extensions,
        }
    }

    /// Leading `#` comment lines, without line terminators.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of entry blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Entry blocks in file order: heading descriptors, resolution, entry.
    pub fn entries(&self) -> impl Iterator<Item = (&[Descriptor], &Locator, &LockfileEntry)> {
        self.blocks
            .iter()
            .map(|block| (block.descriptors.as_slice(), &block.locator, &block.entry))
    }

    /// Every heading descriptor with its resolution, in file order.
    pub fn descriptors(&self) -> impl Iterator<Item = (&Descriptor, &Locator)> {
        self.blocks.iter().flat_map(|block| {
            block
                .descriptors
                .iter()
                .map(move |descriptor| (descriptor, &block.locator))
        })
    }

    /// The locator a stored descriptor resolves to.
    #[must_use]
    pub fn locator_for(&self, descriptor: &Descriptor) -> Option<&Locator> {
        self.index.descriptors.get(descriptor)
    }

    #[must_use]
    pub fn entry(&self, locator: &Locator) -> Option<&LockfileEntry> {
        self.index
            .packages
            .get(locator)
            .and_then(|&position| self.blocks.get(position))
            .map(|block| &block.entry)
    }

    #[must_use]
    pub fn contains(&self, locator: &Locator) -> bool {
        self.index.packages.contains_key(locator)
    }

    /// Workspace locators in file order.
    pub fn workspaces(&self) -> impl Iterator<Item = &Locator> {
        self.blocks
            .iter()
            .map(|block| &block.locator)
            .filter(|locator| locator.workspace_path().is_some())
    }

    /// The workspace locator at `path` (`packages/a`, or `.` for the root).
    #[must_use]
    pub fn workspace(&self, path: &str) -> Option<&Locator> {
        self.workspaces()
            .find(|locator| locator.workspace_path() == Some(path))
    }

    /// Patch table: base locator -> patch locator.
    pub fn patches(&self) -> impl Iterator<Item = (&Locator, &Locator)> {
        self.patches.iter()
    }

    /// The patch applied to `base`, if any.
    #[must_use]
    pub fn patch_for(&self, base: &Locator) -> Option<&Locator> {
        self.patches.get(base)
    }

    /// Descriptors injected by `packageExtensions` rather than any manifest.
    #[must_use]
    pub fn package_extensions(&self) -> &BTreeSet<Descriptor> {
        &self.package_extensions
    }

    /// Resolve `name@range` to its locked package.
    ///
    /// Returns `None` when nothing in the lockfile satisfies the request.
    /// See [`BerryLockfile::resolve_descriptor`] for the matching rules.
    #[must_use]
    pub fn resolve_package(&self, name: &str, range: &str) -> Option<Package> {
        let ident = Ident::parse(name).ok()?;
        let (_, locator) = self.resolve_descriptor(&Descriptor::new(ident, range))?;
        let entry = self.entry(locator)?;
        Some(Package {
            key: locator.to_string(),
            version: entry.version.clone(),
        })
    }

    /// Find the stored descriptor that satisfies `requested`, and its locator.
    ///
    /// An exact lookup runs first, trying the range as written and then with
    /// the `npm:`, `file:`, `workspace:` and `yarn:` protocols prepended.
    /// Otherwise stored descriptors with the same ident are checked in file
    /// order and the first whose range covers the requested one wins. Ranges
    /// are compared branch by branch on `||`, and by version-set containment.
    #[must_use]
    pub fn resolve_descriptor(&self, requested: &Descriptor) -> Option<(&Descriptor, &Locator)> {
        if let Some(found) = self.resolve_exact(requested) {
            return Some(found);
        }

        let (requested_protocol, requested_range) = split_protocol(requested.range());
        self.index
            .by_ident
            .get(requested.ident())?
            .iter()
            .find(|stored| {
                let (protocol, range) = split_protocol(stored.range());
                (requested_protocol.is_empty() || requested_protocol == protocol)
                    && range_satisfies(range, requested_range)
            })
            .and_then(|stored| self.index.descriptors.get_key_value(stored))
    }

    /// Exact lookup only: the range as written, then with default protocols.
    pub(crate) fn resolve_exact(&self, requested: &Descriptor) -> Option<(&Descriptor, &Locator)> {
        if let Some(found) = self.index.descriptors.get_key_value(requested) {
            return Some(found);
        }
        if requested.protocol().is_some() {
            return None;
        }
        EXACT_PREFIXES[1..].iter().find_map(|prefix| {
            let candidate = Descriptor::new(
                requested.ident().clone(),
                format!("{prefix}{}", requested.range()),
            );
            self.index.descriptors.get_key_value(&candidate)
        })
    }

    /// Dependencies and peer dependencies of the package at `key`.
    ///
    /// Returns `None` when `key` is not a locator in this lockfile.
    #[must_use]
    pub fn all_dependencies(&self, key: &str) -> Option<BTreeMap<String, String>> {
        let locator = Locator::parse(key).ok()?;
        self.entry(&locator).map(LockfileEntry::all_dependencies)
    }

    /// Canonical lockfile text.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(ser::render(self).into_bytes())
    }

    /// Write canonical lockfile text to `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), EncodeError> {
        out.write_all(ser::render(self).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Heading descriptors that no entry's dependencies reference.
///
/// Yarn records manifests before `packageExtensions` are applied, so the
/// descriptors an extension injects never appear as a dependency range.
/// Workspace and patch descriptors are never extensions.
fn detect_extensions(blocks: &[EntryBlock]) -> BTreeSet<Descriptor> {
    let mut referenced = HashSet::new();
    for block in blocks {
        let entry = &block.entry;
        for (name, range) in entry.dependencies.iter().chain(&entry.peer_dependencies) {
            let Ok(ident) = Ident::parse(name) else {
                continue;
            };
            referenced.insert(Descriptor::new(ident.clone(), format!("npm:{range}")));
            referenced.insert(Descriptor::new(ident, range.clone()));
        }
    }

    blocks
        .iter()
        .flat_map(|block| &block.descriptors)
        .filter(|descriptor| {
            !matches!(
                descriptor.protocol(),
                Some(Protocol::Workspace | Protocol::Patch)
            )
        })
        .filter(|descriptor| !referenced.contains(*descriptor))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"
__metadata:
  version: 6
  cacheKey: 8

"a@npm:^1.0.0":
  version: 1.2.0
  resolution: "a@npm:1.2.0"
  languageName: node
  linkType: hard

"a@npm:^1.1.0":
  version: 1.3.0
  resolution: "a@npm:1.3.0"
  languageName: node
  linkType: hard

"b@npm:^2.0.0":
  version: 2.0.1
  resolution: "b@npm:2.0.1"
  languageName: node
  linkType: hard

"js-tokens@npm:^4.0.0":
  version: 4.0.0
  resolution: "js-tokens@npm:4.0.0"
  languageName: node
  linkType: hard

"root@workspace:.":
  version: 0.0.0-use.local
  resolution: "root@workspace:."
  dependencies:
    a: ^1.0.0
    js-tokens: ^4.0.0
  peerDependencies:
    a: "*"
  languageName: unknown
  linkType: soft
"#;

    fn lockfile() -> BerryLockfile {
        decode(LOCK.as_bytes()).unwrap()
    }

    #[test]
    fn test_resolve_exact_with_default_protocol() {
        let package = lockfile().resolve_package("a", "^1.1.0").unwrap();
        assert_eq!(package.key, "a@npm:1.3.0");
        assert_eq!(package.version, "1.3.0");
    }

    #[test]
    fn test_resolve_exact_beats_earlier_range_match() {
        // ^1.0.0 also covers ^1.1.0 and comes first, but the exact hit wins.
        let package = lockfile().resolve_package("a", "npm:^1.1.0").unwrap();
        assert_eq!(package.key, "a@npm:1.3.0");
    }

    #[test]
    fn test_resolve_range_tie_break_is_file_order() {
        // Both ^1.0.0 and ^1.1.0 cover ^1.2.0; the earlier block wins.
        let package = lockfile().resolve_package("a", "^1.2.0").unwrap();
        assert_eq!(package.key, "a@npm:1.2.0");
    }

    #[test]
    fn test_resolve_union_against_single_stored_range() {
        let package = lockfile()
            .resolve_package("js-tokens", "^3.0.0 || ^4.0.0")
            .unwrap();
        assert_eq!(package.key, "js-tokens@npm:4.0.0");
        assert_eq!(package.version, "4.0.0");
    }

    #[test]
    fn test_resolve_protocol_mismatch() {
        assert!(lockfile().resolve_package("b", "file:^2.0.0").is_none());
        assert!(lockfile().resolve_package("b", "npm:^2.0.0").is_some());
    }

    #[test]
    fn test_resolve_missing() {
        let lockfile = lockfile();
        assert!(lockfile.resolve_package("b", "^3.0.0").is_none());
        assert!(lockfile.resolve_package("c", "^1.0.0").is_none());
        assert!(lockfile.resolve_package("@bad", "^1.0.0").is_none());
    }

    #[test]
    fn test_every_descriptor_resolves_to_its_locator() {
        let lockfile = lockfile();
        for (descriptor, locator) in lockfile.descriptors() {
            let package = lockfile
                .resolve_package(&descriptor.ident().to_string(), descriptor.range())
                .unwrap();
            assert_eq!(package.key, locator.to_string());
            assert_eq!(package.version, lockfile.entry(locator).unwrap().version);
        }
    }

    #[test]
    fn test_all_dependencies() {
        let lockfile = lockfile();
        let deps = lockfile.all_dependencies("root@workspace:.").unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps["a"], "^1.0.0");
        assert!(lockfile.all_dependencies("root@workspace:missing").is_none());
        assert!(lockfile.all_dependencies("not a locator").is_none());
    }

    #[test]
    fn test_workspace_lookup() {
        let lockfile = lockfile();
        assert_eq!(
            lockfile.workspace(".").map(ToString::to_string).as_deref(),
            Some("root@workspace:.")
        );
        assert!(lockfile.workspace("packages/a").is_none());
    }

    #[test]
    fn test_extensions_are_unreferenced_descriptors() {
        let lockfile = lockfile();
        let extensions: Vec<String> = lockfile
            .package_extensions()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(extensions, ["a@npm:^1.1.0", "b@npm:^2.0.0"]);
    }

    #[test]
    fn test_duplicate_descriptor() {
        let text = "__metadata:\n  version: 6\n  cacheKey: 8\n\n\"a@npm:^1.0.0\":\n  version: 1.0.0\n  resolution: \"a@npm:1.0.0\"\n\n\"a@npm:^1.0.0\":\n  version: 1.0.1\n  resolution: \"a@npm:1.0.1\"\n";
        assert!(matches!(
            decode(text.as_bytes()),
            Err(DecodeError::DuplicateDescriptor(_))
        ));
    }

    #[test]
    fn test_duplicate_locator() {
        let text = "__metadata:\n  version: 6\n  cacheKey: 8\n\n\"a@npm:^1.0.0\":\n  version: 1.0.0\n  resolution: \"a@npm:1.0.0\"\n\n\"a@npm:1.0.0\":\n  version: 1.0.0\n  resolution: \"a@npm:1.0.0\"\n";
        assert!(matches!(
            decode(text.as_bytes()),
            Err(DecodeError::DuplicateLocator(_))
        ));
    }

    #[test]
    fn test_missing_patch_base() {
        let text = "__metadata:\n  version: 6\n  cacheKey: 8\n\n\"a@patch:a@npm%3A1.0.0#./a.patch::locator=r%40workspace%3A.\":\n  version: 1.0.0\n  resolution: \"a@patch:a@npm%3A1.0.0#./a.patch::version=1.0.0&hash=abc123&locator=r%40workspace%3A.\"\n";
        assert!(matches!(
            decode(text.as_bytes()),
            Err(DecodeError::MissingPatchBase { .. })
        ));
    }

    #[test]
    fn test_write_to_matches_encode() {
        let lockfile = lockfile();
        let mut out = Vec::new();
        lockfile.write_to(&mut out).unwrap();
        assert_eq!(out, lockfile.encode().unwrap());
        assert_eq!(out, LOCK.as_bytes());
    }

    #[test]
    fn test_write_to_failing_sink() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = lockfile().write_to(&mut Broken).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
