//! Pruning a lockfile down to what a set of workspaces needs.

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::{debug, trace};

use super::{BerryLockfile, Descriptor, EntryBlock, Ident, Locator};
use crate::error::PruneError;

impl BerryLockfile {
    /// Compute the lockfile needed to install only `workspaces`, plus the
    /// packages named by `packages`.
    ///
    /// `workspaces` are paths relative to the project root (`packages/a`).
    /// The root workspace is always kept. Each entry of `packages` may be a
    /// stored descriptor (`lodash@npm:^4.17.0`), a locator
    /// (`lodash@npm:4.17.21`) or any `name@range` that resolves against
    /// this lockfile.
    ///
    /// The result is a new lockfile; `self` is never modified.
    #[tracing::instrument(
        skip_all,
        fields(workspaces = workspaces.len(), packages = packages.len())
    )]
    pub fn subgraph<W, P>(&self, workspaces: &[W], packages: &[P]) -> Result<Self, PruneError>
    where
        W: AsRef<str>,
        P: AsRef<str>,
    {
        let mut pruner = Pruner::new(self);

        if let Some(root) = self.workspace(".") {
            pruner.visit(root);
        }
        for path in workspaces {
            let path = normalize_workspace_path(path.as_ref());
            let locator = self
                .workspace(&path)
                .ok_or_else(|| PruneError::UnresolvedWorkspace(path))?;
            pruner.visit(locator);
        }
        for specifier in packages {
            pruner.add_specifier(specifier.as_ref())?;
        }

        pruner.walk();
        Ok(pruner.finish())
    }
}

/// `./packages/a/` or `.\packages\a` -> `packages/a`
fn normalize_workspace_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_end_matches('/');
    match path.strip_prefix("./") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ if path.is_empty() => ".".to_string(),
        _ => path.to_string(),
    }
}

/// Heading for a block kept only through its locator, such as a
/// `name@npm:1.2.3` extra package: the locator written as a descriptor.
fn locator_heading(locator: &Locator) -> Descriptor {
    Descriptor::new(locator.ident().clone(), locator.reference())
}

/// Worklist state for one prune.
struct Pruner<'a> {
    source: &'a BerryLockfile,
    queue: VecDeque<&'a Locator>,
    locators: HashSet<&'a Locator>,
    descriptors: HashSet<&'a Descriptor>,
}

impl<'a> Pruner<'a> {
    fn new(source: &'a BerryLockfile) -> Self {
        Self {
            source,
            queue: VecDeque::new(),
            locators: HashSet::new(),
            descriptors: HashSet::new(),
        }
    }

    fn visit(&mut self, locator: &'a Locator) {
        if self.locators.insert(locator) {
            self.queue.push_back(locator);
        }
    }

    fn add_specifier(&mut self, text: &str) -> Result<(), PruneError> {
        let descriptor = Descriptor::parse(text)?;

        if let Some((stored, locator)) = self.source.index.descriptors.get_key_value(&descriptor) {
            self.descriptors.insert(stored);
            self.visit(locator);
            return Ok(());
        }

        if let Ok(locator) = Locator::parse(text) {
            if let Some((locator, _)) = self.source.index.packages.get_key_value(&locator) {
                self.visit(locator);
                return Ok(());
            }
        }

        let (stored, locator) = self
            .source
            .resolve_descriptor(&descriptor)
            .ok_or_else(|| PruneError::UnresolvedSpecifier(text.to_string()))?;
        self.descriptors.insert(stored);
        self.visit(locator);
        Ok(())
    }

    /// Expand queued locators until no new locator turns up.
    fn walk(&mut self) {
        let source = self.source;

        while let Some(locator) = self.queue.pop_front() {
            trace!(%locator, "visiting");

            // A workspace keeps the descriptor that names it directly.
            if locator.workspace_path().is_some() {
                let own = Descriptor::new(locator.ident().clone(), locator.reference());
                if let Some((descriptor, _)) = source.index.descriptors.get_key_value(&own) {
                    self.descriptors.insert(descriptor);
                }
            }

            if let Some(patch) = source.patch_for(locator) {
                self.visit(patch);
            }
            if let Some(base) = locator
                .patch()
                .and_then(|patch| patch.base_locator().ok())
                .and_then(|base| source.index.packages.get_key_value(&base))
                .map(|(base, _)| base)
            {
                self.visit(base);
            }

            let Some(entry) = source.entry(locator) else {
                continue;
            };
            for (name, range) in entry.dependencies.iter().chain(&entry.peer_dependencies) {
                let Ok(ident) = Ident::parse(name) else {
                    debug!(%locator, dependency = %name, "skipping malformed dependency name");
                    continue;
                };
                match source.resolve_descriptor(&Descriptor::new(ident, range.as_str())) {
                    Some((descriptor, target)) => {
                        trace!(%descriptor, %target, "resolved");
                        self.descriptors.insert(descriptor);
                        self.visit(target);
                    }
                    None => {
                        debug!(%locator, dependency = %name, %range, "skipping unresolved dependency");
                    }
                }
            }
        }
    }

    fn finish(mut self) -> BerryLockfile {
        let source = self.source;

        for extension in &source.package_extensions {
            if source
                .locator_for(extension)
                .is_some_and(|locator| self.locators.contains(locator))
            {
                self.descriptors.insert(extension);
            }
        }

        // A patch descriptor stays when the range it patches stays.
        for block in &source.blocks {
            if !self.locators.contains(&block.locator) {
                continue;
            }
            for descriptor in &block.descriptors {
                let patched = descriptor
                    .patch()
                    .and_then(|patch| patch.base_descriptor().ok())
                    .and_then(|base| source.resolve_exact(&base).map(|(stored, _)| stored));
                if patched.is_some_and(|stored| self.descriptors.contains(stored)) {
                    self.descriptors.insert(descriptor);
                }
            }
        }

        let blocks: Vec<EntryBlock> = source
            .blocks
            .iter()
            .filter(|block| self.locators.contains(&block.locator))
            .map(|block| {
                let kept: Vec<Descriptor> = block
                    .descriptors
                    .iter()
                    .filter(|descriptor| self.descriptors.contains(descriptor))
                    .cloned()
                    .collect();
                EntryBlock {
                    descriptors: if kept.is_empty() {
                        vec![locator_heading(&block.locator)]
                    } else {
                        kept
                    },
                    locator: block.locator.clone(),
                    entry: block.entry.clone(),
                }
            })
            .collect();

        let retained: HashSet<&Descriptor> =
            blocks.iter().flat_map(|block| &block.descriptors).collect();
        let package_extensions: BTreeSet<Descriptor> = source
            .package_extensions
            .iter()
            .filter(|extension| retained.contains(extension))
            .cloned()
            .collect();

        debug!(
            kept = blocks.len(),
            dropped = source.blocks.len() - blocks.len(),
            extensions = package_extensions.len(),
            "pruned lockfile"
        );
        source.with_blocks(blocks, package_extensions)
    }
}
