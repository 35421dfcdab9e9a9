//! Lockfile formats.
//!
//! Every supported format implements [`Lockfile`], so callers can resolve
//! packages, walk dependencies and prune without knowing which package
//! manager wrote the file.
//!
//! ## Formats
//!
//! - [`berry::BerryLockfile`] - Yarn 2+ `yarn.lock`

pub mod berry;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Error;

/// A resolved package: its locator key and locked version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Canonical key of the resolved package (`js-tokens@npm:4.0.0`).
    pub key: String,
    /// Locked version (`4.0.0`).
    pub version: String,
}

/// Read and prune operations shared by all lockfile formats.
///
/// The trait is `Send + Sync` so one decoded lockfile can serve pruning
/// requests from several threads.
pub trait Lockfile: Send + Sync + std::fmt::Debug {
    /// Resolve `name` at `range` to a locked package.
    ///
    /// Returns `None` when nothing in the lockfile satisfies the request.
    fn resolve_package(&self, name: &str, range: &str) -> Option<Package>;

    /// Dependencies and peer dependencies of the package at `key`.
    ///
    /// Returns `None` when `key` is not in the lockfile.
    fn all_dependencies(&self, key: &str) -> Option<BTreeMap<String, String>>;

    /// A new lockfile holding only what `workspaces` and `packages` need.
    fn subgraph(&self, workspaces: &[String], packages: &[String])
        -> Result<Box<dyn Lockfile>, Error>;

    /// Canonical lockfile text.
    fn encode(&self) -> Result<Vec<u8>, Error>;
}

impl Lockfile for berry::BerryLockfile {
    fn resolve_package(&self, name: &str, range: &str) -> Option<Package> {
        berry::BerryLockfile::resolve_package(self, name, range)
    }

    fn all_dependencies(&self, key: &str) -> Option<BTreeMap<String, String>> {
        berry::BerryLockfile::all_dependencies(self, key)
    }

    fn subgraph(
        &self,
        workspaces: &[String],
        packages: &[String],
    ) -> Result<Box<dyn Lockfile>, Error> {
        let pruned = berry::BerryLockfile::subgraph(self, workspaces, packages)?;
        Ok(Box::new(pruned))
    }

    fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(berry::BerryLockfile::encode(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"
__metadata:
  version: 6
  cacheKey: 8

"app@workspace:apps/app":
  version: 0.0.0-use.local
  resolution: "app@workspace:apps/app"
  dependencies:
    ms: ^2.1.0
  languageName: unknown
  linkType: soft

"ms@npm:^2.1.0":
  version: 2.1.3
  resolution: "ms@npm:2.1.3"
  languageName: node
  linkType: hard

"repo@workspace:.":
  version: 0.0.0-use.local
  resolution: "repo@workspace:."
  languageName: unknown
  linkType: soft
"#;

    fn boxed() -> Box<dyn Lockfile> {
        Box::new(berry::decode(LOCK.as_bytes()).unwrap())
    }

    #[test]
    fn test_trait_object_resolve() {
        let lockfile = boxed();
        let package = lockfile.resolve_package("ms", "^2.1.0").unwrap();
        assert_eq!(
            package,
            Package {
                key: "ms@npm:2.1.3".into(),
                version: "2.1.3".into()
            }
        );
        assert!(lockfile.all_dependencies("app@workspace:apps/app").is_some());
    }

    #[test]
    fn test_trait_object_subgraph_and_encode() {
        let lockfile = boxed();
        let pruned = lockfile.subgraph(&[], &[]).unwrap();
        let text = String::from_utf8(pruned.encode().unwrap()).unwrap();
        assert!(text.contains("repo@workspace:."));
        assert!(!text.contains("ms@npm"));

        let err = lockfile.subgraph(&["nope".to_string()], &[]).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::LOCK_UNRESOLVED_WORKSPACE);
    }

    #[test]
    fn test_package_serializes() {
        let package = Package {
            key: "ms@npm:2.1.3".into(),
            version: "2.1.3".into(),
        };
        assert_eq!(
            serde_json::to_string(&package).unwrap(),
            r#"{"key":"ms@npm:2.1.3","version":"2.1.3"}"#
        );
    }
}
