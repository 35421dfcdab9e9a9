//! Structured package identifiers.
//!
//! Yarn Berry names packages with three related shapes:
//! - `Ident`: `@scope/name` or `name`
//! - `Descriptor`: an ident plus a requested range (`lodash@npm:^4.17.0`)
//! - `Locator`: an ident plus a resolved reference (`lodash@npm:4.17.21`)
//!
//! References and ranges start with a resolution protocol. The `patch:`
//! protocol nests a percent-encoded locator or descriptor, followed by
//! `#<path>` and an optional `::k=v&k=v` parameter list.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::form_urlencoded;

use crate::error::IdentError;

/// A package name, independent of any version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    scope: Option<String>,
    name: String,
}

impl Ident {
    /// Create an ident from its parts. `scope` is given without the `@`.
    #[must_use]
    pub fn new(scope: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.map(str::to_string),
            name: name.into(),
        }
    }

    /// Parse `@scope/name` or `name`.
    pub fn parse(input: &str) -> Result<Self, IdentError> {
        let (ident, rest) = split_ident(input)?;
        if rest.is_some() {
            return Err(IdentError::new(input, "unexpected '@' after package name"));
        }
        Ok(ident)
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "@{scope}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A requested dependency constraint: ident plus range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor {
    ident: Ident,
    range: String,
}

impl Descriptor {
    #[must_use]
    pub fn new(ident: Ident, range: impl Into<String>) -> Self {
        Self {
            ident,
            range: range.into(),
        }
    }

    /// Parse `ident@range`.
    ///
    /// The range may omit a protocol (`lodash@^4.17.0`), but a
    /// protocol-shaped prefix must name a known protocol.
    pub fn parse(input: &str) -> Result<Self, IdentError> {
        let (ident, range) = split_ident(input)?;
        let range = range.ok_or_else(|| IdentError::new(input, "missing '@' before range"))?;
        if let Some(prefix) = protocol_prefix(range) {
            let protocol = Protocol::from_prefix(prefix)
                .ok_or_else(|| IdentError::new(input, "unknown resolution protocol"))?;
            if protocol == Protocol::Patch {
                PatchReference::parse(range).map_err(|e| IdentError::new(input, e.reason))?;
            }
        }
        Ok(Self::new(ident, range))
    }

    #[must_use]
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    #[must_use]
    pub fn range(&self) -> &str {
        &self.range
    }

    /// Protocol of the range, if it carries one.
    #[must_use]
    pub fn protocol(&self) -> Option<Protocol> {
        protocol_prefix(&self.range).and_then(Protocol::from_prefix)
    }

    /// Decomposed patch range, or `None` when this is not a patch descriptor.
    #[must_use]
    pub fn patch(&self) -> Option<PatchReference> {
        if self.protocol() != Some(Protocol::Patch) {
            return None;
        }
        PatchReference::parse(&self.range).ok()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ident, self.range)
    }
}

/// A resolved package identity: ident plus reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    ident: Ident,
    reference: String,
}

impl Locator {
    #[must_use]
    pub fn new(ident: Ident, reference: impl Into<String>) -> Self {
        Self {
            ident,
            reference: reference.into(),
        }
    }

    /// Parse `ident@reference`. The reference must carry a known protocol.
    pub fn parse(input: &str) -> Result<Self, IdentError> {
        let (ident, reference) = split_ident(input)?;
        let reference =
            reference.ok_or_else(|| IdentError::new(input, "missing '@' before reference"))?;
        let prefix = protocol_prefix(reference)
            .ok_or_else(|| IdentError::new(input, "reference has no resolution protocol"))?;
        let protocol = Protocol::from_prefix(prefix)
            .ok_or_else(|| IdentError::new(input, "unknown resolution protocol"))?;
        if protocol == Protocol::Patch {
            PatchReference::parse(reference).map_err(|e| IdentError::new(input, e.reason))?;
        }
        Ok(Self::new(ident, reference))
    }

    #[must_use]
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    #[must_use]
    pub fn protocol(&self) -> Option<Protocol> {
        protocol_prefix(&self.reference).and_then(Protocol::from_prefix)
    }

    /// Relative path of a `workspace:` locator.
    #[must_use]
    pub fn workspace_path(&self) -> Option<&str> {
        self.reference.strip_prefix(Protocol::Workspace.prefix())
    }

    /// Decomposed patch reference, or `None` for non-patch locators.
    #[must_use]
    pub fn patch(&self) -> Option<PatchReference> {
        if self.protocol() != Some(Protocol::Patch) {
            return None;
        }
        PatchReference::parse(&self.reference).ok()
    }

    /// Patch file path (or builtin patch name) of a patch locator.
    ///
    /// ```
    /// use berrylock_core::lockfile::berry::Locator;
    ///
    /// let locator = Locator::parse(
    ///     "resolve@patch:resolve@npm%3A2.0.0-next.4#~builtin<compat/resolve>::version=2.0.0-next.4&hash=07638b",
    /// )
    /// .unwrap();
    /// assert_eq!(locator.patch_path().as_deref(), Some("~builtin<compat/resolve>"));
    /// ```
    #[must_use]
    pub fn patch_path(&self) -> Option<String> {
        self.patch().map(|patch| patch.path().to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ident, self.reference)
    }
}

/// Resolution protocols Yarn Berry writes into lockfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Npm,
    Workspace,
    Patch,
    Portal,
    Link,
    File,
    Exec,
    Git,
    GitSsh,
    GitHttps,
    GitHttp,
    GitFile,
    Github,
    Http,
    Https,
    Virtual,
}

impl Protocol {
    const ALL: [Self; 16] = [
        Self::Npm,
        Self::Workspace,
        Self::Patch,
        Self::Portal,
        Self::Link,
        Self::File,
        Self::Exec,
        Self::Git,
        Self::GitSsh,
        Self::GitHttps,
        Self::GitHttp,
        Self::GitFile,
        Self::Github,
        Self::Http,
        Self::Https,
        Self::Virtual,
    ];

    /// The prefix including the trailing `:`.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Npm => "npm:",
            Self::Workspace => "workspace:",
            Self::Patch => "patch:",
            Self::Portal => "portal:",
            Self::Link => "link:",
            Self::File => "file:",
            Self::Exec => "exec:",
            Self::Git => "git:",
            Self::GitSsh => "git+ssh:",
            Self::GitHttps => "git+https:",
            Self::GitHttp => "git+http:",
            Self::GitFile => "git+file:",
            Self::Github => "github:",
            Self::Http => "http:",
            Self::Https => "https:",
            Self::Virtual => "virtual:",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.prefix() == prefix)
    }
}

/// Split a range or reference into its protocol prefix (with `:`) and body.
///
/// Text without a protocol-shaped prefix is returned with an empty prefix.
#[must_use]
pub fn split_protocol(text: &str) -> (&str, &str) {
    match protocol_prefix(text) {
        Some(prefix) => (prefix, &text[prefix.len()..]),
        None => ("", text),
    }
}

/// Returns the `[a-z][a-z0-9+.-]*:` prefix of `text`, colon included.
fn protocol_prefix(text: &str) -> Option<&str> {
    let colon = text.find(':')?;
    let scheme = &text[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let well_formed = first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '-'));
    well_formed.then(|| &text[..=colon])
}

/// Split `[@scope/]name[@rest]` into the ident and the text after the `@`.
fn split_ident(input: &str) -> Result<(Ident, Option<&str>), IdentError> {
    if input.is_empty() {
        return Err(IdentError::new(input, "empty identifier"));
    }

    let (scope, after_scope) = if let Some(scoped) = input.strip_prefix('@') {
        let Some((scope, rest)) = scoped.split_once('/') else {
            return Err(IdentError::new(input, "scoped name is missing '/'"));
        };
        if scope.is_empty() || scope.contains('@') {
            return Err(IdentError::new(input, "empty or malformed scope"));
        }
        (Some(scope), rest)
    } else {
        (None, input)
    };

    let (name, rest) = match after_scope.split_once('@') {
        Some((name, rest)) => (name, Some(rest)),
        None => (after_scope, None),
    };

    if name.is_empty() {
        return Err(IdentError::new(input, "empty package name"));
    }
    if name.contains('/') {
        return Err(IdentError::new(input, "package name contains '/'"));
    }
    if rest.is_some_and(str::is_empty) {
        return Err(IdentError::new(input, "empty reference after '@'"));
    }

    Ok((Ident::new(scope, name), rest))
}

/// The pieces of a `patch:` reference or range.
///
/// `patch:<encoded source>#<path>[::<params>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReference {
    source: String,
    path: String,
    params: PatchParams,
}

impl PatchReference {
    /// Parse a full `patch:` reference.
    pub fn parse(reference: &str) -> Result<Self, IdentError> {
        let body = reference
            .strip_prefix(Protocol::Patch.prefix())
            .ok_or_else(|| IdentError::new(reference, "not a patch reference"))?;

        let (encoded_source, selector) = body
            .split_once('#')
            .ok_or_else(|| IdentError::new(reference, "patch reference is missing '#'"))?;
        if encoded_source.is_empty() {
            return Err(IdentError::new(reference, "patch reference has no source"));
        }

        let source = percent_decode_str(encoded_source)
            .decode_utf8()
            .map_err(|_| IdentError::new(reference, "patch source is not valid UTF-8"))?
            .into_owned();

        let (path, params) = match selector.split_once("::") {
            Some((path, params)) => (path, PatchParams::parse(params)),
            None => (selector, PatchParams::default()),
        };
        if path.is_empty() {
            return Err(IdentError::new(reference, "patch reference has no path"));
        }

        Ok(Self {
            source,
            path: path.to_string(),
            params,
        })
    }

    /// The decoded nested locator or descriptor text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Patch path with any leading `./` removed, or a builtin name such as
    /// `~builtin<compat/resolve>`.
    #[must_use]
    pub fn path(&self) -> &str {
        strip_dot_slash(&self.path)
    }

    /// Individual patch files when several are chained with `&`.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.path.split('&').map(strip_dot_slash)
    }

    /// True for Yarn's builtin compatibility patches.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.path.starts_with("~builtin<")
    }

    #[must_use]
    pub fn params(&self) -> &PatchParams {
        &self.params
    }

    /// The nested source as a locator (`lodash@npm:4.17.21`).
    pub fn base_locator(&self) -> Result<Locator, IdentError> {
        Locator::parse(&self.source)
    }

    /// The nested source as a descriptor (`resolve@^1.20.0`).
    pub fn base_descriptor(&self) -> Result<Descriptor, IdentError> {
        Descriptor::parse(&self.source)
    }
}

fn strip_dot_slash(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// Ordered `key=value` parameters trailing a patch reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchParams(Vec<(String, String)>);

impl PatchParams {
    fn parse(text: &str) -> Self {
        Self(
            form_urlencoded::parse(text.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LODASH_PATCH: &str = "lodash@patch:lodash@npm%3A4.17.21#./.yarn/patches/lodash-npm-4.17.21-6382451519.patch::version=4.17.21&hash=2c6e9e&locator=berry-patch%40workspace%3A.";
    const RESOLVE_PATCH: &str = "resolve@patch:resolve@npm%3A2.0.0-next.4#~builtin<compat/resolve>::version=2.0.0-next.4&hash=07638b";

    #[test]
    fn test_parse_ident() {
        let ident = Ident::parse("@babel/core").unwrap();
        assert_eq!(ident.scope(), Some("babel"));
        assert_eq!(ident.name(), "core");
        assert_eq!(ident.to_string(), "@babel/core");

        let ident = Ident::parse("react").unwrap();
        assert_eq!(ident.scope(), None);
        assert_eq!(ident.to_string(), "react");
    }

    #[test]
    fn test_parse_locator() {
        let locator = Locator::parse("@babel/types@npm:7.20.0").unwrap();
        assert_eq!(locator.ident(), &Ident::new(Some("babel"), "types"));
        assert_eq!(locator.reference(), "npm:7.20.0");
        assert_eq!(locator.protocol(), Some(Protocol::Npm));
        assert_eq!(locator.to_string(), "@babel/types@npm:7.20.0");
    }

    #[test]
    fn test_parse_workspace_locator() {
        let locator = Locator::parse("eslint-config-custom@workspace:packages/eslint-config-custom")
            .unwrap();
        assert_eq!(
            locator.workspace_path(),
            Some("packages/eslint-config-custom")
        );

        let root = Locator::parse("berry-patch@workspace:.").unwrap();
        assert_eq!(root.workspace_path(), Some("."));
    }

    #[test]
    fn test_parse_descriptor_without_protocol() {
        let descriptor = Descriptor::parse("eslint-config-custom@*").unwrap();
        assert_eq!(descriptor.range(), "*");
        assert_eq!(descriptor.protocol(), None);

        let descriptor = Descriptor::parse("js-tokens@npm:^3.0.0 || ^4.0.0").unwrap();
        assert_eq!(descriptor.range(), "npm:^3.0.0 || ^4.0.0");
        assert_eq!(descriptor.protocol(), Some(Protocol::Npm));
    }

    #[test]
    fn test_parse_descriptor_npm_alias() {
        let descriptor = Descriptor::parse("string-width-cjs@npm:string-width@^4.2.0").unwrap();
        assert_eq!(descriptor.ident().name(), "string-width-cjs");
        assert_eq!(descriptor.range(), "npm:string-width@^4.2.0");
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(Locator::parse("lodash").is_err());
        assert!(Locator::parse("lodash@").is_err());
        assert!(Locator::parse("lodash@4.17.21").is_err());
        assert!(Locator::parse("lodash@bogus:4.17.21").is_err());
        assert!(Locator::parse("@babel@npm:7.0.0").is_err());
        assert!(Locator::parse("@/core@npm:7.0.0").is_err());
        assert!(Descriptor::parse("lodash").is_err());
        assert!(Descriptor::parse("@scope").is_err());
        assert!(Descriptor::parse("lodash@nope:^4").is_err());
        assert!(Descriptor::parse("lodash@patch:lodash@npm%3A4.17.21").is_err());
        assert!(Ident::parse("").is_err());
    }

    #[test]
    fn test_split_protocol() {
        assert_eq!(split_protocol("npm:^4.0.0"), ("npm:", "^4.0.0"));
        assert_eq!(split_protocol("^4.0.0"), ("", "^4.0.0"));
        assert_eq!(split_protocol("workspace:*"), ("workspace:", "*"));
        assert_eq!(
            split_protocol("git+ssh://git@github.com/a/b.git"),
            ("git+ssh:", "//git@github.com/a/b.git")
        );
        assert_eq!(split_protocol(">=1.0.0 <2.0.0"), ("", ">=1.0.0 <2.0.0"));
    }

    #[test]
    fn test_patch_path_extraction() {
        let locator = Locator::parse(LODASH_PATCH).unwrap();
        assert_eq!(
            locator.patch_path().as_deref(),
            Some(".yarn/patches/lodash-npm-4.17.21-6382451519.patch")
        );

        let locator = Locator::parse("lodash@npm:4.17.21").unwrap();
        assert_eq!(locator.patch_path(), None);

        let locator = Locator::parse(RESOLVE_PATCH).unwrap();
        assert_eq!(
            locator.patch_path().as_deref(),
            Some("~builtin<compat/resolve>")
        );
    }

    #[test]
    fn test_patch_source_and_params() {
        let patch = Locator::parse(LODASH_PATCH).unwrap().patch().unwrap();
        assert_eq!(patch.source(), "lodash@npm:4.17.21");
        assert_eq!(
            patch.base_locator().unwrap(),
            Locator::parse("lodash@npm:4.17.21").unwrap()
        );
        assert_eq!(patch.params().get("version"), Some("4.17.21"));
        assert_eq!(patch.params().get("hash"), Some("2c6e9e"));
        assert_eq!(
            patch.params().get("locator"),
            Some("berry-patch@workspace:.")
        );
        let keys: Vec<_> = patch.params().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["version", "hash", "locator"]);
        assert!(!patch.is_builtin());
    }

    #[test]
    fn test_builtin_patch() {
        let patch = Locator::parse(RESOLVE_PATCH).unwrap().patch().unwrap();
        assert!(patch.is_builtin());
        assert_eq!(
            patch.base_locator().unwrap().to_string(),
            "resolve@npm:2.0.0-next.4"
        );
    }

    #[test]
    fn test_patch_descriptor_without_params() {
        let descriptor =
            Descriptor::parse("resolve@patch:resolve@^1.20.0#~builtin<compat/resolve>").unwrap();
        let patch = descriptor.patch().unwrap();
        assert!(patch.params().is_empty());
        assert_eq!(patch.base_descriptor().unwrap().range(), "^1.20.0");
    }

    #[test]
    fn test_scoped_patch_source() {
        let locator = Locator::parse(
            "@types/node@patch:@types/node@npm%3A18.0.0#./patches/a.patch&./patches/b.patch::version=18.0.0&hash=abc123",
        )
        .unwrap();
        let patch = locator.patch().unwrap();
        assert_eq!(patch.source(), "@types/node@npm:18.0.0");
        let paths: Vec<_> = patch.paths().collect();
        assert_eq!(paths, ["patches/a.patch", "patches/b.patch"]);
    }
}
