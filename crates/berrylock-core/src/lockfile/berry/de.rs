//! Decoding Yarn Berry lockfile text.
//!
//! The lockfile is written in Yarn's "syml" dialect: a YAML subset with
//! 2-space indented maps, `key: value` scalars and JSON-quoted strings.
//! Decoding happens in two steps: the text is parsed into a generic tree of
//! [`Node`]s, then the tree is converted into typed blocks.

use std::collections::BTreeMap;

use super::entry::{DependencyMeta, LinkType, LockfileEntry, Metadata, PeerDependencyMeta};
use super::identity::{Descriptor, Locator};
use super::{BerryLockfile, EntryBlock, METADATA_KEY};
use crate::error::DecodeError;

/// Separator between aliased descriptors in a block heading.
pub(crate) const HEADING_SEPARATOR: &str = ", ";

/// Decode lockfile bytes into a store.
#[tracing::instrument(skip_all, fields(bytes = input.len()))]
pub fn decode(input: &[u8]) -> Result<BerryLockfile, DecodeError> {
    let text = std::str::from_utf8(input)?;
    let (header, lines) = split_lines(text)?;
    let nodes = Parser { lines, pos: 0 }.parse_document()?;

    let mut metadata = None;
    let mut blocks = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.key == METADATA_KEY {
            metadata = Some(convert_metadata(node)?);
        } else {
            blocks.push(convert_block(node)?);
        }
    }
    let metadata = metadata.ok_or(DecodeError::MissingMetadata)?;

    let lockfile = BerryLockfile::from_blocks(header, metadata, blocks)?;
    tracing::debug!(
        entries = lockfile.len(),
        patches = lockfile.patches().count(),
        extensions = lockfile.package_extensions().len(),
        "decoded berry lockfile"
    );
    Ok(lockfile)
}

/// A key and its value, with the 1-based line the key appeared on.
#[derive(Debug)]
struct Node {
    key: String,
    line: usize,
    value: Value,
}

#[derive(Debug)]
enum Value {
    Scalar(String),
    Map(Vec<Node>),
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

/// Separate leading `#` comments from content lines.
///
/// Blank lines and later comments carry no data and are dropped.
fn split_lines(text: &str) -> Result<(Vec<String>, Vec<Line<'_>>), DecodeError> {
    let mut header = Vec::new();
    let mut lines = Vec::new();
    let mut in_header = true;

    for (index, raw) in text.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if in_header && raw.starts_with('#') {
            header.push(raw.to_string());
            continue;
        }
        in_header = false;

        let content = raw.trim_start_matches(' ');
        if content.trim().is_empty() || content.starts_with('#') {
            continue;
        }
        if content.starts_with('\t') {
            return Err(DecodeError::syntax(index + 1, "tabs are not allowed in indentation"));
        }
        lines.push(Line {
            number: index + 1,
            indent: raw.len() - content.len(),
            text: content.trim_end(),
        });
    }

    Ok((header, lines))
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_document(&mut self) -> Result<Vec<Node>, DecodeError> {
        if let Some(first) = self.lines.first() {
            if first.indent != 0 {
                return Err(DecodeError::syntax(first.number, "document must start at column 0"));
            }
        }
        self.parse_map(0)
    }

    fn parse_map(&mut self, indent: usize) -> Result<Vec<Node>, DecodeError> {
        let mut nodes = Vec::new();

        while let Some(line) = self.lines.get(self.pos).copied() {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(DecodeError::syntax(line.number, "unexpected indentation"));
            }
            self.pos += 1;

            let node = if let Some(long_key) = line.text.strip_prefix("? ") {
                self.parse_long_key(line, long_key)?
            } else {
                let (key, rest) = split_key(line.text, line.number)?;
                let rest = rest.trim_start();
                let value = if rest.is_empty() {
                    Value::Map(self.parse_children(indent)?)
                } else {
                    Value::Scalar(parse_scalar(rest, line.number)?)
                };
                Node {
                    key,
                    line: line.number,
                    value,
                }
            };
            nodes.push(node);
        }

        Ok(nodes)
    }

    /// `? "key"` followed by a `:` line at the same indentation.
    fn parse_long_key(&mut self, line: Line<'_>, key_text: &str) -> Result<Node, DecodeError> {
        let key = parse_scalar(key_text.trim(), line.number)?;
        match self.lines.get(self.pos) {
            Some(colon) if colon.indent == line.indent && colon.text == ":" => self.pos += 1,
            _ => {
                return Err(DecodeError::syntax(
                    line.number,
                    "long key is not followed by ':'",
                ))
            }
        }
        Ok(Node {
            key,
            line: line.number,
            value: Value::Map(self.parse_children(line.indent)?),
        })
    }

    fn parse_children(&mut self, indent: usize) -> Result<Vec<Node>, DecodeError> {
        match self.lines.get(self.pos) {
            Some(next) if next.indent > indent => self.parse_map(next.indent),
            _ => Ok(Vec::new()),
        }
    }
}

/// Split `key: rest` into the decoded key and the text after the colon.
fn split_key(text: &str, line: usize) -> Result<(String, &str), DecodeError> {
    let (key, rest) = if text.starts_with('"') {
        let end = quoted_end(text)
            .ok_or_else(|| DecodeError::syntax(line, "unterminated quoted key"))?;
        (unquote(&text[..end], line)?, &text[end..])
    } else {
        let colon = text
            .find(':')
            .ok_or_else(|| DecodeError::syntax(line, "expected ':' after key"))?;
        (text[..colon].to_string(), &text[colon..])
    };

    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| DecodeError::syntax(line, "expected ':' after key"))?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return Err(DecodeError::syntax(line, "expected a space after ':'"));
    }
    Ok((key, rest))
}

fn parse_scalar(text: &str, line: usize) -> Result<String, DecodeError> {
    if !text.starts_with('"') {
        return Ok(text.to_string());
    }
    let end =
        quoted_end(text).ok_or_else(|| DecodeError::syntax(line, "unterminated quoted string"))?;
    if end != text.len() {
        return Err(DecodeError::syntax(line, "unexpected text after quoted string"));
    }
    unquote(text, line)
}

/// Byte offset just past the closing quote of a string starting at `text[0]`.
fn quoted_end(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn unquote(quoted: &str, line: usize) -> Result<String, DecodeError> {
    serde_json::from_str(quoted)
        .map_err(|e| DecodeError::syntax(line, format!("invalid quoted string: {e}")))
}

fn convert_metadata(node: Node) -> Result<Metadata, DecodeError> {
    let Value::Map(fields) = node.value else {
        return Err(DecodeError::InvalidMetadata("expected a map".into()));
    };

    let mut version = None;
    let mut cache_key = None;
    for field in fields {
        let Value::Scalar(value) = field.value else {
            return Err(DecodeError::InvalidMetadata(format!(
                "'{}' must be a scalar",
                field.key
            )));
        };
        match field.key.as_str() {
            "version" => {
                let parsed = value.parse::<u32>().map_err(|_| {
                    DecodeError::InvalidMetadata(format!("version '{value}' is not an integer"))
                })?;
                version = Some(parsed);
            }
            "cacheKey" => cache_key = Some(value),
            other => {
                return Err(DecodeError::InvalidMetadata(format!(
                    "unknown field '{other}'"
                )))
            }
        }
    }

    let version = version.ok_or_else(|| DecodeError::InvalidMetadata("missing version".into()))?;
    let cache_key =
        cache_key.ok_or_else(|| DecodeError::InvalidMetadata("missing cacheKey".into()))?;
    Ok(Metadata::new(version, cache_key))
}

fn convert_block(node: Node) -> Result<EntryBlock, DecodeError> {
    let heading = node.key;
    let line = node.line;
    let Value::Map(fields) = node.value else {
        return Err(DecodeError::entry(&heading, line, "expected a map of fields"));
    };

    let descriptors = heading
        .split(HEADING_SEPARATOR)
        .map(Descriptor::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = EntryBuilder::default();
    for field in fields {
        builder.field(&heading, field)?;
    }
    let entry = builder.finish(&heading, line)?;
    let locator = Locator::parse(&entry.resolution)?;

    Ok(EntryBlock {
        descriptors,
        locator,
        entry,
    })
}

/// Collects entry fields, rejecting duplicates and unknown keys.
#[derive(Default)]
struct EntryBuilder {
    version: Option<String>,
    resolution: Option<String>,
    dependencies: Option<BTreeMap<String, String>>,
    peer_dependencies: Option<BTreeMap<String, String>>,
    dependencies_meta: Option<BTreeMap<String, DependencyMeta>>,
    peer_dependencies_meta: Option<BTreeMap<String, PeerDependencyMeta>>,
    bin: Option<BTreeMap<String, String>>,
    checksum: Option<String>,
    conditions: Option<String>,
    language_name: Option<String>,
    link_type: Option<LinkType>,
}

impl EntryBuilder {
    fn field(&mut self, heading: &str, field: Node) -> Result<(), DecodeError> {
        let line = field.line;
        let err = |message: String| DecodeError::entry(heading, line, message);
        let key = field.key;

        let duplicate = match key.as_str() {
            "version" => set_once(&mut self.version, scalar(field.value, &key).map_err(err)?),
            "resolution" => set_once(&mut self.resolution, scalar(field.value, &key).map_err(err)?),
            "dependencies" => {
                set_once(&mut self.dependencies, string_map(field.value, &key).map_err(err)?)
            }
            "peerDependencies" => set_once(
                &mut self.peer_dependencies,
                string_map(field.value, &key).map_err(err)?,
            ),
            "bin" => set_once(&mut self.bin, string_map(field.value, &key).map_err(err)?),
            "dependenciesMeta" => set_once(
                &mut self.dependencies_meta,
                dependencies_meta(field.value).map_err(err)?,
            ),
            "peerDependenciesMeta" => set_once(
                &mut self.peer_dependencies_meta,
                peer_dependencies_meta(field.value).map_err(err)?,
            ),
            "checksum" => set_once(&mut self.checksum, scalar(field.value, &key).map_err(err)?),
            "conditions" => set_once(&mut self.conditions, scalar(field.value, &key).map_err(err)?),
            "languageName" => {
                set_once(&mut self.language_name, scalar(field.value, &key).map_err(err)?)
            }
            "linkType" => {
                let text = scalar(field.value, &key).map_err(err)?;
                let link = LinkType::parse(&text)
                    .ok_or_else(|| err(format!("unknown linkType '{text}'")))?;
                set_once(&mut self.link_type, link)
            }
            _ => return Err(err(format!("unknown field '{key}'"))),
        };

        if duplicate {
            return Err(err(format!("duplicate field '{key}'")));
        }
        Ok(())
    }

    fn finish(self, heading: &str, line: usize) -> Result<LockfileEntry, DecodeError> {
        let version = self
            .version
            .ok_or_else(|| DecodeError::entry(heading, line, "missing 'version'"))?;
        let resolution = self
            .resolution
            .ok_or_else(|| DecodeError::entry(heading, line, "missing 'resolution'"))?;

        Ok(LockfileEntry {
            version,
            resolution,
            dependencies: self.dependencies.unwrap_or_default(),
            peer_dependencies: self.peer_dependencies.unwrap_or_default(),
            dependencies_meta: self.dependencies_meta.unwrap_or_default(),
            peer_dependencies_meta: self.peer_dependencies_meta.unwrap_or_default(),
            bin: self.bin.unwrap_or_default(),
            checksum: self.checksum,
            conditions: self.conditions,
            language_name: self.language_name,
            link_type: self.link_type,
        })
    }
}

/// Store `value`, returning true if the slot was already filled.
fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    slot.replace(value).is_some()
}

fn scalar(value: Value, key: &str) -> Result<String, String> {
    match value {
        Value::Scalar(s) => Ok(s),
        Value::Map(_) => Err(format!("'{key}' must be a scalar")),
    }
}

fn map(value: Value, key: &str) -> Result<Vec<Node>, String> {
    match value {
        Value::Map(nodes) => Ok(nodes),
        Value::Scalar(_) => Err(format!("'{key}' must be a map")),
    }
}

fn string_map(value: Value, key: &str) -> Result<BTreeMap<String, String>, String> {
    map(value, key)?
        .into_iter()
        .map(|node| {
            let value = scalar(node.value, &node.key)?;
            Ok((node.key, value))
        })
        .collect()
}

fn boolean(value: Value, key: &str) -> Result<bool, String> {
    match scalar(value, key)?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("'{key}' must be true or false, got '{other}'")),
    }
}

fn dependencies_meta(value: Value) -> Result<BTreeMap<String, DependencyMeta>, String> {
    let mut result = BTreeMap::new();
    for dep in map(value, "dependenciesMeta")? {
        let mut meta = DependencyMeta::default();
        for flag in map(dep.value, &dep.key)? {
            let enabled = boolean(flag.value, &flag.key)?;
            match flag.key.as_str() {
                "built" => meta.built = Some(enabled),
                "optional" => meta.optional = Some(enabled),
                "unplugged" => meta.unplugged = Some(enabled),
                other => return Err(format!("unknown dependenciesMeta flag '{other}'")),
            }
        }
        result.insert(dep.key, meta);
    }
    Ok(result)
}

fn peer_dependencies_meta(value: Value) -> Result<BTreeMap<String, PeerDependencyMeta>, String> {
    let mut result = BTreeMap::new();
    for dep in map(value, "peerDependenciesMeta")? {
        let mut meta = PeerDependencyMeta::default();
        for flag in map(dep.value, &dep.key)? {
            let enabled = boolean(flag.value, &flag.key)?;
            match flag.key.as_str() {
                "optional" => meta.optional = Some(enabled),
                other => return Err(format!("unknown peerDependenciesMeta flag '{other}'")),
            }
        }
        result.insert(dep.key, meta);
    }
    Ok(result)
}
