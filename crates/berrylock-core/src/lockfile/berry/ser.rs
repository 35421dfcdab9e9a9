//! Canonical lockfile writer.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::de::HEADING_SEPARATOR;
use super::entry::{LockfileEntry, Metadata};
use super::{BerryLockfile, METADATA_KEY};

/// Keys longer than this use the explicit `? key` form.
const LONG_KEY_THRESHOLD: usize = 1024;

const INDENT: &str = "  ";

fn simple_string() -> Option<&'static Regex> {
    static SIMPLE: OnceLock<Option<Regex>> = OnceLock::new();
    SIMPLE
        .get_or_init(|| {
            Regex::new(r#"^[^\-?:,\]\[{}#&*!|>'"%@` \t\r\n]([ \t]*[^,\]\[{}:# \t\r\n])*$"#).ok()
        })
        .as_ref()
}

/// Quote `value` unless it can be written bare.
pub(crate) fn quote(value: &str) -> String {
    if simple_string().is_some_and(|re| re.is_match(value)) {
        return value.to_string();
    }
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// Render the whole lockfile.
pub(crate) fn render(lockfile: &BerryLockfile) -> String {
    let mut out = String::new();
    for line in lockfile.header() {
        out.push_str(line);
        out.push('\n');
    }

    out.push('\n');
    write_metadata(&mut out, lockfile.metadata());

    for (descriptors, _, entry) in lockfile.entries() {
        out.push('\n');
        let heading = descriptors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(HEADING_SEPARATOR);
        write_key(&mut out, 0, &heading);
        out.push('\n');
        write_entry(&mut out, entry);
    }

    out
}

fn write_metadata(out: &mut String, metadata: &Metadata) {
    write_key(out, 0, METADATA_KEY);
    out.push('\n');
    write_scalar(out, 1, "version", &metadata.version.to_string());
    write_scalar(out, 1, "cacheKey", &metadata.cache_key);
}

fn write_entry(out: &mut String, entry: &LockfileEntry) {
    write_scalar(out, 1, "version", &entry.version);
    write_scalar(out, 1, "resolution", &entry.resolution);
    write_string_map(out, "dependencies", &entry.dependencies);
    write_string_map(out, "peerDependencies", &entry.peer_dependencies);

    if !entry.dependencies_meta.is_empty() {
        write_section(out, "dependenciesMeta");
        for (name, meta) in &entry.dependencies_meta {
            write_key(out, 2, name);
            out.push('\n');
            let flags = [
                ("built", meta.built),
                ("optional", meta.optional),
                ("unplugged", meta.unplugged),
            ];
            for (flag, value) in flags {
                if let Some(value) = value {
                    write_scalar(out, 3, flag, &value.to_string());
                }
            }
        }
    }

    if !entry.peer_dependencies_meta.is_empty() {
        write_section(out, "peerDependenciesMeta");
        for (name, meta) in &entry.peer_dependencies_meta {
            write_key(out, 2, name);
            out.push('\n');
            if let Some(optional) = meta.optional {
                write_scalar(out, 3, "optional", &optional.to_string());
            }
        }
    }

    write_string_map(out, "bin", &entry.bin);

    let trailing = [
        ("checksum", entry.checksum.as_deref()),
        ("conditions", entry.conditions.as_deref()),
        ("languageName", entry.language_name.as_deref()),
        ("linkType", entry.link_type.map(|link| link.as_str())),
    ];
    for (key, value) in trailing {
        if let Some(value) = value {
            write_scalar(out, 1, key, value);
        }
    }
}

fn write_section(out: &mut String, key: &str) {
    write_key(out, 1, key);
    out.push('\n');
}

fn write_string_map(out: &mut String, key: &str, map: &BTreeMap<String, String>) {
    if map.is_empty() {
        return;
    }
    write_section(out, key);
    for (name, value) in map {
        write_scalar(out, 2, name, value);
    }
}

fn write_scalar(out: &mut String, depth: usize, key: &str, value: &str) {
    write_key(out, depth, key);
    out.push(' ');
    out.push_str(&quote(value));
    out.push('\n');
}

/// Write `key:` without a trailing newline.
fn write_key(out: &mut String, depth: usize, key: &str) {
    let indent = INDENT.repeat(depth);
    let key = quote(key);
    out.push_str(&indent);
    if key.len() > LONG_KEY_THRESHOLD {
        out.push_str("? ");
        out.push_str(&key);
        out.push('\n');
        out.push_str(&indent);
    } else {
        out.push_str(&key);
    }
    out.push(':');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::berry::de::decode;

    #[test]
    fn test_quote_bare_values() {
        assert_eq!(quote("4.0.0"), "4.0.0");
        assert_eq!(quote("^3.0.0 || ^4.0.0"), "^3.0.0 || ^4.0.0");
        assert_eq!(quote("0.0.0-use.local"), "0.0.0-use.local");
        assert_eq!(quote("js-tokens"), "js-tokens");
        assert_eq!(quote("node"), "node");
        assert_eq!(quote("os=darwin & cpu=arm64"), "os=darwin & cpu=arm64");
    }

    #[test]
    fn test_quote_special_values() {
        assert_eq!(quote("*"), "\"*\"");
        assert_eq!(quote("@babel/core"), "\"@babel/core\"");
        assert_eq!(quote("js-tokens@npm:4.0.0"), "\"js-tokens@npm:4.0.0\"");
        assert_eq!(quote("npm:^4.0.0"), "\"npm:^4.0.0\"");
        assert_eq!(quote("-1"), "\"-1\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("trailing "), "\"trailing \"");
        assert_eq!(quote("#hash"), "\"#hash\"");
        assert_eq!(quote("a: b"), "\"a: b\"");
    }

    #[test]
    fn test_render_metadata_only() {
        let lockfile = BerryLockfile::new(Metadata::new(6, "8"));
        assert_eq!(
            render(&lockfile),
            "\n__metadata:\n  version: 6\n  cacheKey: 8\n"
        );
    }

    #[test]
    fn test_render_long_heading() {
        let ranges: Vec<String> = (0..120).map(|i| format!("a@npm:^1.{i}.0")).collect();
        let text = format!(
            "\n__metadata:\n  version: 6\n  cacheKey: 8\n\n? \"{}\"\n:\n  version: 1.200.0\n  resolution: \"a@npm:1.200.0\"\n",
            ranges.join(", ")
        );
        let lockfile = decode(text.as_bytes()).unwrap();
        assert_eq!(render(&lockfile), text);
    }

    #[test]
    fn test_render_all_fields_in_order() {
        let text = r#"
__metadata:
  version: 6
  cacheKey: 8

"fsevents@npm:^2.3.2":
  version: 2.3.2
  resolution: "fsevents@npm:2.3.2"
  dependencies:
    node-gyp: latest
  peerDependencies:
    "@types/node": "*"
  dependenciesMeta:
    node-gyp:
      built: false
      optional: true
  peerDependenciesMeta:
    "@types/node":
      optional: true
  bin:
    fsevents: bin/fsevents.js
  checksum: 97ade64e75091afee5265e6956cb72ba34db7819b4c3e94c431d4be2b19b8bb7a2d4116da417950c3425f17c8fe693d25e20212cac583ac1521ad066b77ae31f
  conditions: os=darwin
  languageName: node
  linkType: hard
"#;
        let lockfile = decode(text.as_bytes()).unwrap();
        assert_eq!(render(&lockfile), text);
    }
}
