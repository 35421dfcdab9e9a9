//! `berrylock resolve` command implementation.
//!
//! Resolve a package name and range to its locked version.

use miette::Result;

use super::load_lockfile;
use crate::config::Config;

/// Run the resolve command. Exits with status 1 when nothing matches.
pub fn run(config: &Config, name: &str, range: &str) -> Result<()> {
    let lockfile = load_lockfile(config)?;

    let Some(package) = lockfile.resolve_package(name, range) else {
        if config.json {
            println!(
                "{}",
                serde_json::json!({
                    "ok": false,
                    "name": name,
                    "range": range,
                })
            );
        } else {
            eprintln!("{name}@{range} is not in the lockfile");
        }
        std::process::exit(1);
    };

    if config.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "key": package.key,
                "version": package.version,
            })
        );
    } else {
        println!("{} {}", package.key, package.version);
    }

    Ok(())
}
