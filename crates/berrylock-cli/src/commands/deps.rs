//! `berrylock deps` command implementation.
//!
//! Print the dependencies and peer dependencies of a locked package.

use miette::Result;

use super::load_lockfile;
use crate::config::Config;

/// Run the deps command. Exits with status 1 when `key` is not locked.
pub fn run(config: &Config, key: &str) -> Result<()> {
    let lockfile = load_lockfile(config)?;

    let Some(dependencies) = lockfile.all_dependencies(key) else {
        if config.json {
            println!("{}", serde_json::json!({ "ok": false, "key": key }));
        } else {
            eprintln!("{key} is not in the lockfile");
        }
        std::process::exit(1);
    };

    if config.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "key": key,
                "dependencies": dependencies,
            })
        );
    } else {
        for (name, range) in &dependencies {
            println!("{name} {range}");
        }
    }

    Ok(())
}
