#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use clap::Parser;
use miette::Result;

use crate::config::{Config, DEFAULT_LOCKFILE};

#[derive(Parser, Debug)]
#[command(name = "berrylock")]
#[command(author, version, about = "Inspect and prune Yarn Berry lockfiles", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Lockfile to read, relative to the working directory
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "BERRYLOCK_LOCKFILE",
        default_value = DEFAULT_LOCKFILE
    )]
    lockfile: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve a package name and range to its locked version
    Resolve {
        /// Package name (e.g., "react" or "@babel/core")
        name: String,

        /// Requested range (e.g., "^18.2.0" or "npm:^4.0.0")
        range: String,
    },

    /// Print the dependencies of a locked package
    Deps {
        /// Locator of the package (e.g., "react-dom@npm:18.2.0")
        locator: String,
    },

    /// Write a lockfile containing only what the given workspaces need
    Prune {
        /// Workspace path to keep (repeatable, e.g., "packages/web")
        #[arg(long = "workspace", short = 'w', value_name = "PATH")]
        workspaces: Vec<String>,

        /// Extra package to keep (repeatable, e.g., "lodash@npm:4.17.21")
        #[arg(long = "package", short = 'p', value_name = "SPEC")]
        packages: Vec<String>,

        /// Output file (if not specified, prints to stdout)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check that the lockfile re-encodes byte for byte
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_lockfile(cli.lockfile)
        .with_verbosity(cli.verbose)
        .with_json(cli.json);

    logging::init(config.verbosity, config.json);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve { name, range }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve");
            let _guard = span.enter();
            commands::resolve::run(&config, &name, &range)
        }
        Some(Commands::Deps { locator }) => {
            let span = tracing::info_span!("deps", cmd = "deps");
            let _guard = span.enter();
            commands::deps::run(&config, &locator)
        }
        Some(Commands::Prune {
            workspaces,
            packages,
            output,
        }) => {
            let span = tracing::info_span!("prune", cmd = "prune", cwd = %config.cwd.display());
            let _guard = span.enter();
            commands::prune::run(&config, &workspaces, &packages, output.as_deref())
        }
        Some(Commands::Check) => {
            let span = tracing::info_span!("check", cmd = "check");
            let _guard = span.enter();
            commands::check::run(&config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_prune() {
        let cli = Cli::parse_from([
            "berrylock",
            "--lockfile",
            "custom.lock",
            "prune",
            "-w",
            "packages/a",
            "--workspace",
            "packages/c",
            "-p",
            "lodash@npm:4.17.21",
            "-o",
            "out/yarn.lock",
        ]);
        assert_eq!(cli.lockfile, PathBuf::from("custom.lock"));
        let Some(Commands::Prune {
            workspaces,
            packages,
            output,
        }) = cli.command
        else {
            panic!("expected prune");
        };
        assert_eq!(workspaces, ["packages/a", "packages/c"]);
        assert_eq!(packages, ["lodash@npm:4.17.21"]);
        assert_eq!(output, Some(PathBuf::from("out/yarn.lock")));
    }
}
