#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

mod commands;
mod logging;

use clap::{CommandFactory, Parser};
use miette::Result;
use std::path::PathBuf;

const EXAMPLE: &str = "Example:
  npm-migrate-all --from https://registry.npmjs.org/ --to http://localhost:4873/ @my/pkg1 @my/pkg2";

#[derive(Parser, Debug)]
#[command(name = "npm-migrate-all")]
#[command(author, version, about = "Copy npm packages between registries", long_about = None)]
#[command(after_help = EXAMPLE)]
struct Cli {
    /// Source registry URL
    #[arg(long, value_name = "URL")]
    from: Option<String>,

    /// Destination registry URL
    #[arg(long, value_name = "URL")]
    to: Option<String>,

    /// Packages to migrate (name, @scope/name or name@version)
    #[arg(value_name = "PKG")]
    packages: Vec<String>,

    /// Maximum concurrent registry operations [env: NPM_MIGRATE_CONCURRENCY]
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Stage tarballs here instead of a temporary directory
    #[arg(long, value_name = "PATH")]
    staging_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit the result as JSON and log JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (Some(from), Some(to)) = (cli.from.as_deref(), cli.to.as_deref()) else {
        usage();
    };
    if cli.packages.is_empty() {
        usage();
    }

    logging::init(cli.verbose, cli.json);

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let args = commands::migrate::MigrateArgs {
        from,
        to,
        packages: &cli.packages,
        concurrency: cli.concurrency,
        staging_dir: cli.staging_dir.clone(),
        json: cli.json,
    };
    commands::migrate::run(&cwd, &args)
}

/// Print usage to stdout and exit with status 1.
fn usage() -> ! {
    let mut command = Cli::command();
    println!("{}", command.render_help());
    std::process::exit(1);
}
