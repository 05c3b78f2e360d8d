//! # Command Line Interface
//!
//! All subcommands are in the `commands` module, `cli.rs` builds the argument parser.

use env_logger;
use ckdkit::commands;

mod cli;

fn main() -> Result<(),Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let matches = cli::build_cli().get_matches();

    match matches.subcommand() {
        Some(("mkdsk",cmd)) => commands::mkdsk::mkdsk(cmd),
        Some(("import",cmd)) => commands::import::import(cmd),
        Some(("stat",cmd)) => commands::stat::stat(cmd),
        Some(("get",cmd)) => commands::get::get(cmd),
        Some(("commit",cmd)) => commands::commit::commit(cmd),
        _ => {
            eprintln!("No subcommand was found, try `ckdkit --help`");
            Err(Box::new(commands::CommandError::InvalidCommand))
        }
    }
}
