//! cmdlink: fetch a remote command script and dispatch it to the host shell.
//!
//! Every invocation loads config and stores from the data directory
//! (`.cmdlink/` by default), runs one surface command and flushes the stores
//! on exit.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cmdlink::commands::{App, StdoutReply};
use cmdlink::core::types::Actor;
use cmdlink::exit_codes;
use cmdlink::io::config::load_or_init_config;
use cmdlink::io::fetcher::HttpFetcher;
use cmdlink::io::host::ShellHost;
use cmdlink::io::paths::{DEFAULT_DATA_DIR, DataPaths};
use cmdlink::logging;
use tracing::debug;

/// First word that switches the binary into completion mode.
const COMPLETE_WORD: &str = "complete";

#[derive(Parser, Debug)]
#[command(
    name = "cmdlink",
    version,
    about = "Fetch a remote command script and dispatch it line by line",
    disable_help_subcommand = true
)]
struct Cli {
    /// Directory holding config.toml, storage.json and modes.json.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Act as this interactive actor instead of the console.
    #[arg(long, value_name = "ID")]
    actor: Option<String>,

    /// Subcommand and its arguments, e.g. `run aB12cD` or `storage daily run`.
    /// `complete <words...>` prints completion candidates instead.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

fn main() {
    logging::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::INVALID);
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = DataPaths::new(cli.data_dir.clone());
    paths.ensure_root()?;
    let cfg = load_or_init_config(&paths.config_path)?;

    let actor = match &cli.actor {
        Some(id) => Actor::interactive(id.as_str(), cfg.permissions_for(id)),
        None => Actor::console(),
    };
    debug!(actor = %actor.id, data_dir = %paths.root.display(), "starting");

    let host = ShellHost::new(&cfg.host);
    let app = App::open(&paths, cfg, HttpFetcher, host)?;

    match cli.args.split_first() {
        Some((first, words)) if first == COMPLETE_WORD => {
            for candidate in app.complete(&actor, words) {
                println!("{candidate}");
            }
        }
        _ => app.execute(&actor, &cli.args, &StdoutReply),
    }
    app.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_to_console_and_data_dir() {
        let cli = Cli::parse_from(["cmdlink", "run", "aB12cD"]);
        assert_eq!(cli.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(cli.actor, None);
        assert_eq!(cli.args, vec!["run", "aB12cD"]);
    }

    #[test]
    fn parse_global_options_before_words() {
        let cli = Cli::parse_from([
            "cmdlink",
            "--data-dir",
            "/tmp/x",
            "--actor",
            "alice",
            "mode",
            "restricted",
        ]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(cli.actor.as_deref(), Some("alice"));
        assert_eq!(cli.args, vec!["mode", "restricted"]);
    }

    #[test]
    fn parse_help_word_as_surface_command() {
        let cli = Cli::parse_from(["cmdlink", "help"]);
        assert_eq!(cli.args, vec!["help"]);
    }

    #[test]
    fn parse_no_words() {
        let cli = Cli::parse_from(["cmdlink"]);
        assert!(cli.args.is_empty());
    }
}
