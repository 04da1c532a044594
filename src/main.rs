use anyhow::Result;
use clap::{CommandFactory, Parser};
use color_print::cstr;
use log::{info, warn};
use nix::unistd::Uid;
use std::env;
use std::io;
use std::path::PathBuf;

mod config;
mod error;
mod manager;
mod menu;
mod runner;
mod snapshot;
mod utils;

use error::SnapError;
use manager::SnapshotManager;
use menu::Session;
use runner::SystemRunner;

const AFTER_HELP: &str = cstr!(
    r#"
<bold><underline>EXAMPLES:</underline></bold>
  snapzap -v /Volumes/MyVolume --list   Print the snapshot list and exit
  snapzap -v MyVolume                   Show a menu of options
  snapzap -v MyVolume --purge-all       Purge every snapshot after you confirm

  Typing '/Volumes/' before the volume name is optional as long as the
  volume is mounted there.

<bold><underline>ENVIRONMENT VARIABLES:</underline></bold>
  <bold>SNAPZAP_CONFIG</bold>
      Path to the TOML configuration file (e.g., ~/.config/snapzap.toml).
      Used when --config is not given.
"#
);

#[derive(Parser)]
#[command(
    about = "Cleans up snapshots on APFS volumes in macOS",
    version,
    after_help = AFTER_HELP
)]
struct Cli {
    /// Volume (ex: -v /Volumes/Name)
    #[arg(short = 'v', long = "volume", value_name = "PATH")]
    volume: Option<String>,
    /// List snapshots and exit (ex: -v /Volumes/Name -l)
    #[arg(short = 'l', long = "list")]
    list: bool,
    /// Purge ALL snapshots
    #[arg(short = 'p', long = "purge-all", visible_alias = "purgeAll")]
    purge_all: bool,
    /// Path to configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    info!("Starting snapzap");

    // Parse CLI arguments, handling errors explicitly
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if cli.volume.is_none() && (cli.list || cli.purge_all) {
        let flag = if cli.list { "-l" } else { "-p" };
        return Err(SnapError::Usage(format!(
            "You must pass in a volume name (-v) with the {} argument",
            flag
        ))
        .into());
    }

    // Nothing to act on: explicitly print help and exit
    let Some(volume_arg) = cli.volume else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config_path = cli
        .config
        .or_else(|| env::var("SNAPZAP_CONFIG").ok().map(PathBuf::from));
    let config = config::load(config_path)?;

    let volume = utils::resolve_volume(&volume_arg, &config.volume_root)?;
    let manager = SnapshotManager::new(SystemRunner, config.commands, config.pauses);

    if !manager.has_snapshots(&volume)? {
        println!("\n{} does not have any snapshots", volume.display());
        return Ok(());
    }

    if cli.list {
        info!("Listing snapshots on {}", volume.display());
        return manager.show_snapshot_list(&volume, &mut io::stdout().lock());
    }

    // Deleting APFS snapshots needs root, but let diskutil be the judge
    if !Uid::effective().is_root() {
        warn!("Not running as root");
        println!("Note: deleting snapshots usually requires sudo\n");
    }

    let mut session = Session::new(&manager, &volume, io::stdin().lock(), io::stdout())?;
    if cli.purge_all {
        info!("Purging all snapshots on {}", volume.display());
        let code = session.purge_all()?;
        std::process::exit(code);
    }
    info!("Starting interactive menu for {}", volume.display());
    session.run()
}
