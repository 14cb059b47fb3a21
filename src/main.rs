use std::process::ExitCode;

use clap::Parser;
use etcdcfg::{Cli, EtcdcfgError, FsSource, MemoryStore, Settings, SnapshotStore, handle};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `ETCDCFG_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ETCDCFG_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<bool, EtcdcfgError> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let remote = cli.remote().cloned();
    let action = cli.into_action();

    let outcome = match remote {
        Some(path) => {
            let mut store = SnapshotStore::open(&path)?;
            let outcome = handle(&action, &settings, &FsSource, &mut store)?;
            store.save()?;
            outcome
        }
        None => handle(&action, &settings, &FsSource, &mut MemoryStore::new())?,
    };

    println!("{outcome}");
    Ok(outcome.is_success())
}
