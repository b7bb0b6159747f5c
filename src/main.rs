use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod capture;
mod cli;
mod cursor;
mod display;
mod error;
mod geometry;
mod output;
mod selection;
mod selection_logic;

use cli::Cli;
use display::Session;
use output::Target;

const LOG_ENV: &str = "XSNIP_LOG";

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    let target = Target::detect()?;

    let mut session = Session::connect()?;
    if config.freeze {
        session.freeze()?;
    }
    let area = capture::resolve(&session, &config.mode)?;
    let buffer = capture::grab(&session, area, config.cursor)?;
    session.thaw()?;
    drop(session);

    output::deliver(&buffer, target)?;
    Ok(())
}

fn main() {
    // Usage errors share the exit status of every other failure.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{}: {:#}", env!("CARGO_PKG_NAME"), err);
        std::process::exit(1);
    }
}
