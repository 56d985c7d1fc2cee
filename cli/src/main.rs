use std::{future::Future, io, process::ExitCode};

use beatoven::BeatovenClient;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail},
};
use log::{error, info, warn};

mod cli;
mod logging;

use cli::Cli;

/// Conventional exit status after SIGINT
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(e) = color_eyre::install() {
        eprintln!("Error: {e:?}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = logging::init(args.verbose, args.log_file.as_deref()) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    tokio::select! {
        res = run(&args) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
        () = interrupted(tokio::signal::ctrl_c()) => {
            warn!("Interrupted, remote compositions keep running on the server");
            ExitCode::from(INTERRUPTED)
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C, interrupting will not exit cleanly: {e}");
        std::future::pending::<()>().await;
    }
}

/// Prints every produced path on stdout
async fn run(args: &Cli) -> Result<()> {
    let client = BeatovenClient::from_env(&args.overrides(), args.env_file.as_deref())
        .wrap_err("resolving settings")?;

    let mut jobs = args.jobs();
    if jobs.len() == 1 {
        let options = jobs.remove(0);
        let path = client.generate_music(&options).await?;
        info!("Music generated successfully, saved to {}", path.display());
        println!("{}", path.display());
        return Ok(());
    }

    let total = jobs.len();
    let mut failed = 0;
    for (idx, res) in client.generate_batch(jobs).await.into_iter().enumerate() {
        match res {
            Ok(path) => {
                info!("Track {} of {total} saved to {}", idx + 1, path.display());
                println!("{}", path.display());
            }
            Err(e) => {
                let e = color_eyre::Report::new(e);
                error!("Track {} of {total} failed: {e:#}", idx + 1);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} generations failed");
    }
    Ok(())
}
