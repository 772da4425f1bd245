use clap::Parser;
use env_logger::Env;
use prepull_singularity::args::{self, Args};
use prepull_singularity::errors::*;
use prepull_singularity::prepull::Prepull;
use prepull_singularity::resolver::{Endpoints, Resolver};
use std::io;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(Env::default().default_filter_or(log_level));

    if let Some(shell) = args.completions {
        args::generate_completions(shell, io::stdout())?;
        return Ok(ExitCode::SUCCESS);
    }
    args.validate()?;

    let path = args
        .input
        .as_deref()
        .context("Missing path to the image list")?;

    let resolver = if args.use_digest {
        Some(Resolver::new(Endpoints::default())?)
    } else {
        None
    };
    let prepull = Prepull {
        puller: args.puller(),
        resolver,
        stop_on_failure: args.stop_on_failure,
    };

    let summary = prepull.run_file(path).await?;
    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
