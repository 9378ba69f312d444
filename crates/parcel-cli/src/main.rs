use clap::Parser;
use parcel_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // File logging first; stderr when the state directory is unusable.
    if let Err(err) = logging::init_logging(cli.verbose()) {
        logging::init_logging_stderr(cli.verbose());
        tracing::warn!("file logging unavailable: {:#}", err);
    }

    if let Err(err) = cli.run().await {
        eprintln!("parcel error: {:#}", err);
        std::process::exit(1);
    }
}
