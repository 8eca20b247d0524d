//! Glue between the parsed command line and the library: logging setup and dispatch.

use std::io;

use tracing::Level;

use crate::cli::{Args, Commands};
use crate::{compress, extract, ArchiverError};

/// Installs the stderr log subscriber. `verbose` lowers the threshold from WARN to DEBUG.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Runs the operation selected by `args`.
pub fn run_cli_app(args: &Args) -> Result<(), ArchiverError> {
    let options = args.options();

    match args.command()? {
        Commands::Create { sources, archive } => {
            let summary = compress::compress_paths(&sources, &archive, &options)?;
            if args.verbose {
                let names: Vec<String> = sources.iter().map(|s| s.display().to_string()).collect();
                println!("{} -> {}: {}", names.join(" "), archive.display(), summary);
            }
        }
        Commands::Extract { archive, destination } => {
            let summary = extract::extract(&archive, &destination, &options)?;
            if args.verbose {
                println!("{} -> {}: {}", archive.display(), destination.display(), summary);
            }
        }
        Commands::List { archive } => {
            let stdout = io::stdout();
            extract::list_files(&archive, &mut stdout.lock())?;
        }
    }

    Ok(())
}
