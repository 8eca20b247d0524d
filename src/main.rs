//! Main entry point for the car CLI app

use car::{cli, cli_runner};

fn main() -> std::process::ExitCode {
    let args = match cli::run() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version also come through here, on stdout
            let _ = e.print();
            return if e.use_stderr() {
                std::process::ExitCode::FAILURE
            } else {
                std::process::ExitCode::SUCCESS
            };
        }
    };

    cli_runner::init_logging(args.verbose);

    if let Err(e) = cli_runner::run_cli_app(&args) {
        eprintln!("Error: {}", e);
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
