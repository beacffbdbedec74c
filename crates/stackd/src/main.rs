//! Entry point for the `stackd` stack broker daemon.

use std::process::ExitCode;

use stackd_config::Config;

#[expect(
    clippy::print_stderr,
    reason = "launch failures are reported before telemetry is available"
)]
fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => error.exit(),
    };
    match stackd::run_daemon(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("stackd: {error}");
            ExitCode::FAILURE
        }
    }
}
