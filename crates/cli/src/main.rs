use std::process::ExitCode;

fn main() -> ExitCode {
    leadloop_cli::run()
}
