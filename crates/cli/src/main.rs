use std::process::ExitCode;

fn main() -> ExitCode {
    opsboard_cli::run()
}
