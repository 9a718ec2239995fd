use std::process::ExitCode;

fn main() -> ExitCode {
    rudder_cli::run()
}
