use std::process::ExitCode;

fn main() -> ExitCode {
    cassie_cli::run()
}
