use std::process::ExitCode;

fn main() -> ExitCode {
    pengpt_cli::run()
}
