use std::process::ExitCode;

fn main() -> ExitCode {
    xprin::cli::run()
}
