use std::process::ExitCode;

fn main() -> ExitCode {
    intentdesk_cli::run()
}
