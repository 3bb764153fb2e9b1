use std::process::ExitCode;

fn main() -> ExitCode {
    workdesk_cli::run()
}
