use quill_cli::{command, init_tracing, run};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = command().get_matches();
    init_tracing(matches.get_flag("verbose"), matches.get_flag("log-json"));

    let stdout = io::stdout();
    let stderr = io::stderr();
    match run(&matches, &mut stdout.lock(), &mut stderr.lock()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
