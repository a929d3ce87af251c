use cadenza::{Diagnostic, Runtime};
use std::process::ExitCode;

fn main() -> ExitCode {
    cadenza::init_tracing();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: cadenza <script.cdz>");
        return ExitCode::FAILURE;
    };
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot read {}: {}", path, err);
            return ExitCode::FAILURE;
        }
    };

    let mut runtime = Runtime::default();
    let evaluation = runtime.eval(&source);
    for line in &evaluation.output {
        println!("{}", line);
    }
    match &evaluation.result {
        Ok(value) => {
            println!("{}", runtime.format_value(value));
            ExitCode::SUCCESS
        }
        Err(err) => {
            err.pretty_print(&source);
            ExitCode::FAILURE
        }
    }
}
