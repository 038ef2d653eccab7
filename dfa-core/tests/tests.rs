use std::path::PathBuf;

use dfa_core::{report, Dfa, DfaConfig};

// -------------------------------------------------------------------------------------------------
// Utility for finding test files, analysing them and running FileCheck over the report.

fn run_tests<F: Fn(&Dfa) -> String>(sub_dir: &str, report_fn: F) {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let dir: PathBuf = format!("{manifest_dir}/tests/{sub_dir}").into();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();

        let input_bytes = std::fs::read(&path).unwrap();
        let input = String::from_utf8_lossy(&input_bytes);

        let program = dfa_ir::parser::parse(&input).unwrap_or_else(|parse_err| {
            println!("{}: {parse_err}", path.display());
            panic!()
        });

        let mut dfa = Dfa::new(&program, DfaConfig::default());
        dfa.run().unwrap_or_else(|err| {
            println!("{}: {err}", path.display());
            panic!()
        });

        let output = report_fn(&dfa);

        let chkr = filecheck::CheckerBuilder::new()
            .text(&input)
            .unwrap()
            .finish();
        if chkr.is_empty() {
            println!("{output}");
            panic!("No filecheck directives found in test: {}", path.display());
        }

        match chkr.explain(&output, filecheck::NO_VARIABLES) {
            Ok((success, report)) if !success => {
                println!("--- FILECHECK FAILED FOR {}", path.display());
                println!("{report}");
                panic!()
            }
            Err(e) => {
                panic!("filecheck directive error while checking: {e}");
            }
            _ => (),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn dfa() {
    run_tests("dfa", report::to_string)
}

#[test]
fn escape() {
    run_tests("escape", |dfa| report::escapes_to_string(dfa).unwrap())
}

#[test]
fn tail_call() {
    run_tests("tail_call", report::tail_calls_to_string)
}
