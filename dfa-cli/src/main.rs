//! The `dfa` tool: parse a textual IR file, run the analyses and print their results.

mod cli;
mod config;
mod logging;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use dfa_core::{intrinsics, report, Dfa, DfaConfig};

use crate::{
    cli::Command,
    config::ConfigFile,
    logging::{
        init_tracing_subscriber, println_green_err, println_red_err, println_yellow_err,
        TracingSubscriberOptions,
    },
};

fn main() {
    let command = Command::parse();
    init_tracing_subscriber(TracingSubscriberOptions {
        verbosity: command.verbose,
        silent: command.silent,
    });
    if let Err(err) = run(command) {
        println_red_err(&format!("Error: {err:?}"));
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    if command.list_intrinsics {
        for name in intrinsics::supported_intrinsics() {
            println!("{name}");
        }
        return Ok(());
    }
    let Some(path) = &command.file else {
        anyhow::bail!("no input file given");
    };

    let mut config = match &command.config {
        Some(config_path) => ConfigFile::from_file(config_path)?.dfa,
        None => DfaConfig::default(),
    };
    if command.max_iterations.is_some() {
        config.max_iterations = command.max_iterations;
    }
    config.trace_changes |= command.trace_changes;
    tracing::debug!("{config:?}");

    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let program = dfa_ir::parser::parse(&source)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let mut dfa = Dfa::new(&program, config);
    dfa.run()?;

    print!("{}", report::to_string(&dfa));
    if command.escape {
        print!("{}", report::escapes_to_string(&dfa)?);
    }
    if command.tail_calls {
        print!("{}", report::tail_calls_to_string(&dfa));
    }

    let warnings = dfa.warnings().count();
    if warnings > 0 {
        println_yellow_err(&format!("{warnings} warning(s)"));
    }
    println_green_err(&format!(
        "Analysed {}: {} reachable entities after {} iterations",
        path.display(),
        dfa.reachable_entities().count(),
        dfa.iterations()
    ));
    Ok(())
}
