use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(
    name = "dfa",
    about = "Whole-program data-flow analysis of a textual IR file.",
    version
)]
pub struct Command {
    /// Path to the IR file to analyse.
    #[clap(required_unless_present = "list_intrinsics")]
    pub file: Option<PathBuf>,
    /// Also report, per reachable routine, whether its instance may escape.
    #[clap(long)]
    pub escape: bool,
    /// Also report the tail calls of every reachable routine.
    #[clap(long)]
    pub tail_calls: bool,
    /// A TOML file with a `[dfa]` table of analysis options.
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Stop after this many iterations, overriding the config file.
    #[clap(long)]
    pub max_iterations: Option<usize>,
    /// Log why each iteration needed another one.
    #[clap(long)]
    pub trace_changes: bool,
    /// Print the names of all intrinsics with a handler and exit.
    #[clap(long)]
    pub list_intrinsics: bool,
    /// Use verbose output, `-vv` for tracing.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Silence all log output.
    #[clap(long)]
    pub silent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_is_required_unless_listing_intrinsics() {
        assert!(Command::try_parse_from(["dfa"]).is_err());
        assert!(Command::try_parse_from(["dfa", "--list-intrinsics"]).is_ok());
    }

    #[test]
    fn flags() {
        let command = Command::try_parse_from([
            "dfa",
            "prog.ir",
            "--escape",
            "--max-iterations",
            "12",
            "-vv",
        ])
        .unwrap();
        assert_eq!(command.file, Some(PathBuf::from("prog.ir")));
        assert!(command.escape);
        assert!(!command.tail_calls);
        assert_eq!(command.max_iterations, Some(12));
        assert_eq!(command.verbose, 2);
    }
}
