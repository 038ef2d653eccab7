use serde::Deserialize;

/// Knobs of a [`crate::Dfa`] run, usually read from the `[dfa]` table of a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DfaConfig {
    /// Stop after this many iterations even without a fixed point.  Unbounded by default.
    pub max_iterations: Option<usize>,
    /// Warn about intrinsics that have no handler.
    pub report_missing_intrinsics: bool,
    /// Log every reason for running another iteration.
    pub trace_changes: bool,
}

impl Default for DfaConfig {
    fn default() -> Self {
        DfaConfig {
            max_iterations: None,
            report_missing_intrinsics: true,
            trace_changes: false,
        }
    }
}
