use dfa_ir::{Entity, ExprKind, Site};
use thiserror::Error;

/// A broken IR contract.  Any of these aborts the analysis run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalysisError {
    #[error(
        "Internal analysis error: instruction kind `{kind}` at {site} is not supported.\n\
        The IR uses an instruction outside the set understood by the analyses."
    )]
    UnsupportedExpr { kind: ExprKind, site: Site },
    #[error("Internal analysis error: stack underflow at {site} in entity {entity}.")]
    StackUnderflow { entity: Entity, site: Site },
    #[error(
        "Internal analysis error: {count} value(s) left on the stack at the end of a code \
        block of entity {entity}."
    )]
    StackNotEmpty { entity: Entity, count: usize },
}
