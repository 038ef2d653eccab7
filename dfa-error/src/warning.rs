use core::fmt;

use dfa_ir::{Entity, Site};

/// A coverage gap found while analysing.  The run continues and the gap is treated as a no-op,
/// so the corresponding edge or effect is absent from the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileWarning {
    pub entity: Option<Entity>,
    pub site: Option<Site>,
    pub warning_content: Warning,
}

impl CompileWarning {
    pub fn to_friendly_warning_string(&self) -> String {
        self.warning_content.to_string()
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.site {
            Some(site) => write!(f, "{site}: {}", self.warning_content),
            None => self.warning_content.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    MissingIntrinsic {
        name: String,
    },
    UnresolvedHigherOrderCall {
        intrinsic: String,
    },
    CallToAbstract {
        name: String,
    },
    NoDynamicTargets {
        name: String,
    },
    AtomicWithoutValue {
        intrinsic: String,
    },
    IterationLimitReached {
        limit: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Warning::*;
        match self {
            MissingIntrinsic { name } => write!(
                f,
                "No handler for intrinsic \"{name}\"; its effects on the call graph are ignored."
            ),
            UnresolvedHigherOrderCall { intrinsic } => write!(
                f,
                "Unable to resolve the routine called by intrinsic \"{intrinsic}\"."
            ),
            CallToAbstract { name } => {
                write!(f, "Call to abstract \"{name}\" has no implementation.")
            }
            NoDynamicTargets { name } => {
                write!(f, "Dynamic access to \"{name}\" has no concrete targets.")
            }
            AtomicWithoutValue { intrinsic } => write!(
                f,
                "Intrinsic \"{intrinsic}\" is not declared in an atomic holding a value field."
            ),
            IterationLimitReached { limit } => write!(
                f,
                "Analysis stopped after {limit} iterations before reaching a fixed point."
            ),
        }
    }
}
