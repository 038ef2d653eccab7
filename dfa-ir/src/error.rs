/// These errors are for malformed IR, found while parsing or verifying a [`crate::Program`].
/// They are reported before any analysis runs.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    DuplicateEntity(String),
    MissingMain,
    ParseFailure(String, String),
    UnknownEntity(String),
    UnknownAttribute(String, String),

    VerifyMainNotARoutine(String),
    VerifyAccessOfWrongKind(String, String, String),
    VerifyArgIsNotAField(String, String),
    VerifyResultIsNotAField(String, String),
    VerifyCaseCodeOwner(String),
    VerifyConstantSize(String, usize, usize),
}

impl std::error::Error for IrError {}

use std::fmt;

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            IrError::DuplicateEntity(name) => {
                write!(f, "Entity '{name}' is declared more than once.")
            }
            IrError::MissingMain => write!(f, "Program has no main entity."),
            IrError::ParseFailure(expecting, found) => {
                write!(
                    f,
                    "Parse failure: expecting '{expecting}', found '{found}'."
                )
            }
            IrError::UnknownEntity(name) => write!(f, "Unable to find entity '{name}'."),
            IrError::UnknownAttribute(entity, attr) => {
                write!(f, "Entity '{entity}' has unknown attribute '{attr}'.")
            }
            IrError::VerifyMainNotARoutine(name) => write!(
                f,
                "Verification failed: main entity '{name}' is not a routine with code."
            ),
            IrError::VerifyAccessOfWrongKind(instr, entity, kind) => write!(
                f,
                "Verification failed: '{instr}' may not access {kind} '{entity}'."
            ),
            IrError::VerifyArgIsNotAField(routine, arg) => write!(
                f,
                "Verification failed: argument '{arg}' of '{routine}' is not a field."
            ),
            IrError::VerifyResultIsNotAField(routine, result) => write!(
                f,
                "Verification failed: result '{result}' of '{routine}' is not a field."
            ),
            IrError::VerifyCaseCodeOwner(subject) => write!(
                f,
                "Verification failed: a case block of the match on '{subject}' belongs to \
                another entity."
            ),
            IrError::VerifyConstantSize(ty, expected, found) => write!(
                f,
                "Verification failed: constant of type '{ty}' needs {expected} bytes, found {found}."
            ),
        }
    }
}
