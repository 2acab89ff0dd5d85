//! Program-load errors.

use serde::Serialize;
use std::fmt;

/// An error raised while loading or validating a program. These are
/// configuration-time failures: a malformed interchange bundle or an
/// AST whose references the (external) resolution stage left dangling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProgramError {
    /// Two declarations of the same kind share a name.
    Duplicate { kind: &'static str, name: String },
    /// A reference names a declaration that does not exist.
    Unresolved { kind: &'static str, name: String },
    /// A field reference names a field its entity does not declare.
    UnknownField { entity: String, field: String },
    /// The interchange JSON could not be decoded.
    Interchange { message: String },
    /// A structurally invalid declaration (bracket ordering, duplicate
    /// shares-map owners, ...).
    Malformed { message: String },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::Duplicate { kind, name } => {
                write!(f, "duplicate {} '{}'", kind, name)
            }
            ProgramError::Unresolved { kind, name } => {
                write!(f, "unresolved reference to {} '{}'", kind, name)
            }
            ProgramError::UnknownField { entity, field } => {
                write!(f, "entity '{}' has no field '{}'", entity, field)
            }
            ProgramError::Interchange { message } => {
                write!(f, "interchange error: {}", message)
            }
            ProgramError::Malformed { message } => {
                write!(f, "malformed program: {}", message)
            }
        }
    }
}

impl std::error::Error for ProgramError {}
