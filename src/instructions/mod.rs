//! Instruction parsing, timelines and sequence loading.

pub mod instruction;
pub mod loader;
pub mod row;
pub mod timeline;

pub use instruction::{Instruction, InstructionKind, TimedInstruction};
pub use loader::{InstructionSet, NestedSequenceRef};
pub use timeline::Timeline;

use thiserror::Error;

/// Failure to load an instruction source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("instruction source {name:?} not found")]
    NotFound { name: String },
    #[error("failed to read instruction source {name:?}: {error}")]
    Io {
        name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
