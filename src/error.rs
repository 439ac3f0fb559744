// This module defines the error taxonomy shared by every analysis pass, using the
// thiserror crate for idiomatic Rust error handling. AnalysisError distinguishes hard
// contract violations (UnsupportedNodeKind: the frontend handed us a node the pass has
// no handler for) from per-instruction failures that the pipeline isolates and records
// in its metrics (conflicting operand types, operand count mismatches in the assembly
// syntax, behavior shapes the DAG builder cannot canonicalize). Unresolved types are
// deliberately NOT an error: type inference records a diagnostic and downstream passes
// degrade gracefully. The module also provides AnalysisResult<T> as a convenience alias.

//! Error types for the analysis pipeline.
//!
//! Using thiserror for more idiomatic error handling.

use crate::model::IntType;
use thiserror::Error;

/// Per-instruction failure raised by an analysis pass.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no {pass} handler for {kind} node")]
    UnsupportedNodeKind {
        pass: &'static str,
        kind: &'static str,
    },

    #[error("conflicting immediate type for operand {operand}: {first} vs {second}")]
    ConflictingImmediateType {
        operand: String,
        first: IntType,
        second: IntType,
    },

    #[error("conflicting register classification for operand {operand}: {reason}")]
    ConflictingRegisterType {
        operand: String,
        reason: String,
    },

    #[error("{instruction}: assembly syntax names {placeholders} operands but {declared} are declared")]
    OperandCountMismatch {
        instruction: String,
        placeholders: usize,
        declared: usize,
    },

    #[error("behavior shape not supported: {reason}")]
    PatternNotSupported {
        reason: String,
    },

    #[error("unknown reference: {name}")]
    UnknownReference {
        name: String,
    },

    #[error("register file {file} with element offset {offset} selects no register class")]
    UnknownRegisterOffset {
        file: String,
        offset: i128,
    },

    #[error("uncompressed counterpart {name} not found in set")]
    MissingCounterpart {
        name: String,
    },
}

impl AnalysisError {
    /// Shorthand for a [`AnalysisError::PatternNotSupported`] with a formatted reason.
    pub fn unsupported_pattern(reason: impl Into<String>) -> Self {
        AnalysisError::PatternNotSupported { reason: reason.into() }
    }

    /// Whether the failure is recoverable for the surrounding pipeline.
    ///
    /// `UnsupportedNodeKind` indicates a frontend/IR contract violation and is
    /// always fatal; everything else is isolated to the failing instruction.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AnalysisError::UnsupportedNodeKind { .. })
    }
}

/// Result type alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
