//! Error kinds shared by every pipeline stage.
//!
//! `PatternNoMatch` (§7) is deliberately not in this enum: it is a soft signal
//! exchanged only between [`crate::recognize`] and [`crate::simulate`] and must
//! never reach a driver-visible `Result`. It lives next to them as a plain
//! struct; see `recognize::PatternNoMatch`.

use thiserror::Error;

/// Crate-local result alias used by every stage from the decoder onward.
pub type Result<T> = std::result::Result<T, DecompileError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecompileError {
    #[error("truncated bytecode at offset {offset}")]
    TruncatedBytecode { offset: usize },

    #[error("unknown opcode byte {byte:#04x} at offset {offset} for version {version}")]
    UnknownOpcode {
        offset: usize,
        byte: u8,
        version: crate::version::PyVersion,
    },

    #[error("jump at offset {offset} resolves to invalid target {target}")]
    InvalidJumpTarget { offset: usize, target: i64 },

    #[error("malformed exception table: {reason}")]
    InvalidExceptionTable { reason: String },

    #[error("CFG construction exceeded its iteration bound: {reason}")]
    CfgMalformed { reason: String },

    #[error("stack underflow popping {what} at offset {offset}")]
    StackUnderflow { offset: usize, what: &'static str },

    #[error("expected an expression on the stack but found a marker at offset {offset}")]
    NotAnExpression { offset: usize },

    #[error("reference to block {block_id} which is not in the CFG")]
    InvalidBlock { block_id: usize },

    #[error("unsupported construct at offset {offset}: {reason}")]
    Unsupported { offset: usize, reason: String },
}

impl DecompileError {
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::TruncatedBytecode { offset }
            | Self::UnknownOpcode { offset, .. }
            | Self::InvalidJumpTarget { offset, .. }
            | Self::StackUnderflow { offset, .. }
            | Self::NotAnExpression { offset }
            | Self::Unsupported { offset, .. } => Some(*offset),
            Self::InvalidExceptionTable { .. } | Self::CfgMalformed { .. } | Self::InvalidBlock { .. } => None,
        }
    }

    /// Short tag matching the `KIND` placeholder in the `# <decompilation
    /// failed at offset N: KIND>` comment the driver emits (§7).
    #[must_use]
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::TruncatedBytecode { .. } => "TruncatedBytecode",
            Self::UnknownOpcode { .. } => "UnknownOpcode",
            Self::InvalidJumpTarget { .. } => "InvalidJumpTarget",
            Self::InvalidExceptionTable { .. } => "InvalidExceptionTable",
            Self::CfgMalformed { .. } => "CfgMalformed",
            Self::StackUnderflow { .. } => "StackUnderflow",
            Self::NotAnExpression { .. } => "NotAnExpression",
            Self::InvalidBlock { .. } => "InvalidBlock",
            Self::Unsupported { .. } => "Unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PyVersion;

    #[test]
    fn kind_tag_matches_diagnostic_vocabulary() {
        let err = DecompileError::StackUnderflow { offset: 12, what: "expression" };
        assert_eq!(err.kind_tag(), "StackUnderflow");
        assert_eq!(err.offset(), Some(12));
    }

    #[test]
    fn cfg_malformed_has_no_offset() {
        let err = DecompileError::CfgMalformed { reason: "fixed point exceeded".into() };
        assert_eq!(err.offset(), None);
    }

    #[test]
    fn unknown_opcode_display_includes_version() {
        let err = DecompileError::UnknownOpcode { offset: 4, byte: 0xfe, version: PyVersion::new(3, 12) };
        let text = err.to_string();
        assert!(text.contains("3.12"));
        assert!(text.contains("0xfe"));
    }
}
