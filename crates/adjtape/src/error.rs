//! Error types for adjtape.

use thiserror::Error;

/// Errors that can occur while recording or replaying a tape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdjointError {
    /// A value offered for tracking has no registered overloaded constructor.
    #[error("unsupported payload type: {type_name}")]
    UnsupportedPayload { type_name: &'static str },

    /// A block was asked for a rule it does not implement.
    #[error("block {block} does not implement {rule}")]
    MissingRule {
        block: &'static str,
        rule: &'static str,
    },

    /// Payload kinds cannot be combined.
    #[error("payload kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Two fields have different component layouts.
    #[error("field layout mismatch: expected components {expected:?}, got {actual:?}")]
    LayoutMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Data length does not match the expected size.
    #[error("length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Component index out of range for a composite field.
    #[error("component {index} out of range for field with {count} components")]
    ComponentOutOfBounds { index: usize, count: usize },

    /// Wrong number of control values or directions passed to a driver.
    #[error("expected {expected} control values, got {actual}")]
    ControlCountMismatch { expected: usize, actual: usize },
}
