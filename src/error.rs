//! Error types for the irflow backend

use thiserror::Error;

/// Backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // CFG construction errors
    /// Jump or branch to a label that never appears in the routine
    ///
    /// **Triggered by:** A malformed instruction stream
    /// **Example:** `jump L7` where no `label L7` follows or precedes it
    #[error("Unresolved label(s) in routine {routine}: {}", labels.join(", "))]
    UnresolvedLabels {
        /// Routine whose CFG was being built
        routine: String,
        /// Labels referenced but never defined
        labels: Vec<String>,
    },

    /// Two blocks of one routine claim the same label
    ///
    /// **Triggered by:** A label placed twice in one instruction stream
    #[error("Duplicate label {label} in routine {routine}")]
    DuplicateLabel {
        /// Routine whose CFG was being built
        routine: String,
        /// Label defined more than once
        label: String,
    },

    /// The label generator has handed out every representable label
    #[error("Label space exhausted")]
    LabelSpaceExhausted,

    // Scope discipline errors
    /// A container-level operation ran with no container scope active
    #[error("No active container scope")]
    NoActiveContainer,

    /// A routine-level operation ran with no routine scope active
    ///
    /// **Triggered by:** Resolving a slot or label outside of `enter_routine`
    #[error("No active routine scope for {operation}")]
    NoActiveRoutine {
        /// Operation that needed a routine scope
        operation: String,
    },

    /// Exiting a scope that is not the innermost one
    #[error("Scope mismatch: expected to exit {expected}, innermost is {found}")]
    ScopeMismatch {
        /// Scope the caller tried to exit
        expected: String,
        /// Scope that is actually on top
        found: String,
    },

    /// A routine needs more local slots than the target can address
    #[error("Too many locals in routine {routine}")]
    TooManyLocals {
        /// Routine being lowered
        routine: String,
    },

    /// A routine needs more target labels than the target can address
    #[error("Too many labels in routine {routine}")]
    TooManyLabels {
        /// Routine being lowered
        routine: String,
    },

    // Output errors
    /// Emitted code failed structural verification
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    // Input errors
    /// IR could not be decoded
    #[error("Invalid IR: {0}")]
    InvalidIr(String),

    /// General compiler error
    #[error("Compiler error: {0}")]
    CompilerError(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Aborts the build of the affected routine
    Fatal,
    /// Input problem the caller can fix and retry
    Recoverable,
}

impl Error {
    /// Create a compiler error with a message
    pub fn compiler(msg: impl Into<String>) -> Self {
        Error::CompilerError(msg.into())
    }

    /// Create a missing-routine error for the named operation
    pub fn no_routine(operation: impl Into<String>) -> Self {
        Error::NoActiveRoutine {
            operation: operation.into(),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::UnresolvedLabels { .. } => ErrorSeverity::Fatal,
            Error::DuplicateLabel { .. } => ErrorSeverity::Fatal,
            Error::LabelSpaceExhausted => ErrorSeverity::Fatal,
            Error::NoActiveContainer => ErrorSeverity::Fatal,
            Error::NoActiveRoutine { .. } => ErrorSeverity::Fatal,
            Error::ScopeMismatch { .. } => ErrorSeverity::Fatal,
            Error::TooManyLocals { .. } => ErrorSeverity::Fatal,
            Error::TooManyLabels { .. } => ErrorSeverity::Fatal,
            Error::VerificationFailed(_) => ErrorSeverity::Fatal,

            Error::InvalidIr(_) => ErrorSeverity::Recoverable,
            Error::CompilerError(_) => ErrorSeverity::Recoverable,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidIr(err.to_string())
    }
}

/// Result type for irflow operations
pub type Result<T> = std::result::Result<T, Error>;
