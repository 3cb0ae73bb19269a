//! Error types and result definitions for Onyx.
//!
//! Every fatal compilation error is one of the variants below. Phases never
//! catch their own errors; they propagate with `?` until the driver's single
//! retry mechanism (or, for inlinee sessions, the inlining recursion manager)
//! absorbs them. Inlining rejection is deliberately *not* an error variant:
//! it is an expected verdict, modeled separately in the JIT crate.

use thiserror::Error;

/// The unified result type used throughout Onyx.
pub type JitResult<T> = Result<T, JitError>;

/// Fatal compilation errors.
#[derive(Error, Debug, Clone)]
pub enum JitError {
    /// Malformed input, e.g. a zero-length method body.
    #[error("BadCode: {message}")]
    BadCode {
        /// Error description.
        message: String,
    },

    /// The importer could not translate the method's bytecode.
    ///
    /// Fatal for a root compilation; converted into an inlining-rejection
    /// verdict for an inlinee session.
    #[error("ImportFailure: {message}")]
    ImportFailure {
        /// Error description.
        message: String,
    },

    /// Internal invariant violation (should never occur in correct input).
    #[error("InternalError: {message}")]
    Internal {
        /// Error description.
        message: String,
    },

    /// Transient failure the driver may retry under minimal optimization.
    #[error("RecoverableError: {message}")]
    Recoverable {
        /// Error description.
        message: String,
    },

    /// Construct the compiler does not support.
    #[error("NotImplemented: {message}")]
    NotImplemented {
        /// Error description.
        message: String,
    },

    /// The running host's target does not match the requested target.
    ///
    /// Yields a skipped compilation, not a failure, and is never retried.
    #[error("ArchMismatch: host is {host}, requested {requested}")]
    ArchMismatch {
        /// Host architecture name.
        host: &'static str,
        /// Requested architecture name.
        requested: &'static str,
    },
}

impl JitError {
    /// Create a bad-code error.
    #[must_use]
    pub fn bad_code(message: impl Into<String>) -> Self {
        Self::BadCode {
            message: message.into(),
        }
    }

    /// Create an import-failure error.
    #[must_use]
    pub fn import_failure(message: impl Into<String>) -> Self {
        Self::ImportFailure {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a recoverable error.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            message: message.into(),
        }
    }

    /// Create a not-implemented error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Whether the driver is allowed to retry this failure once under
    /// forced-minimal configuration.
    ///
    /// Bad code is retried like any other internal failure; an architecture
    /// mismatch never is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ArchMismatch { .. })
    }

    /// Short classification name used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::BadCode { .. } => "BadCode",
            Self::ImportFailure { .. } => "ImportFailure",
            Self::Internal { .. } => "InternalError",
            Self::Recoverable { .. } => "RecoverableError",
            Self::NotImplemented { .. } => "NotImplemented",
            Self::ArchMismatch { .. } => "ArchMismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_code_creation() {
        let err = JitError::bad_code("method body is empty");
        assert_eq!(err.kind_name(), "BadCode");
        assert_eq!(err.to_string(), "BadCode: method body is empty");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_import_failure_creation() {
        let err = JitError::import_failure("unbalanced evaluation stack");
        assert_eq!(err.kind_name(), "ImportFailure");
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_internal_error_creation() {
        let err = JitError::internal("phase left IR in bad form");
        assert_eq!(err.kind_name(), "InternalError");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_arch_mismatch_not_retryable() {
        let err = JitError::ArchMismatch {
            host: "x64",
            requested: "arm64",
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "ArchMismatch: host is x64, requested arm64");
    }

    #[test]
    fn test_error_is_clone() {
        let original = JitError::recoverable("odd cast");
        let cloned = original.clone();
        assert_eq!(original.kind_name(), cloned.kind_name());
    }

    #[test]
    fn test_jit_result() {
        let ok: JitResult<u32> = Ok(7);
        assert_eq!(ok.unwrap(), 7);

        let err: JitResult<u32> = Err(JitError::not_implemented("localloc"));
        assert!(err.is_err());
    }
}
