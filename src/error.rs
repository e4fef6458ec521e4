//! Unified error handling for StreamForge
//!
//! This module provides a centralized error type that consolidates the
//! domain-specific failures of the runtime. It implements error
//! categorization for:
//! - Planning errors (plan construction, missing capabilities)
//! - Graph errors (malformed or cyclic graphs, bad shapes)
//! - Kernel errors (compute failures, fatal at execution time)
//! - Frame errors (feed/fetch binding, output extraction)
//! - Internal errors (bugs, system failures)

use std::fmt;

/// Unified error type for StreamForge
///
/// This enum consolidates all domain-specific errors into a single type
/// that can be used throughout the codebase. It supports categorization
/// via the `kind()` method.
#[derive(Debug, thiserror::Error)]
pub enum StreamForgeError {
    // ========== Planning Errors ==========
    /// Plan construction failed
    #[error("planning failed: {0}")]
    Planning(String),

    /// A node's execution provider is not part of the session
    #[error("execution provider not found: {0}")]
    ProviderNotFound(String),

    /// No stream handlers registered for a provider type
    #[error("no stream handlers registered for provider: {0}")]
    MissingStreamCapability(String),

    /// No wait bridge registered between two provider types
    #[error("no wait bridge registered from {producer} to {consumer}")]
    MissingWaitBridge { producer: String, consumer: String },

    // ========== Graph Errors ==========
    /// Malformed graph (cycle, dangling tensor id, duplicate producer)
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Tensor shape mismatch
    #[error("invalid tensor shape: {0}")]
    InvalidShape(String),

    // ========== Kernel Errors ==========
    /// A kernel's compute failed at execution time
    #[error("kernel failure on node {node}: {reason}")]
    KernelFailure { node: usize, reason: String },

    /// Operation has no kernel implementation
    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),

    // ========== Frame Errors ==========
    /// Feed/fetch binding or output extraction failed
    #[error("frame failure: {0}")]
    FrameFailure(String),

    // ========== Configuration Errors ==========
    /// Invalid session configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    Internal(String),

    /// Lock poisoned (indicates a bug or concurrent access issue)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// Thread pool construction failed
    #[error("thread pool construction failed: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl StreamForgeError {
    /// Categorize the error for handling decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamForgeError::Planning(_)
            | StreamForgeError::ProviderNotFound(_)
            | StreamForgeError::MissingStreamCapability(_)
            | StreamForgeError::MissingWaitBridge { .. } => ErrorKind::Planning,

            StreamForgeError::InvalidGraph(_) | StreamForgeError::InvalidShape(_) => {
                ErrorKind::Graph
            }

            StreamForgeError::KernelFailure { .. } | StreamForgeError::UnsupportedOp(_) => {
                ErrorKind::Kernel
            }

            StreamForgeError::FrameFailure(_) => ErrorKind::Frame,

            StreamForgeError::InvalidConfiguration(_) => ErrorKind::Config,

            StreamForgeError::Internal(_)
            | StreamForgeError::LockPoisoned(_)
            | StreamForgeError::ThreadPool(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error surfaced during plan construction
    pub fn is_planning_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Planning)
    }

    /// Check if this error came from a kernel
    ///
    /// Kernel errors are fatal once the command sequence is dispatching;
    /// they are only observable as `Err` values before that point.
    pub fn is_kernel_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Kernel)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Plan construction failure
    Planning,
    /// Graph or shape problem
    Graph,
    /// Kernel compute failure
    Kernel,
    /// Execution frame failure
    Frame,
    /// Session configuration problem
    Config,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Planning => write!(f, "Planning"),
            ErrorKind::Graph => write!(f, "Graph"),
            ErrorKind::Kernel => write!(f, "Kernel"),
            ErrorKind::Frame => write!(f, "Frame"),
            ErrorKind::Config => write!(f, "Config"),
            ErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StreamForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StreamForgeError::LockPoisoned(err.to_string())
    }
}

// Helper type alias for Results using StreamForgeError
pub type ForgeResult<T> = std::result::Result<T, StreamForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StreamForgeError::Planning("test".to_string()).kind(),
            ErrorKind::Planning
        );
        assert_eq!(
            StreamForgeError::ProviderNotFound("npu".to_string()).kind(),
            ErrorKind::Planning
        );
        assert_eq!(
            StreamForgeError::InvalidGraph("cycle".to_string()).kind(),
            ErrorKind::Graph
        );
        assert_eq!(
            StreamForgeError::KernelFailure {
                node: 3,
                reason: "bad shape".to_string()
            }
            .kind(),
            ErrorKind::Kernel
        );
        assert_eq!(
            StreamForgeError::FrameFailure("missing output".to_string()).kind(),
            ErrorKind::Frame
        );
        assert_eq!(
            StreamForgeError::Internal("test".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_is_planning_error() {
        assert!(StreamForgeError::MissingStreamCapability("cpu".to_string()).is_planning_error());
        assert!(StreamForgeError::MissingWaitBridge {
            producer: "cpu".to_string(),
            consumer: "dummy".to_string()
        }
        .is_planning_error());
        assert!(!StreamForgeError::FrameFailure("x".to_string()).is_planning_error());
    }

    #[test]
    fn test_is_kernel_error() {
        assert!(StreamForgeError::KernelFailure {
            node: 0,
            reason: "x".to_string()
        }
        .is_kernel_error());
        assert!(StreamForgeError::UnsupportedOp("Conv".to_string()).is_kernel_error());
        assert!(!StreamForgeError::Planning("x".to_string()).is_kernel_error());
    }

    #[test]
    fn test_error_display() {
        let err = StreamForgeError::MissingWaitBridge {
            producer: "dummy".to_string(),
            consumer: "cpu".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no wait bridge registered from dummy to cpu"
        );

        let err = StreamForgeError::KernelFailure {
            node: 7,
            reason: "shape mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "kernel failure on node 7: shape mismatch");
    }

    #[test]
    fn test_poison_error_conversion() {
        use std::sync::PoisonError;

        fn convert_poison<T>(err: PoisonError<T>) -> StreamForgeError {
            StreamForgeError::from(err)
        }

        let _ = convert_poison::<i32> as fn(PoisonError<i32>) -> StreamForgeError;
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Planning.to_string(), "Planning");
        assert_eq!(ErrorKind::Kernel.to_string(), "Kernel");
        assert_eq!(ErrorKind::Internal.to_string(), "Internal");
    }
}
