//! Kernel-specific error types.

use cape_types::error::CapeError;
use thiserror::Error;

/// Kernel error type wrapping CapeError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped CapeError.
    #[error(transparent)]
    Cape(#[from] CapeError),

    /// The node failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
