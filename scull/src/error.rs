//! Error type surfaced by device operations

use crate::io::StoreError;

/// Errors returned by `open`, `read`, `write` and `seek`
///
/// `Busy` and `WouldBlock` are recoverable: the caller may retry later.
/// Partial reads and writes are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScullError {
    /// Admission denied by the device's access policy
    #[error("device or resource busy")]
    Busy,

    /// Admission would require waiting, but the caller asked not to block
    #[error("operation would block")]
    WouldBlock,

    /// A blocking wait was cancelled before admission was granted
    #[error("interrupted while waiting for the device")]
    Interrupted,

    /// A backing allocation failed or a store limit was reached
    #[error("out of memory")]
    OutOfMemory,

    /// Malformed seek target, negative offset, or use of a released handle
    #[error("invalid argument")]
    InvalidArgument,
}

impl ScullError {
    /// Conventional errno value for this error, as a host device layer would report it
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Busy => 16,         // EBUSY
            Self::WouldBlock => 11,   // EAGAIN
            Self::Interrupted => 512, // ERESTARTSYS
            Self::OutOfMemory => 12,  // ENOMEM
            Self::InvalidArgument => 22,
        }
    }

    /// Whether retrying the same call later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::WouldBlock)
    }
}

impl From<StoreError> for ScullError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OutOfMemory => Self::OutOfMemory,
            StoreError::InvalidGeometry { .. } => Self::InvalidArgument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(ScullError::Busy.errno(), 16);
        assert_eq!(ScullError::WouldBlock.errno(), 11);
        assert_eq!(ScullError::OutOfMemory.errno(), 12);
        assert_eq!(ScullError::InvalidArgument.errno(), 22);
    }

    #[test]
    fn test_store_error_conversion() {
        assert_eq!(
            ScullError::from(StoreError::OutOfMemory),
            ScullError::OutOfMemory
        );
        assert_eq!(
            ScullError::from(StoreError::InvalidGeometry {
                quantum: 0,
                qset: 10
            }),
            ScullError::InvalidArgument
        );
    }

    #[test]
    fn test_only_admission_errors_are_retryable() {
        assert!(ScullError::Busy.is_retryable());
        assert!(ScullError::WouldBlock.is_retryable());
        assert!(!ScullError::Interrupted.is_retryable());
        assert!(!ScullError::OutOfMemory.is_retryable());
    }
}
