//! Process-wide access mode.

use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};

/// Message returned for every mutation attempted while read-only.
pub const READ_ONLY_MESSAGE: &str = "Read-only mode enabled";

/// Read-only flag, fixed for the lifetime of one gateway process.
///
/// Copied by value into every component that can mutate state; there is
/// no way to flip it after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AccessMode {
    read_only: bool,
}

impl AccessMode {
    pub const fn read_write() -> Self {
        Self { read_only: false }
    }

    pub const fn read_only() -> Self {
        Self { read_only: true }
    }

    pub const fn from_flag(read_only: bool) -> Self {
        Self { read_only }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Gate for mutating operations. Call before any side effect.
    pub fn ensure_writable(&self) -> GatewayResult<()> {
        if self.read_only {
            Err(GatewayError::AccessDenied(READ_ONLY_MESSAGE.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_allows_mutation() {
        assert!(AccessMode::read_write().ensure_writable().is_ok());
    }

    #[test]
    fn read_only_denies_mutation() {
        let err = AccessMode::read_only().ensure_writable().unwrap_err();
        assert_eq!(err, GatewayError::AccessDenied(READ_ONLY_MESSAGE.to_string()));
    }
}
