//! Storage size primitives
//!
//! This component provides a type-safe wrapper for file sizes with the
//! human-readable display used by the library listing:
//!
//! ```
//! use storage_primitives::ByteSize;
//!
//! assert_eq!(ByteSize::new(0).to_string(), "0 Bytes");
//! assert_eq!(ByteSize::new(1536).to_string(), "1.50 KB");
//! assert_eq!(ByteSize::from_mb(3).to_string(), "3.00 MB");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

const UNIT: u64 = 1024;
const UNIT_NAMES: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Size in bytes with smart display formatting
///
/// Units are binary (1 KB = 1024 bytes). Sizes beyond the largest unit
/// keep counting in GB rather than switching to TB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const ZERO: Self = Self(0);

    /// Create from a number of bytes
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from kibibytes
    pub const fn from_kb(kb: u64) -> Self {
        Self(kb * UNIT)
    }

    /// Create from mebibytes
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb * UNIT * UNIT)
    }

    /// Get the raw byte value
    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// Add two sizes (saturating at u64::MAX)
    pub const fn saturating_add(self, other: ByteSize) -> ByteSize {
        ByteSize(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0 Bytes");
        }

        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= UNIT as f64 && unit < UNIT_NAMES.len() - 1 {
            value /= UNIT as f64;
            unit += 1;
        }

        write!(f, "{:.2} {}", value, UNIT_NAMES[unit])
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        ByteSize(bytes)
    }
}

impl Sum for ByteSize {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ByteSize::ZERO, ByteSize::saturating_add)
    }
}

/// Alias for file sizes (makes intent clear in APIs)
pub type FileSize = ByteSize;
