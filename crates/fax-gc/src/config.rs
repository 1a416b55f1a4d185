//! Tuning parameters for the memory manager.

use crate::error::{GcError, Result};

/// Sizing knobs for the three spaces the collector manages.
///
/// Defaults are deliberately small: this is an embedded VM runtime, not a
/// server heap, and tests build tiny graphs of a few hundred objects.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Size in bytes of each of the two new-space semi-spaces.
    pub new_space_size: usize,

    /// Size in bytes of a single old-space chunk. Old space grows by
    /// allocating additional chunks of this size as needed.
    pub old_chunk_size: usize,

    /// How many old-space chunks to reserve up front.
    pub initial_old_chunks: usize,

    /// Objects whose size is at or above this threshold are allocated
    /// directly in big space instead of new/old space, regardless of the
    /// allocation policy requested by the caller.
    pub big_object_threshold: usize,

    /// Survivor objects are promoted to old space after surviving this many
    /// young collections (the meta word's age field saturates here too).
    pub promotion_age: u8,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            new_space_size: 1 << 20,
            old_chunk_size: 4 << 20,
            initial_old_chunks: 1,
            big_object_threshold: 8 << 10,
            promotion_age: 3,
        }
    }
}

impl GcConfig {
    /// Check the configuration for internally inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.new_space_size == 0 {
            return Err(GcError::Configuration(
                "new_space_size must be non-zero".into(),
            ));
        }
        if self.old_chunk_size == 0 {
            return Err(GcError::Configuration(
                "old_chunk_size must be non-zero".into(),
            ));
        }
        if self.big_object_threshold == 0 {
            return Err(GcError::Configuration(
                "big_object_threshold must be non-zero".into(),
            ));
        }
        if self.big_object_threshold > self.new_space_size {
            return Err(GcError::Configuration(
                "big_object_threshold should not exceed new_space_size, or ordinary \
                 survivor objects would never fit in a semi-space"
                    .into(),
            ));
        }
        if self.promotion_age == 0 {
            return Err(GcError::Configuration(
                "promotion_age must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which space an allocation should prefer.
///
/// Mirrors the allocation policies the memory manager exposes to callers:
/// `Auto` lets the collector pick new vs. big space by size, `Survivor`
/// forces old-space allocation for objects known to outlive one collection
/// (e.g. the object a class method returns into a long-lived table), and
/// `Huge` forces big space regardless of size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    Auto,
    Survivor,
    Huge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(GcConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_new_space_rejected() {
        let cfg = GcConfig {
            new_space_size: 0,
            ..GcConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn threshold_above_new_space_rejected() {
        let cfg = GcConfig {
            big_object_threshold: GcConfig::default().new_space_size + 1,
            ..GcConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
