//! Page-protection states of code regions and the hook that applies them.

use crate::memory::RegionDescriptor;

/// Access permissions of a code region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Protection {
    /// Data writes allowed, instruction fetch refused.
    #[default]
    Writable,
    /// Instruction fetch allowed, data writes refused.
    ExecOnly,
}

impl Protection {
    /// Returns `true` when instruction fetch is allowed.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::ExecOnly)
    }
}

/// Applies protection transitions to code regions.
///
/// Returning `false` reports that the transition did not take effect.
pub trait PageProtector: Send + Sync {
    /// Moves `region` to `to`.
    fn set_protection(&self, region: RegionDescriptor, to: Protection) -> bool;
}

/// Protector for which every transition succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGrant;

impl PageProtector for AlwaysGrant {
    fn set_protection(&self, _region: RegionDescriptor, _to: Protection) -> bool {
        true
    }
}
