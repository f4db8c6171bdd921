//! Identity types for endpoints tracked by the bridge.
//!
//! Keys are opaque: engines derive them from their own stable handles (the
//! GStreamer backend uses object addresses), and the bridge never interprets
//! them beyond equality and hashing. They are only meaningful while the
//! pipeline that produced them is alive.

use std::fmt;

/// Key of an app sink in the sink registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({:#x})", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Key of a pad in the probe registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(pub u64);

impl fmt::Debug for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PadId({:#x})", self.0)
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Engine-assigned probe handle, needed to remove the probe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(pub u64);

/// Pipeline generation. Every successful `build` gets a fresh one, so events
/// posted by a torn-down graph can be told apart from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// Generation used before any pipeline was built.
    pub const NONE: Generation = Generation(0);

    #[inline]
    pub fn next(self) -> Generation {
        Generation(self.0.wrapping_add(1).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_id_format() {
        assert_eq!(format!("{:?}", EndpointId(255)), "EndpointId(0xff)");
        assert_eq!(PadId(16).to_string(), "PadId(0x10)");
    }

    #[test]
    fn test_generation_never_returns_to_none() {
        assert_eq!(Generation::NONE.next(), Generation(1));
        assert_eq!(Generation(u64::MAX).next(), Generation(1));
    }
}
