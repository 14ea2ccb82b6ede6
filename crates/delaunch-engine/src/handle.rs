use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Opaque token for an object living on the native side.
///
/// Never interpreted, only compared and passed back. The raw value `0` is the
/// boundary's null, so absent objects are `Option<NativeHandle>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandle(NonZeroU64);

impl NativeHandle {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}
