use serde::{Deserialize, Serialize};

/// Frame number, synchronized across all cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameNumber(pub u64);

impl std::fmt::Display for FrameNumber {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, fmt)
    }
}

impl From<u64> for FrameNumber {
    fn from(val: u64) -> FrameNumber {
        FrameNumber(val)
    }
}
