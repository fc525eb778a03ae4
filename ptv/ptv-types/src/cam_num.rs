use serde::{Deserialize, Serialize};

/// Index of a camera within a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CamNum(pub u8);

impl CamNum {
    pub fn idx(self) -> usize {
        usize::from(self.0)
    }
}

impl std::fmt::Display for CamNum {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, fmt)
    }
}

impl From<u8> for CamNum {
    fn from(val: u8) -> CamNum {
        CamNum(val)
    }
}
