use serde::{Deserialize, Serialize};

use crate::{CamNum, FrameNumber};

/// One detected blob in one camera image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Centroid, in distorted pixel coordinates.
    pub x: f64,
    pub y: f64,
    pub num_pixels: u32,
    /// Bounding box width in pixels.
    pub bbox_width: u32,
    /// Bounding box height in pixels.
    pub bbox_height: u32,
    /// Summed gray value of all pixels of the blob.
    pub sum_gray: f64,
}

/// A target addressed by camera and position in that camera's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub cam: CamNum,
    pub idx: u32,
}

/// All targets of one frame, one list per camera in rig order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTargets {
    pub frame: FrameNumber,
    pub per_camera: Vec<Vec<Target>>,
}

impl FrameTargets {
    pub fn get(&self, r: TargetRef) -> Option<&Target> {
        self.per_camera.get(r.cam.idx())?.get(r.idx as usize)
    }

    pub fn num_targets(&self) -> usize {
        self.per_camera.iter().map(Vec::len).sum()
    }

    /// Every target reference of the frame, by camera then index.
    pub fn target_refs(&self) -> impl Iterator<Item = TargetRef> + '_ {
        self.per_camera.iter().enumerate().flat_map(|(cam, targets)| {
            (0..targets.len()).map(move |idx| TargetRef {
                cam: CamNum(cam as u8),
                idx: idx as u32,
            })
        })
    }
}
