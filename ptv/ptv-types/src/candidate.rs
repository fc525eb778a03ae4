use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::{CamNum, FrameNumber, TargetRef};

/// A triangulated 3D position in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePoint {
    pub position: Point3<f64>,
    /// Index of the contributing target for each camera, `None` where the
    /// camera did not contribute.
    pub targets: Vec<Option<u32>>,
    /// Reprojection distance in pixels for each contributing camera.
    pub reproj_dists: Vec<Option<f64>>,
    pub mean_reproj_dist: f64,
    /// Higher is better.
    pub quality: f64,
    /// Summed gray value over all contributing targets.
    pub sum_gray: f64,
}

impl CandidatePoint {
    pub fn num_cameras(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// The contributing targets in camera order.
    pub fn target_refs(&self) -> impl Iterator<Item = TargetRef> + '_ {
        self.targets.iter().enumerate().filter_map(|(cam, t)| {
            t.map(|idx| TargetRef {
                cam: CamNum(cam as u8),
                idx,
            })
        })
    }
}

/// The result of correspondence search for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCorrespondences {
    pub frame: FrameNumber,
    pub candidates: Vec<CandidatePoint>,
    /// Targets not used by any accepted candidate.
    pub unmatched: Vec<TargetRef>,
}

impl FrameCorrespondences {
    pub fn empty(frame: FrameNumber) -> Self {
        Self {
            frame,
            candidates: Vec::new(),
            unmatched: Vec::new(),
        }
    }
}
