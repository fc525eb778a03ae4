//! Multi-camera correspondence search.
//!
//! For each frame the per-camera target lists are matched across cameras
//! and triangulated into [`CandidatePoint`]s:
//!
//! 1. For every camera pair, each target of the first camera is
//!    back-projected and its epipolar curve drawn in the second camera
//!    (with refraction). Targets of the second camera within the epipolar
//!    band that look similar are triangulated into seeds, which must lie in
//!    the search volume.
//! 2. Each seed is projected into the remaining cameras and picks up the
//!    nearest target within the reprojection tolerance. The point is
//!    re-triangulated from all contributing cameras, outliers are dropped
//!    and the result is scored.
//! 3. Candidates are ranked by a total order and accepted greedily, so that
//!    no target is used by more than one candidate.
//!
//! Steps 1 and 2 run in parallel with rayon. Step 3 is sequential, which
//! makes the output independent of scheduling.
#![deny(rust_2018_idioms)]

use rayon::prelude::*;
use tracing::debug;

use ptv_mvg::{DistortedPixel, MultiCameraSystem, PtvMvgError};
use ptv_types::{CandidatePoint, FrameCorrespondences, FrameTargets, SearchVolume, Target};

mod merge;
mod pair_search;
mod similarity;
mod verify;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("frame {frame} has target lists for {got} cameras, the rig has {expected}")]
    CameraCountMismatch {
        frame: ptv_types::FrameNumber,
        expected: usize,
        got: usize,
    },
    #[error("a rig of {have} cameras cannot provide {need} cameras per candidate")]
    NotEnoughCameras { have: usize, need: usize },
    #[error(transparent)]
    Mvg(#[from] PtvMvgError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn target_pixel(t: &Target) -> DistortedPixel {
    DistortedPixel::new(t.x, t.y)
}

/// Finds 3D candidate points from the targets of one frame.
#[derive(Debug, Clone)]
pub struct CorrespondenceEngine {
    system: MultiCameraSystem,
    volume: SearchVolume,
}

impl CorrespondenceEngine {
    pub fn new(system: MultiCameraSystem, volume: SearchVolume) -> Result<Self> {
        if system.len() < volume.min_cameras {
            return Err(Error::NotEnoughCameras {
                have: system.len(),
                need: volume.min_cameras,
            });
        }
        Ok(Self { system, volume })
    }

    pub fn system(&self) -> &MultiCameraSystem {
        &self.system
    }

    pub fn volume(&self) -> &SearchVolume {
        &self.volume
    }

    /// Give back the camera system, e.g. to refine a camera's orientation.
    pub fn into_system(self) -> MultiCameraSystem {
        self.system
    }

    /// Candidate points of one frame.
    ///
    /// Targets that no accepted candidate uses are listed in
    /// [`FrameCorrespondences::unmatched`]. A frame without any match is not
    /// an error.
    #[tracing::instrument(level = "debug", skip_all, fields(frame = %frame.frame))]
    pub fn process_frame(&self, frame: &FrameTargets) -> Result<FrameCorrespondences> {
        if frame.per_camera.len() != self.system.len() {
            return Err(Error::CameraCountMismatch {
                frame: frame.frame,
                expected: self.system.len(),
                got: frame.per_camera.len(),
            });
        }

        let seeds = pair_search::find_seeds(&self.system, &self.volume, frame)?;

        let verified: Vec<CandidatePoint> = seeds
            .par_iter()
            .map(|seed| verify::verify_seed(&self.system, &self.volume, frame, seed))
            .collect::<Result<Vec<Option<_>>>>()?
            .into_iter()
            .flatten()
            .collect();

        let n_verified = verified.len();
        let (candidates, unmatched) = merge::select_exclusive(frame, verified);
        debug!(
            "{} targets, {} seeds, {} verified, {} accepted, {} unmatched",
            frame.num_targets(),
            seeds.len(),
            n_verified,
            candidates.len(),
            unmatched.len()
        );

        Ok(FrameCorrespondences {
            frame: frame.frame,
            candidates,
            unmatched,
        })
    }

    /// [`Self::process_frame`] for every frame, results in input order.
    pub fn process_sequence(&self, frames: &[FrameTargets]) -> Result<Vec<FrameCorrespondences>> {
        frames
            .par_iter()
            .map(|frame| self.process_frame(frame))
            .collect()
    }
}
