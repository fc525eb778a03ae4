//! Trajectory linking for particle tracking velocimetry.
//!
//! Per-frame candidate points (see the `correspondence` crate) are linked
//! into trajectories by a state machine that consumes frames in order.
//! Every trajectory is `Tentative` until it has `min_track_length` steps,
//! then `Active` until a frame offers no qualifying candidate, at which
//! point it is `Terminated` with its history kept. Tentative trajectories
//! that break off are `Discarded`.
//!
//! Trajectories are kept in an arena and addressed by [`TrajectoryId`];
//! steps refer to candidates by [`CandidateRef`]. The same state machine can
//! run over the frames in reverse, and [`link_bidirectional`] merges a
//! forward and a backward run.
#![deny(rust_2018_idioms)]

mod bidirectional;
mod linker;
mod trajectory;

pub use bidirectional::{link_bidirectional, merge_runs};
pub use linker::{LinkDirection, LinkResult, TrajectoryLinker, link_sequence};
pub use trajectory::{
    CandidateRef, LinkSource, Trajectory, TrajectoryId, TrajectoryState, TrajectoryStep,
};

use ptv_types::FrameNumber;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{direction:?} run got frame {got} after frame {previous}")]
    FrameOutOfOrder {
        direction: LinkDirection,
        previous: FrameNumber,
        got: FrameNumber,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
