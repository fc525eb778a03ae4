use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use ptv_types::FrameNumber;

/// Index of a trajectory in the linker's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrajectoryId(pub u32);

impl std::fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "traj{}", self.0)
    }
}

/// A candidate point addressed by frame and position in that frame's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateRef {
    pub frame: FrameNumber,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrajectoryState {
    /// Not yet long enough to be trusted.
    Tentative,
    Active,
    /// Lost. The history is kept.
    Terminated,
    /// A tentative trajectory that found no continuation.
    Discarded,
}

impl TrajectoryState {
    pub fn is_live(&self) -> bool {
        matches!(self, TrajectoryState::Tentative | TrajectoryState::Active)
    }
}

/// Which linking runs agreed on a link of a merged trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkSource {
    Both,
    ForwardOnly,
    BackwardOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub candidate: CandidateRef,
    pub position: Point3<f64>,
    /// Displacement per frame from the previous step, zero for the first.
    /// A link across missing frames is divided by the frame gap.
    pub velocity: Vector3<f64>,
    /// How this step was joined to the previous one when merging
    /// directions. `None` for first steps and single-direction runs.
    pub link: Option<LinkSource>,
}

/// An ordered position history.
///
/// Steps are in processing order: chronological for forward runs and
/// merged results, reverse chronological for backward runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    id: TrajectoryId,
    state: TrajectoryState,
    steps: Vec<TrajectoryStep>,
    /// frame in which the trajectory found no continuation
    terminated_at: Option<FrameNumber>,
}

impl Trajectory {
    pub(crate) fn new(id: TrajectoryId, state: TrajectoryState, first: TrajectoryStep) -> Self {
        Self {
            id,
            state,
            steps: vec![first],
            terminated_at: None,
        }
    }

    pub(crate) fn from_steps(
        id: TrajectoryId,
        state: TrajectoryState,
        steps: Vec<TrajectoryStep>,
        terminated_at: Option<FrameNumber>,
    ) -> Self {
        Self {
            id,
            state,
            steps,
            terminated_at,
        }
    }

    pub fn id(&self) -> TrajectoryId {
        self.id
    }

    pub fn state(&self) -> TrajectoryState {
        self.state
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn terminated_at(&self) -> Option<FrameNumber> {
        self.terminated_at
    }

    pub fn last(&self) -> &TrajectoryStep {
        // never empty, see constructors
        &self.steps[self.steps.len() - 1]
    }

    pub fn positions(&self) -> impl Iterator<Item = &Point3<f64>> + '_ {
        self.steps.iter().map(|s| &s.position)
    }

    pub fn candidates(&self) -> impl Iterator<Item = CandidateRef> + '_ {
        self.steps.iter().map(|s| s.candidate)
    }

    /// The motion of the last link, if there is one.
    pub(crate) fn last_motion(&self) -> Option<Vector3<f64>> {
        if self.steps.len() >= 2 {
            Some(self.last().velocity)
        } else {
            None
        }
    }

    /// Expected position in `frame`, assuming constant velocity.
    pub(crate) fn predict(&self, frame: FrameNumber) -> Point3<f64> {
        let last = self.last();
        last.position + last.velocity * frame_gap(last.candidate.frame, frame)
    }

    pub(crate) fn push(&mut self, candidate: CandidateRef, position: Point3<f64>) {
        let last = self.last();
        let velocity =
            (position - last.position) / frame_gap(last.candidate.frame, candidate.frame);
        self.steps.push(TrajectoryStep {
            candidate,
            position,
            velocity,
            link: None,
        });
    }

    pub(crate) fn set_state(&mut self, state: TrajectoryState) {
        self.state = state;
    }

    pub(crate) fn terminate(&mut self, state: TrajectoryState, frame: FrameNumber) {
        self.state = state;
        self.terminated_at = Some(frame);
    }
}

/// Number of frames from `a` to `b` in either direction, at least one.
pub(crate) fn frame_gap(a: FrameNumber, b: FrameNumber) -> f64 {
    a.0.abs_diff(b.0).max(1) as f64
}
