use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use ptv_types::{FrameCorrespondences, FrameNumber, TrackingParamsInner};

use crate::{
    CandidateRef, Error, Result, Trajectory, TrajectoryId, TrajectoryState, TrajectoryStep,
    trajectory::frame_gap,
};

/// Motions shorter than this have no direction.
const MIN_MOTION: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkDirection {
    /// Frames in chronological order.
    Forward,
    /// Frames in reverse chronological order.
    Backward,
}

/// The outcome of linking a frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    /// Active and terminated trajectories. Discarded ones are left out, so
    /// ids may have gaps.
    pub trajectories: Vec<Trajectory>,
    /// Candidates that are not part of any trajectory, sorted.
    pub unlinked: Vec<CandidateRef>,
}

/// The per-frame trajectory state machine.
///
/// Frames are fed one at a time with [`TrajectoryLinker::process_frame`].
/// Trajectories only ever grow: steps are appended, never rewritten.
#[derive(Debug, Clone)]
pub struct TrajectoryLinker {
    params: Arc<TrackingParamsInner>,
    direction: LinkDirection,
    arena: Vec<Trajectory>,
    unlinked: Vec<CandidateRef>,
    last_frame: Option<FrameNumber>,
}

impl TrajectoryLinker {
    pub fn new(params: Arc<TrackingParamsInner>, direction: LinkDirection) -> Self {
        Self {
            params,
            direction,
            arena: Vec::new(),
            unlinked: Vec::new(),
            last_frame: None,
        }
    }

    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    /// Every trajectory created so far, indexed by [`TrajectoryId`],
    /// including discarded ones.
    pub fn trajectories(&self) -> &[Trajectory] {
        &self.arena
    }

    pub fn trajectory(&self, id: TrajectoryId) -> Option<&Trajectory> {
        self.arena.get(id.0 as usize)
    }

    pub fn unlinked(&self) -> &[CandidateRef] {
        &self.unlinked
    }

    #[tracing::instrument(level = "debug", skip_all, fields(frame = %frame.frame))]
    pub fn process_frame(&mut self, frame: &FrameCorrespondences) -> Result<()> {
        if let Some(previous) = self.last_frame {
            let in_order = match self.direction {
                LinkDirection::Forward => frame.frame > previous,
                LinkDirection::Backward => frame.frame < previous,
            };
            if !in_order {
                return Err(Error::FrameOutOfOrder {
                    direction: self.direction,
                    previous,
                    got: frame.frame,
                });
            }
        }
        let first_frame = self.last_frame.is_none();
        self.last_frame = Some(frame.frame);

        let params = Arc::clone(&self.params);
        let cref = |index| CandidateRef {
            frame: frame.frame,
            index,
        };

        let mut linkable = Vec::with_capacity(frame.candidates.len());
        for (index, c) in frame.candidates.iter().enumerate() {
            if c.sum_gray < params.min_sum_gray
                || c.num_cameras() < usize::from(params.min_cameras)
            {
                trace!("{:?} is not linkable", cref(index));
                self.unlinked.push(cref(index));
            } else {
                linkable.push(index);
            }
        }

        let mut taken = vec![false; frame.candidates.len()];
        let mut n_extended = 0;
        let mut n_lost = 0;

        if !first_frame {
            let live: Vec<usize> = (0..self.arena.len())
                .filter(|&i| self.arena[i].state().is_live())
                .collect();

            let mut options = Vec::new();
            for &ti in live.iter() {
                for &ci in linkable.iter() {
                    let position = &frame.candidates[ci].position;
                    if let Some(cost) =
                        link_cost(&params, &self.arena[ti], frame.frame, position)
                    {
                        options.push((cost, ti, ci));
                    }
                }
            }
            options.sort_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then_with(|| a.1.cmp(&b.1))
                    .then_with(|| a.2.cmp(&b.2))
            });

            let mut extended = vec![false; self.arena.len()];
            for (cost, ti, ci) in options {
                if extended[ti] || taken[ci] {
                    continue;
                }
                extended[ti] = true;
                taken[ci] = true;
                n_extended += 1;

                let traj = &mut self.arena[ti];
                traj.push(cref(ci), frame.candidates[ci].position);
                trace!("{} += {:?} (cost {cost})", traj.id(), cref(ci));
                if traj.state() == TrajectoryState::Tentative
                    && traj.len() >= params.min_track_length
                {
                    traj.set_state(TrajectoryState::Active);
                    debug!("{} is active", traj.id());
                }
            }

            for ti in live {
                if extended[ti] {
                    continue;
                }
                let traj = &mut self.arena[ti];
                let state = match traj.state() {
                    TrajectoryState::Tentative => TrajectoryState::Discarded,
                    _ => TrajectoryState::Terminated,
                };
                traj.terminate(state, frame.frame);
                n_lost += 1;
                trace!("{} {:?} after {} steps", traj.id(), state, traj.len());
            }
        }

        let mut n_new = 0;
        for ci in linkable {
            if taken[ci] {
                continue;
            }
            if first_frame || params.add_new_particles {
                self.start(cref(ci), frame.candidates[ci].position);
                n_new += 1;
            } else {
                trace!("{:?} unlinked, not adding particles", cref(ci));
                self.unlinked.push(cref(ci));
            }
        }

        debug!(
            "{} candidates: {n_extended} extended, {n_lost} lost, {n_new} new",
            frame.candidates.len()
        );
        Ok(())
    }

    fn start(&mut self, candidate: CandidateRef, position: Point3<f64>) {
        let id = TrajectoryId(self.arena.len() as u32);
        let state = if self.params.min_track_length <= 1 {
            TrajectoryState::Active
        } else {
            TrajectoryState::Tentative
        };
        let first = TrajectoryStep {
            candidate,
            position,
            velocity: nalgebra::Vector3::zeros(),
            link: None,
        };
        self.arena.push(Trajectory::new(id, state, first));
    }

    /// End the run. Trajectories still tentative are discarded.
    pub fn finish(mut self) -> LinkResult {
        for traj in self.arena.iter_mut() {
            if traj.state() == TrajectoryState::Tentative {
                traj.set_state(TrajectoryState::Discarded);
            }
        }
        let trajectories: Vec<Trajectory> = self
            .arena
            .into_iter()
            .filter(|t| t.state() != TrajectoryState::Discarded)
            .collect();
        self.unlinked.sort();
        debug!(
            "{:?} run done: {} trajectories, {} unlinked",
            self.direction,
            trajectories.len(),
            self.unlinked.len()
        );
        LinkResult {
            trajectories,
            unlinked: self.unlinked,
        }
    }
}

/// Cost of extending `traj` to `candidate` in `frame`, `None` if it does not
/// qualify.
///
/// The deviation from the predicted position, per frame, must lie inside the
/// velocity box. Once the trajectory has moved, the new motion per frame must
/// also respect the turning angle and acceleration limits. A zero limit
/// disables its test. Frames missing between the trajectory's last step and
/// `frame` extend the prediction at constant velocity.
fn link_cost(
    params: &TrackingParamsInner,
    traj: &Trajectory,
    frame: FrameNumber,
    candidate: &Point3<f64>,
) -> Option<f64> {
    let gap = frame_gap(traj.last().candidate.frame, frame);
    let deviation = (candidate - traj.predict(frame)) / gap;
    for axis in 0..3 {
        if deviation[axis] < params.velocity_min[axis] || deviation[axis] > params.velocity_max[axis]
        {
            return None;
        }
    }
    let mut cost = deviation.norm() / params.velocity_box_radius();

    if let Some(previous) = traj.last_motion() {
        let motion = (candidate - traj.last().position) / gap;
        if motion.norm() > MIN_MOTION {
            if params.max_acceleration > 0.0 {
                let acceleration = (motion - previous).norm();
                if acceleration > params.max_acceleration {
                    return None;
                }
                cost += acceleration / params.max_acceleration;
            }
            if params.max_turning_angle > 0.0 && previous.norm() > MIN_MOTION {
                let angle = previous.angle(&motion);
                if angle > params.max_turning_angle {
                    return None;
                }
                cost += angle / params.max_turning_angle;
            }
        }
    }
    Some(cost)
}

/// Run a fresh [`TrajectoryLinker`] over chronologically ordered frames.
///
/// With [`LinkDirection::Backward`] the frames are consumed last to first.
pub fn link_sequence(
    params: Arc<TrackingParamsInner>,
    frames: &[FrameCorrespondences],
    direction: LinkDirection,
) -> Result<LinkResult> {
    let mut linker = TrajectoryLinker::new(params, direction);
    match direction {
        LinkDirection::Forward => {
            for frame in frames.iter() {
                linker.process_frame(frame)?;
            }
        }
        LinkDirection::Backward => {
            for frame in frames.iter().rev() {
                linker.process_frame(frame)?;
            }
        }
    }
    Ok(linker.finish())
}
