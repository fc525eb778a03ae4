use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::Arc,
};

use tracing::{debug, trace};

use ptv_types::{FrameCorrespondences, FrameNumber, TrackingParamsInner};

use crate::{
    CandidateRef, LinkDirection, LinkResult, LinkSource, Result, Trajectory, TrajectoryId,
    TrajectoryState, TrajectoryStep, link_sequence, trajectory::frame_gap,
};

type Edge = (CandidateRef, CandidateRef);

/// Link chronologically ordered frames in both directions and merge.
///
/// The forward and backward runs are independent and run in parallel.
/// See [`merge_runs`] for how they are combined.
#[tracing::instrument(level = "debug", skip_all, fields(n_frames = frames.len()))]
pub fn link_bidirectional(
    params: Arc<TrackingParamsInner>,
    frames: &[FrameCorrespondences],
) -> Result<LinkResult> {
    let (forward, backward) = rayon::join(
        || link_sequence(Arc::clone(&params), frames, LinkDirection::Forward),
        || link_sequence(Arc::clone(&params), frames, LinkDirection::Backward),
    );
    Ok(merge_runs(&params, frames, &forward?, &backward?))
}

/// Links of a run as `(earlier, later)` candidate pairs.
fn chronological_edges(run: &LinkResult) -> BTreeSet<Edge> {
    run.trajectories
        .iter()
        .flat_map(|t| {
            t.steps().windows(2).map(|w| {
                let (a, b) = (w[0].candidate, w[1].candidate);
                if a.frame <= b.frame { (a, b) } else { (b, a) }
            })
        })
        .collect()
}

/// Combine a forward and a backward run over the same frames.
///
/// Links found by both runs and links found only by the forward run are
/// kept. A link found only by the backward run is added when it does not
/// compete with a kept link, i.e. its earlier candidate has no successor
/// and its later candidate no predecessor yet. The resulting chains are
/// rebuilt in chronological order and chains shorter than
/// `min_track_length` are dropped. Trajectory ids are assigned in order of
/// the first candidate of each chain. A chain that ends before the last
/// frame is terminated in the frame after its end.
pub fn merge_runs(
    params: &TrackingParamsInner,
    frames: &[FrameCorrespondences],
    forward: &LinkResult,
    backward: &LinkResult,
) -> LinkResult {
    let by_frame: BTreeMap<FrameNumber, &FrameCorrespondences> =
        frames.iter().map(|f| (f.frame, f)).collect();
    let last_frame = by_frame.keys().next_back().copied();

    let fwd = chronological_edges(forward);
    let bwd = chronological_edges(backward);

    let mut next: BTreeMap<CandidateRef, (CandidateRef, LinkSource)> = BTreeMap::new();
    let mut has_prev: BTreeSet<CandidateRef> = BTreeSet::new();
    for &(a, b) in fwd.iter() {
        let source = if bwd.contains(&(a, b)) {
            LinkSource::Both
        } else {
            LinkSource::ForwardOnly
        };
        next.insert(a, (b, source));
        has_prev.insert(b);
    }
    let mut n_backward_only = 0;
    for &(a, b) in bwd.difference(&fwd) {
        if next.contains_key(&a) || has_prev.contains(&b) {
            trace!("backward link {a:?} -> {b:?} competes with a forward link");
            continue;
        }
        next.insert(a, (b, LinkSource::BackwardOnly));
        has_prev.insert(b);
        n_backward_only += 1;
    }

    let nodes: BTreeSet<CandidateRef> = forward
        .trajectories
        .iter()
        .chain(backward.trajectories.iter())
        .flat_map(|t| t.candidates())
        .collect();

    let position = |c: &CandidateRef| {
        by_frame
            .get(&c.frame)
            .and_then(|f| f.candidates.get(c.index))
            .map(|cand| cand.position)
    };

    let mut trajectories = Vec::new();
    let mut members = BTreeSet::new();
    for start in nodes.iter().filter(|n| !has_prev.contains(n)) {
        let mut chain = vec![(*start, None)];
        let mut cursor = *start;
        while let Some(&(to, source)) = next.get(&cursor) {
            chain.push((to, Some(source)));
            cursor = to;
        }
        if chain.len() < params.min_track_length {
            trace!("dropping chain of {} from {start:?}", chain.len());
            continue;
        }

        let mut steps: Vec<TrajectoryStep> = Vec::with_capacity(chain.len());
        for (candidate, link) in chain {
            let Some(pos) = position(&candidate) else {
                continue;
            };
            let velocity = steps
                .last()
                .map(|prev| {
                    (pos - prev.position) / frame_gap(prev.candidate.frame, candidate.frame)
                })
                .unwrap_or_else(nalgebra::Vector3::zeros);
            steps.push(TrajectoryStep {
                candidate,
                position: pos,
                velocity,
                link,
            });
        }
        let Some(end) = steps.last().map(|s| s.candidate.frame) else {
            continue;
        };
        members.extend(steps.iter().map(|s| s.candidate));

        let (state, terminated_at) = if Some(end) == last_frame {
            (TrajectoryState::Active, None)
        } else {
            let after = by_frame
                .range((Bound::Excluded(end), Bound::Unbounded))
                .next()
                .map(|(k, _)| *k);
            (TrajectoryState::Terminated, after)
        };
        let id = TrajectoryId(trajectories.len() as u32);
        trajectories.push(Trajectory::from_steps(id, state, steps, terminated_at));
    }

    let unlinked: Vec<CandidateRef> = frames
        .iter()
        .flat_map(|f| {
            (0..f.candidates.len()).map(move |index| CandidateRef {
                frame: f.frame,
                index,
            })
        })
        .filter(|c| !members.contains(c))
        .collect();

    debug!(
        "merged {} forward and {} backward links ({n_backward_only} backward only) into {} trajectories",
        fwd.len(),
        bwd.len(),
        trajectories.len()
    );
    LinkResult {
        trajectories,
        unlinked,
    }
}
