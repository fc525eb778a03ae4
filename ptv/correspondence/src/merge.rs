use std::cmp::Ordering;

use ptv_types::{CandidatePoint, FrameTargets, TargetRef};
use tracing::trace;

/// Total order used to rank candidates competing for the same targets.
///
/// Higher quality first, then more cameras, then lower mean residual and
/// finally the contributing target list, compared lexicographically.
pub(crate) fn rank(a: &CandidatePoint, b: &CandidatePoint) -> Ordering {
    b.quality
        .total_cmp(&a.quality)
        .then_with(|| b.num_cameras().cmp(&a.num_cameras()))
        .then_with(|| a.mean_reproj_dist.total_cmp(&b.mean_reproj_dist))
        .then_with(|| a.target_refs().cmp(b.target_refs()))
}

/// Accept candidates best-first so that no target is used twice.
///
/// Returns the accepted candidates in rank order and the targets that no
/// accepted candidate uses.
pub(crate) fn select_exclusive(
    frame: &FrameTargets,
    mut candidates: Vec<CandidatePoint>,
) -> (Vec<CandidatePoint>, Vec<TargetRef>) {
    // The same target set can be reached from several seed pairs.
    candidates.sort_by(|a, b| a.targets.cmp(&b.targets).then_with(|| rank(a, b)));
    candidates.dedup_by(|later, earlier| later.targets == earlier.targets);

    candidates.sort_by(rank);

    let mut used: Vec<Vec<bool>> = frame
        .per_camera
        .iter()
        .map(|targets| vec![false; targets.len()])
        .collect();
    let mut accepted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let free = candidate
            .target_refs()
            .all(|r| !used[r.cam.idx()][r.idx as usize]);
        if !free {
            trace!(
                "candidate at {:?} (quality {}) lost a target to a better one",
                candidate.position,
                candidate.quality
            );
            continue;
        }
        for r in candidate.target_refs() {
            used[r.cam.idx()][r.idx as usize] = true;
        }
        accepted.push(candidate);
    }

    let unmatched = frame
        .target_refs()
        .filter(|r| !used[r.cam.idx()][r.idx as usize])
        .collect();
    (accepted, unmatched)
}
