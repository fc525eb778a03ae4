use tracing::trace;

use ptv_mvg::{DistortedPixel, MultiCameraSystem, PointWithReprojError};
use ptv_types::{CandidatePoint, FrameTargets, SearchVolume, Target};

use crate::{Result, pair_search::Seed, similarity::gray_similarity, target_pixel};

/// Grow a seed into a full candidate by checking it in every other camera.
///
/// Returns `Ok(None)` when the seed does not hold up: too few cameras
/// agree, the re-triangulated point leaves the volume or the quality is
/// below the configured minimum.
pub(crate) fn verify_seed(
    system: &MultiCameraSystem,
    volume: &SearchVolume,
    frame: &FrameTargets,
    seed: &Seed,
) -> Result<Option<CandidatePoint>> {
    let tolerance = volume.reprojection_tolerance_px;
    let mut targets = seed.targets.clone();

    for (cam_idx, slot) in targets.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        let Some(projected) = system.cam(cam_idx)?.project(&seed.point) else {
            continue;
        };
        *slot = nearest_target(&frame.per_camera[cam_idx], &projected, tolerance);
    }

    let Some((mut cams, mut fit)) = triangulate(system, frame, &targets)? else {
        return Ok(None);
    };

    let over: Vec<usize> = cams
        .iter()
        .zip(fit.reproj_dists.iter())
        .filter(|(_, dist)| **dist > tolerance)
        .map(|(cam, _)| *cam)
        .collect();
    if !over.is_empty() {
        trace!("dropping cameras {over:?} above reprojection tolerance");
        for cam in over {
            targets[cam] = None;
        }
        if count(&targets) < volume.min_cameras {
            return Ok(None);
        }
        match triangulate(system, frame, &targets)? {
            Some(refit) => (cams, fit) = refit,
            None => return Ok(None),
        }
    }

    if cams.len() < volume.min_cameras {
        return Ok(None);
    }
    if !volume.contains(&fit.point) {
        trace!("{:?} left the volume after re-triangulation", fit.point);
        return Ok(None);
    }

    let contributing: Vec<&Target> = cams
        .iter()
        .filter_map(|&cam| {
            let idx = targets[cam]?;
            frame.per_camera[cam].get(idx as usize)
        })
        .collect();
    let similarity = gray_similarity(&contributing);
    let quality = cams.len() as f64 * similarity / (1.0 + fit.mean_reproj_dist);
    if quality < volume.min_correlation {
        trace!("quality {quality} below {}", volume.min_correlation);
        return Ok(None);
    }

    let mut reproj_dists = vec![None; targets.len()];
    for (cam, dist) in cams.iter().zip(fit.reproj_dists.iter()) {
        reproj_dists[*cam] = Some(*dist);
    }

    Ok(Some(CandidatePoint {
        position: fit.point,
        targets,
        reproj_dists,
        mean_reproj_dist: fit.mean_reproj_dist,
        quality,
        sum_gray: contributing.iter().map(|t| t.sum_gray).sum(),
    }))
}

fn count(targets: &[Option<u32>]) -> usize {
    targets.iter().filter(|t| t.is_some()).count()
}

/// The target closest to `projected` within `tolerance`, lowest index on ties.
fn nearest_target(targets: &[Target], projected: &DistortedPixel, tolerance: f64) -> Option<u32> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, t) in targets.iter().enumerate() {
        let dist = projected.distance(&target_pixel(t));
        if dist > tolerance {
            continue;
        }
        if best.is_none_or(|(_, best_dist)| dist < best_dist) {
            best = Some((idx, dist));
        }
    }
    best.map(|(idx, _)| idx as u32)
}

/// Triangulate from every filled slot, in camera order.
fn triangulate(
    system: &MultiCameraSystem,
    frame: &FrameTargets,
    targets: &[Option<u32>],
) -> Result<Option<(Vec<usize>, PointWithReprojError)>> {
    let mut cams = Vec::new();
    let mut points = Vec::new();
    for (cam, slot) in targets.iter().enumerate() {
        let Some(idx) = slot else { continue };
        let Some(t) = frame.per_camera[cam].get(*idx as usize) else {
            continue;
        };
        cams.push(cam);
        points.push((cam, target_pixel(t)));
    }
    if points.len() < 2 {
        return Ok(None);
    }
    Ok(system.find3d(&points)?.map(|fit| (cams, fit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64) -> Target {
        Target {
            x,
            y,
            num_pixels: 4,
            bbox_width: 2,
            bbox_height: 2,
            sum_gray: 100.0,
        }
    }

    #[test]
    fn nearest_within_tolerance() {
        let targets = vec![at(10.0, 10.0), at(12.0, 10.0), at(10.5, 10.0)];
        let p = DistortedPixel::new(10.4, 10.0);
        assert_eq!(nearest_target(&targets, &p, 1.0), Some(2));
        assert_eq!(nearest_target(&targets, &p, 0.05), None);
        assert_eq!(nearest_target(&[], &p, 1.0), None);
    }

    #[test]
    fn nearest_tie_goes_to_lower_index() {
        let targets = vec![at(11.0, 10.0), at(9.0, 10.0)];
        let p = DistortedPixel::new(10.0, 10.0);
        assert_eq!(nearest_target(&targets, &p, 2.0), Some(0));
    }
}
