use itertools::Itertools;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::trace;

use ptv_mvg::{MultiCameraSystem, SensorPoint, polyline_distance};
use ptv_types::{FrameTargets, SearchVolume};

use crate::{Result, similarity::targets_similar, target_pixel};

/// A two-camera match that survived the epipolar and volume tests.
#[derive(Debug, Clone)]
pub(crate) struct Seed {
    /// one slot per camera, two of them filled
    pub(crate) targets: Vec<Option<u32>>,
    pub(crate) point: Point3<f64>,
}

/// Epipolar search over every camera pair of the rig.
///
/// Pairs are searched in parallel; the returned seeds are in pair order.
pub(crate) fn find_seeds(
    system: &MultiCameraSystem,
    volume: &SearchVolume,
    frame: &FrameTargets,
) -> Result<Vec<Seed>> {
    let pairs: Vec<(usize, usize)> = (0..system.len()).tuple_combinations().collect();
    let per_pair = pairs
        .par_iter()
        .map(|&(a, b)| pair_seeds(system, volume, frame, a, b))
        .collect::<Result<Vec<_>>>()?;
    Ok(per_pair.into_iter().flatten().collect())
}

fn pair_seeds(
    system: &MultiCameraSystem,
    volume: &SearchVolume,
    frame: &FrameTargets,
    a: usize,
    b: usize,
) -> Result<Vec<Seed>> {
    let targets_a = &frame.per_camera[a];
    let targets_b = &frame.per_camera[b];
    let mut seeds = Vec::new();
    if targets_a.is_empty() || targets_b.is_empty() {
        return Ok(seeds);
    }

    let cam_b = system.cam(b)?;
    let sensor_b: Vec<SensorPoint> = targets_b
        .iter()
        .map(|t| cam_b.pixel_to_sensor(&target_pixel(t)))
        .collect();
    let n_cams = system.len();

    for (ia, ta) in targets_a.iter().enumerate() {
        let px_a = target_pixel(ta);
        let curve = system.epipolar_curve(
            a,
            &px_a,
            b,
            volume.depth_range(),
            volume.epipolar_samples,
        )?;
        if curve.is_empty() {
            trace!("cam {a} target {ia}: no usable epipolar curve in cam {b}");
            continue;
        }
        for (ib, tb) in targets_b.iter().enumerate() {
            let Some(dist) = polyline_distance(&curve, &sensor_b[ib]) else {
                continue;
            };
            if dist > volume.epipolar_band || !targets_similar(volume, ta, tb) {
                continue;
            }
            let Some(pt) = system.find3d(&[(a, px_a), (b, target_pixel(tb))])? else {
                continue;
            };
            if !volume.contains(&pt.point) {
                trace!(
                    "cam {a} target {ia} + cam {b} target {ib}: {:?} outside volume",
                    pt.point
                );
                continue;
            }
            let mut targets = vec![None; n_cams];
            targets[a] = Some(ia as u32);
            targets[b] = Some(ib as u32);
            seeds.push(Seed {
                targets,
                point: pt.point,
            });
        }
    }
    trace!("cams {a}-{b}: {} seeds", seeds.len());
    Ok(seeds)
}
