use nalgebra::Point3;

use crate::{Camera, DistortedPixel, PtvMvgError, Result, SensorPoint, intersect_rays};

/// A triangulated point and how well it reprojects.
#[derive(Debug, Clone, PartialEq)]
pub struct PointWithReprojError {
    pub point: Point3<f64>,
    /// Reprojection distance in pixels for each input observation.
    pub reproj_dists: Vec<f64>,
    pub mean_reproj_dist: f64,
}

impl PointWithReprojError {
    pub fn new(point: Point3<f64>, reproj_dists: Vec<f64>) -> Self {
        let mean_reproj_dist = reproj_dists.iter().sum::<f64>() / reproj_dists.len() as f64;
        Self {
            point,
            reproj_dists,
            mean_reproj_dist,
        }
    }
}

/// The cameras of one rig, addressed by index.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiCameraSystem {
    cams: Vec<Camera>,
}

impl MultiCameraSystem {
    pub fn new(cams: Vec<Camera>) -> Self {
        Self { cams }
    }

    pub fn cams(&self) -> &[Camera] {
        &self.cams
    }

    pub fn len(&self) -> usize {
        self.cams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cams.is_empty()
    }

    pub fn cam(&self, idx: usize) -> Result<&Camera> {
        self.cams.get(idx).ok_or(PtvMvgError::UnknownCamera(idx))
    }

    /// Mutable access for orientation refinement.
    pub fn cam_mut(&mut self, idx: usize) -> Result<&mut Camera> {
        self.cams.get_mut(idx).ok_or(PtvMvgError::UnknownCamera(idx))
    }

    pub fn cam_by_name(&self, name: &str) -> Option<(usize, &Camera)> {
        self.cams.iter().enumerate().find(|(_, c)| c.name() == name)
    }

    /// Triangulate one point from observations in two or more cameras.
    ///
    /// Each pixel is back-projected into the object medium and the rays are
    /// intersected in the least-squares sense. `Ok(None)` means the geometry
    /// is unusable: a pixel cannot be back-projected, the rays are parallel
    /// or the resulting point cannot be projected into one of the cameras.
    pub fn find3d(
        &self,
        points: &[(usize, DistortedPixel)],
    ) -> Result<Option<PointWithReprojError>> {
        if points.len() < 2 {
            return Err(PtvMvgError::NotEnoughPoints);
        }
        let mut rays = Vec::with_capacity(points.len());
        for (idx, px) in points.iter() {
            match self.cam(*idx)?.back_project(px) {
                Some(ray) => rays.push(ray),
                None => return Ok(None),
            }
        }
        let Some(intersection) = intersect_rays(&rays) else {
            return Ok(None);
        };
        self.reprojection(&intersection.point, points)
    }

    /// Reprojection distances of `point` against the observations.
    ///
    /// `Ok(None)` if the point is unusable for one of the cameras.
    pub fn reprojection(
        &self,
        point: &Point3<f64>,
        points: &[(usize, DistortedPixel)],
    ) -> Result<Option<PointWithReprojError>> {
        let mut dists = Vec::with_capacity(points.len());
        for (idx, px) in points.iter() {
            match self.cam(*idx)?.project(point) {
                Some(projected) => dists.push(projected.distance(px)),
                None => return Ok(None),
            }
        }
        Ok(Some(PointWithReprojError::new(*point, dists)))
    }

    /// The epipolar curve of pixel `px` of camera `from` in camera `to`.
    ///
    /// The back-projected ray of `px` is sampled at `samples` evenly spaced
    /// world heights between `z_range.0` and `z_range.1` and each sample is
    /// projected into `to`, refracting through its interface stack. Samples
    /// that are unusable in `to` are skipped, so the result may be shorter
    /// than `samples` or empty. The curve is in undistorted sensor
    /// coordinates of `to`.
    pub fn epipolar_curve(
        &self,
        from: usize,
        px: &DistortedPixel,
        to: usize,
        z_range: (f64, f64),
        samples: usize,
    ) -> Result<Vec<SensorPoint>> {
        let cam_from = self.cam(from)?;
        let cam_to = self.cam(to)?;
        let Some(ray) = cam_from.back_project(px) else {
            return Ok(Vec::new());
        };
        let (z0, z1) = z_range;
        let steps = samples.max(2);
        let curve = (0..steps)
            .filter_map(|i| {
                let z = z0 + (z1 - z0) * i as f64 / (steps - 1) as f64;
                let p = ray.point_at_world_z(z)?;
                cam_to.project_to_sensor(&p)
            })
            .collect();
        Ok(curve)
    }
}

/// Smallest distance from `p` to a polyline.
///
/// A single vertex is treated as a point. `None` for an empty polyline.
pub fn polyline_distance(polyline: &[SensorPoint], p: &SensorPoint) -> Option<f64> {
    match polyline {
        [] => None,
        [only] => Some(only.distance(p)),
        _ => polyline
            .windows(2)
            .map(|seg| {
                let a = seg[0].coords;
                let b = seg[1].coords;
                let ab = b - a;
                let len2 = ab.norm_squared();
                let t = if len2 > 0.0 {
                    ((p.coords - a).dot(&ab) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                nalgebra::distance(&(a + ab * t), &p.coords)
            })
            .reduce(f64::min),
    }
}
