use cam_geom::WorldFrame;
use nalgebra::{Matrix3, Point3, Unit, Vector3};

/// Minimum sine of the angle between two rays for them to be intersected.
const MIN_RAY_SINE: f64 = 1e-9;

/// A half-line in the world frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Unit<Vector3<f64>>) -> Self {
        Self { origin, direction }
    }

    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.into_inner() * t
    }

    /// The point of the ray at world height `z`.
    ///
    /// `None` if the ray runs parallel to the plane `z = const`.
    pub fn point_at_world_z(&self, z: f64) -> Option<Point3<f64>> {
        if self.direction.z.abs() < 1e-15 {
            return None;
        }
        let t = (z - self.origin.z) / self.direction.z;
        Some(self.point_at(t))
    }

    /// Perpendicular distance from `p` to the infinite line of the ray.
    pub fn distance_to(&self, p: &Point3<f64>) -> f64 {
        (p - self.origin).cross(self.direction.as_ref()).norm()
    }

    fn to_cam_geom(&self) -> cam_geom::Ray<WorldFrame, f64> {
        cam_geom::Ray::new(self.origin.coords.transpose(), self.direction.transpose())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RayIntersection {
    pub point: Point3<f64>,
    /// Distance from `point` to each input ray, in input order.
    pub ray_distances: Vec<f64>,
}

/// Least-squares intersection of two or more rays.
///
/// Returns `None` for fewer than two rays or if all rays are parallel.
pub fn intersect_rays(rays: &[Ray]) -> Option<RayIntersection> {
    if rays.len() < 2 {
        return None;
    }
    let any_crossing = rays.iter().enumerate().any(|(i, a)| {
        rays[i + 1..]
            .iter()
            .any(|b| a.direction.cross(b.direction.as_ref()).norm() > MIN_RAY_SINE)
    });
    if !any_crossing {
        return None;
    }

    let cg_rays: Vec<_> = rays.iter().map(Ray::to_cam_geom).collect();
    let pt = cam_geom::best_intersection_of_rays(&cg_rays).ok()?;
    let estimate = Point3::new(pt.data[(0, 0)], pt.data[(0, 1)], pt.data[(0, 2)]);
    if !estimate.iter().all(|v| v.is_finite()) {
        return None;
    }
    let point = polish_intersection(rays, estimate);
    let ray_distances = rays.iter().map(|r| r.distance_to(&point)).collect();
    Some(RayIntersection {
        point,
        ray_distances,
    })
}

/// One Gauss-Newton step on the summed squared ray distances, taken from
/// `estimate`.
///
/// The cam-geom solver truncates small singular values, which leaves an error
/// of up to ~1e-5 for rays from distant cameras. Solving the 3x3 normal
/// equations `sum(I - d d^T) dx = sum(I - d d^T) (o - x)` relative to the
/// estimate removes it. Falls back to `estimate` if the system is singular.
fn polish_intersection(rays: &[Ray], estimate: Point3<f64>) -> Point3<f64> {
    let mut lhs = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for ray in rays {
        let d = ray.direction.as_ref();
        let proj = Matrix3::identity() - d * d.transpose();
        rhs += proj * (ray.origin - estimate);
        lhs += proj;
    }
    match lhs.cholesky() {
        Some(chol) => {
            let polished = estimate + chol.solve(&rhs);
            if polished.iter().all(|v| v.is_finite()) {
                polished
            } else {
                estimate
            }
        }
        None => estimate,
    }
}
