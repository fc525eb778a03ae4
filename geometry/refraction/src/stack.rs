use bisection_search::{BisectionSearch, Interval};
use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::{RefractionError, Result, refract};

const PARALLEL_TOLERANCE: f64 = 1e-9;
const THICKNESS_TOLERANCE: f64 = 1e-6;
const SIN_TOLERANCE: f64 = 1e-14;
const MAX_BISECTION_STEPS: usize = 200;

/// One planar boundary and the medium behind it.
///
/// The plane is `{p : normal · p = distance}` with `normal` taken as a unit
/// vector pointing away from the camera. `refractive_index` and `thickness`
/// describe the medium entered when crossing the plane. The last interface of
/// a stack bounds the semi-infinite object medium and has no thickness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefractiveInterface {
    pub normal: Vector3<f64>,
    pub distance: f64,
    pub refractive_index: f64,
    #[serde(default)]
    pub thickness: Option<f64>,
}

/// An ordered stack of parallel refractive interfaces.
///
/// An empty stack means the camera and the object share one homogeneous
/// medium and every ray is straight.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceStack {
    camera_medium_index: f64,
    normal: Option<Unit<Vector3<f64>>>,
    interfaces: Vec<RefractiveInterface>,
}

/// A ray after it has crossed the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedRay {
    /// Where the ray entered its final medium (the camera center if it never
    /// reached the stack).
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
    pub medium_index: f64,
    /// Number of interfaces crossed.
    pub crossings: usize,
}

fn check_index(n: f64) -> Result<()> {
    if n.is_finite() && n >= 1.0 {
        Ok(())
    } else {
        Err(RefractionError::InvalidRefractiveIndex(n))
    }
}

impl Default for InterfaceStack {
    fn default() -> Self {
        Self::homogeneous(1.0)
    }
}

impl InterfaceStack {
    /// A stack without interfaces in a medium of index `n`.
    pub fn homogeneous(n: f64) -> Self {
        Self {
            camera_medium_index: n,
            normal: None,
            interfaces: Vec::new(),
        }
    }

    pub fn new(camera_medium_index: f64, interfaces: Vec<RefractiveInterface>) -> Result<Self> {
        check_index(camera_medium_index)?;

        let mut normalized = Vec::with_capacity(interfaces.len());
        let mut common: Option<Unit<Vector3<f64>>> = None;
        for (i, iface) in interfaces.into_iter().enumerate() {
            check_index(iface.refractive_index)?;
            if !iface.normal.iter().all(|v| v.is_finite()) {
                return Err(RefractionError::InvalidNormal);
            }
            let normal = Unit::try_new(iface.normal, 1e-12).ok_or(RefractionError::InvalidNormal)?;
            match common {
                None => common = Some(normal),
                Some(first) => {
                    if (first.dot(normal.as_ref()) - 1.0).abs() > PARALLEL_TOLERANCE {
                        return Err(RefractionError::NonParallelInterfaces(i));
                    }
                }
            }
            normalized.push(RefractiveInterface {
                normal: normal.into_inner(),
                ..iface
            });
        }

        for (i, pair) in normalized.windows(2).enumerate() {
            let gap = pair[1].distance - pair[0].distance;
            if gap <= 0.0 {
                return Err(RefractionError::InterfacesOutOfOrder(i + 1));
            }
            match pair[0].thickness {
                Some(t) if (t - gap).abs() <= THICKNESS_TOLERANCE * gap.max(1.0) => {}
                thickness => {
                    return Err(RefractionError::ThicknessMismatch {
                        index: i,
                        thickness,
                        gap,
                    });
                }
            }
        }
        if normalized.last().is_some_and(|l| l.thickness.is_some()) {
            return Err(RefractionError::LastInterfaceHasThickness);
        }

        Ok(Self {
            camera_medium_index,
            normal: common,
            interfaces: normalized,
        })
    }

    /// Build a stack of parallel slabs.
    ///
    /// The first plane is at `distance` along `normal`. Each entry of `slabs`
    /// is `(refractive_index, thickness)`; the object medium follows the last
    /// slab.
    pub fn slabs(
        normal: Vector3<f64>,
        distance: f64,
        camera_medium_index: f64,
        slabs: &[(f64, f64)],
        object_medium_index: f64,
    ) -> Result<Self> {
        let mut interfaces = Vec::with_capacity(slabs.len() + 1);
        let mut d = distance;
        for &(n, thickness) in slabs {
            interfaces.push(RefractiveInterface {
                normal,
                distance: d,
                refractive_index: n,
                thickness: Some(thickness),
            });
            d += thickness;
        }
        interfaces.push(RefractiveInterface {
            normal,
            distance: d,
            refractive_index: object_medium_index,
            thickness: None,
        });
        Self::new(camera_medium_index, interfaces)
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn interfaces(&self) -> &[RefractiveInterface] {
        &self.interfaces
    }

    pub fn camera_medium_index(&self) -> f64 {
        self.camera_medium_index
    }

    pub fn object_medium_index(&self) -> f64 {
        self.interfaces
            .last()
            .map(|l| l.refractive_index)
            .unwrap_or(self.camera_medium_index)
    }

    /// The same stack with every plane moved by `delta` along the normal.
    pub fn shifted(&self, delta: f64) -> Self {
        let mut result = self.clone();
        for iface in result.interfaces.iter_mut() {
            iface.distance += delta;
        }
        result
    }

    /// True if `p` is strictly in front of the first interface.
    pub fn is_camera_side(&self, p: &Point3<f64>) -> bool {
        match (self.normal, self.interfaces.first()) {
            (Some(n), Some(first)) => n.dot(&p.coords) < first.distance,
            _ => true,
        }
    }

    /// True if `p` is strictly behind the last interface.
    pub fn is_in_object_medium(&self, p: &Point3<f64>) -> bool {
        match (self.normal, self.interfaces.last()) {
            (Some(n), Some(last)) => n.dot(&p.coords) > last.distance,
            _ => true,
        }
    }

    /// Follow a ray from `origin` through every interface.
    ///
    /// A ray that never heads into the stack stays in the camera medium.
    /// Returns `None` if `origin` is not on the camera side or the ray is
    /// totally reflected at some boundary.
    pub fn trace(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
    ) -> Option<TracedRay> {
        let normal = match self.normal {
            Some(n) if n.dot(direction.as_ref()) > 0.0 => n,
            _ => {
                return Some(TracedRay {
                    origin: *origin,
                    direction: *direction,
                    medium_index: self.camera_medium_index,
                    crossings: 0,
                });
            }
        };
        if !self.is_camera_side(origin) {
            return None;
        }

        let mut o = *origin;
        let mut dir = *direction;
        let mut n_prev = self.camera_medium_index;
        for iface in self.interfaces.iter() {
            let t = (iface.distance - normal.dot(&o.coords)) / normal.dot(dir.as_ref());
            o += dir.into_inner() * t;
            dir = refract(&dir, &normal, n_prev, iface.refractive_index)?;
            n_prev = iface.refractive_index;
        }
        Some(TracedRay {
            origin: o,
            direction: dir,
            medium_index: n_prev,
            crossings: self.interfaces.len(),
        })
    }

    /// Direction in which a ray must leave `origin` so that its refracted path
    /// reaches `target`.
    ///
    /// All planes are parallel, so the path lies in the plane spanned by the
    /// normal and the lateral offset to the target. Along that path the Snell
    /// invariant `n0 sin(a0) = nk sin(ak)` holds in every medium and the total
    /// lateral travel `sum(Lk tan(ak))` grows monotonically with `sin(a0)`. The
    /// root of "lateral travel minus lateral offset" is found by bisection.
    ///
    /// Returns `None` unless `origin` is on the camera side and `target` is in
    /// the object medium.
    pub fn direction_towards(
        &self,
        origin: &Point3<f64>,
        target: &Point3<f64>,
    ) -> Option<Unit<Vector3<f64>>> {
        let rel = target - origin;
        let (normal, first, last) = match (self.normal, self.interfaces.first(), self.interfaces.last()) {
            (Some(n), Some(first), Some(last)) => (n, first, last),
            _ => return Unit::try_new(rel, 1e-12),
        };
        if !self.is_camera_side(origin) || !self.is_in_object_medium(target) {
            return None;
        }

        // (length along the normal, refractive index) of each traversed medium
        let mut segments = Vec::with_capacity(self.interfaces.len() + 1);
        segments.push((
            first.distance - normal.dot(&origin.coords),
            self.camera_medium_index,
        ));
        for pair in self.interfaces.windows(2) {
            segments.push((pair[1].distance - pair[0].distance, pair[0].refractive_index));
        }
        segments.push((normal.dot(&target.coords) - last.distance, last.refractive_index));

        let depth = normal.dot(&rel);
        let lateral = rel - normal.into_inner() * depth;
        let r = lateral.norm();
        if r <= 1e-12 * depth.max(1.0) {
            return Some(normal);
        }

        let n0 = self.camera_medium_index;
        let s_max = segments
            .iter()
            .fold(1.0f64, |acc, &(_, n)| acc.min(n / n0));
        let lateral_error = |s: &f64| -> f64 {
            segments
                .iter()
                .map(|&(len, n)| {
                    let q = n0 / n * s;
                    len * q / (1.0 - q * q).sqrt()
                })
                .sum::<f64>()
                - r
        };
        let interval = Interval::new(0.0, s_max * (1.0 - 1e-12))?;
        let root = BisectionSearch::new(interval, lateral_error)?
            .solve(SIN_TOLERANCE, MAX_BISECTION_STEPS);
        let s = root.x;

        let dir = normal.into_inner() * (1.0 - s * s).sqrt() + lateral * (s / r);
        Some(Unit::new_normalize(dir))
    }
}
