//! Light refraction at planar interfaces using Snell's law.
//!
//! A camera looking into a water tank sees each particle along a bent path:
//! the ray leaves the camera in air, crosses a glass wall and reaches the
//! particle in water. [`InterfaceStack`] describes such a sequence of parallel
//! planar boundaries and can
//!
//! - trace a ray from the camera side through every boundary
//!   ([`InterfaceStack::trace`]), and
//! - find the direction in which a ray must leave the camera so that its
//!   refracted path reaches a given point ([`InterfaceStack::direction_towards`]).
use nalgebra::{Unit, Vector3};

mod stack;
pub use stack::{InterfaceStack, RefractiveInterface, TracedRay};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RefractionError {
    #[error("refractive index must be finite and at least 1, got {0}")]
    InvalidRefractiveIndex(f64),
    #[error("interface normal must be non-zero and finite")]
    InvalidNormal,
    #[error("interface {0} is not parallel to the first interface")]
    NonParallelInterfaces(usize),
    #[error("interface {0} is not farther along the normal than the previous one")]
    InterfacesOutOfOrder(usize),
    #[error("interface {index} thickness {thickness:?} does not match the gap {gap} to the next interface")]
    ThicknessMismatch {
        index: usize,
        thickness: Option<f64>,
        gap: f64,
    },
    #[error("the last interface bounds a semi-infinite medium and must not have a thickness")]
    LastInterfaceHasThickness,
}

pub type Result<T> = std::result::Result<T, RefractionError>;

/// Refract `incident` at a boundary between media with indices `n1` and `n2`.
///
/// `normal` is the unit normal of the boundary oriented along the direction of
/// travel, i.e. `normal · incident > 0`. Returns `None` on total internal
/// reflection or if the ray does not travel into the boundary.
///
/// ```text
///          n1          |
///        incident  ----+
///              ---/ a  |
///     --------/--------+--------- boundary
///                      | \
///          n2          |b \  refracted
///                      |   \
///                    normal
///
///     n1 sin(a) = n2 sin(b)
/// ```
pub fn refract(
    incident: &Unit<Vector3<f64>>,
    normal: &Unit<Vector3<f64>>,
    n1: f64,
    n2: f64,
) -> Option<Unit<Vector3<f64>>> {
    let cos_i = normal.dot(incident.as_ref());
    if cos_i <= 0.0 {
        return None;
    }
    let eta = n1 / n2;
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t > 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    let dir = incident.into_inner() * eta + normal.into_inner() * (cos_t - eta * cos_i);
    Some(Unit::new_normalize(dir))
}
