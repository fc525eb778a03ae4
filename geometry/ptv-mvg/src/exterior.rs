use nalgebra::{Matrix3, Point3, Vector3};

use crate::{PtvMvgError, Result};

const ORTHONORMAL_TOLERANCE: f64 = 1e-9;

/// Position and orientation of a camera.
///
/// The orientation is held both as the angles `omega`, `phi`, `kappa`
/// (rotations about x, y and z) and as the rotation matrix `dm` they
/// generate. Both are private and every mutation updates both.
#[derive(Debug, Clone, PartialEq)]
pub struct Exterior {
    position: Point3<f64>,
    omega: f64,
    phi: f64,
    kappa: f64,
    rotation: Matrix3<f64>,
}

fn rotation_matrix(omega: f64, phi: f64, kappa: f64) -> Matrix3<f64> {
    let (so, co) = omega.sin_cos();
    let (sp, cp) = phi.sin_cos();
    let (sk, ck) = kappa.sin_cos();
    #[rustfmt::skip]
    let dm = Matrix3::new(
        cp * ck,                -cp * sk,                sp,
        co * sk + so * sp * ck, co * ck - so * sp * sk, -so * cp,
        so * sk - co * sp * ck, so * ck + co * sp * sk,  co * cp,
    );
    dm
}

impl Exterior {
    pub fn new(position: Point3<f64>, omega: f64, phi: f64, kappa: f64) -> Self {
        Self {
            position,
            omega,
            phi,
            kappa,
            rotation: rotation_matrix(omega, phi, kappa),
        }
    }

    /// Build from a rotation matrix, recovering the angles.
    ///
    /// At `phi = ±π/2` the decomposition is not unique and `omega` is set to
    /// zero.
    pub fn from_rotation_matrix(position: Point3<f64>, dm: Matrix3<f64>) -> Result<Self> {
        let should_be_identity = dm.transpose() * dm;
        if !dm.iter().all(|v| v.is_finite())
            || (should_be_identity - Matrix3::identity()).amax() > ORTHONORMAL_TOLERANCE
            || dm.determinant() < 0.0
        {
            return Err(PtvMvgError::InvalidRotationMatrix);
        }

        let phi = dm[(0, 2)].clamp(-1.0, 1.0).asin();
        let (omega, kappa) = if phi.cos() > 1e-12 {
            (
                (-dm[(1, 2)]).atan2(dm[(2, 2)]),
                (-dm[(0, 1)]).atan2(dm[(0, 0)]),
            )
        } else {
            (0.0, dm[(1, 0)].atan2(dm[(1, 1)]))
        };
        Ok(Self {
            position,
            omega,
            phi,
            kappa,
            rotation: rotation_matrix(omega, phi, kappa),
        })
    }

    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn set_position(&mut self, position: Point3<f64>) {
        self.position = position;
    }

    /// `(omega, phi, kappa)` in radians.
    pub fn angles(&self) -> (f64, f64, f64) {
        (self.omega, self.phi, self.kappa)
    }

    pub fn set_angles(&mut self, omega: f64, phi: f64, kappa: f64) {
        self.omega = omega;
        self.phi = phi;
        self.kappa = kappa;
        self.rotation = rotation_matrix(omega, phi, kappa);
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// World point to camera frame, `dmᵀ (p - p0)`.
    pub fn world_to_camera(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation.tr_mul(&(p - self.position))
    }

    /// Camera-frame direction to world frame, `dm v`.
    pub fn camera_to_world_dir(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_is_orthonormal() {
        let ext = Exterior::new(Point3::origin(), 0.3, -0.7, 1.9);
        let r = ext.rotation();
        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn angles_survive_matrix_round_trip() {
        let ext = Exterior::new(Point3::new(1.0, 2.0, 3.0), 0.3, -0.7, 1.9);
        let back = Exterior::from_rotation_matrix(*ext.position(), *ext.rotation()).unwrap();
        let (o, p, k) = back.angles();
        assert_relative_eq!(o, 0.3, epsilon = 1e-12);
        assert_relative_eq!(p, -0.7, epsilon = 1e-12);
        assert_relative_eq!(k, 1.9, epsilon = 1e-12);
        assert_relative_eq!(*back.rotation(), *ext.rotation(), epsilon = 1e-12);
    }

    #[test]
    fn gimbal_lock_keeps_matrix() {
        let ext = Exterior::new(Point3::origin(), 0.4, std::f64::consts::FRAC_PI_2, 0.2);
        let back = Exterior::from_rotation_matrix(Point3::origin(), *ext.rotation()).unwrap();
        assert_relative_eq!(*back.rotation(), *ext.rotation(), epsilon = 1e-9);
    }

    #[test]
    fn set_angles_updates_matrix() {
        let mut ext = Exterior::new(Point3::origin(), 0.0, 0.0, 0.0);
        assert_eq!(ext.rotation(), &Matrix3::identity());
        ext.set_angles(0.1, 0.2, 0.3);
        assert_eq!(ext.rotation(), Exterior::new(Point3::origin(), 0.1, 0.2, 0.3).rotation());
    }

    #[test]
    fn rejects_non_rotation() {
        let scaled = Matrix3::identity() * 2.0;
        assert_eq!(
            Exterior::from_rotation_matrix(Point3::origin(), scaled),
            Err(PtvMvgError::InvalidRotationMatrix)
        );
        let mirror = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
        assert!(Exterior::from_rotation_matrix(Point3::origin(), mirror).is_err());
    }

    #[test]
    fn camera_frame_looks_down_negative_z() {
        // camera above the origin, identity orientation
        let ext = Exterior::new(Point3::new(0.0, 0.0, 500.0), 0.0, 0.0, 0.0);
        let v = ext.world_to_camera(&Point3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(v, Vector3::new(10.0, 0.0, -500.0));
    }
}
