use nalgebra::{Point2, Point3, Unit, Vector3};
use refraction::InterfaceStack;

use crate::{
    AddedParameters, DistortedPixel, Exterior, Interior, PtvMvgError, Ray, Result, SensorFormat,
    SensorPoint,
};

/// A calibrated camera.
///
/// The parts are only reachable through getters so that a constructed
/// camera always satisfies the checks done in [`Camera::new`]. The
/// orientation refinement builds a new camera from modified parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    name: String,
    exterior: Exterior,
    interior: Interior,
    added: AddedParameters,
    sensor: SensorFormat,
    interfaces: InterfaceStack,
}

impl Camera {
    pub fn new(
        name: impl Into<String>,
        exterior: Exterior,
        interior: Interior,
        added: AddedParameters,
        sensor: SensorFormat,
        interfaces: InterfaceStack,
    ) -> Result<Self> {
        interior.validate()?;
        added.validate()?;
        sensor.validate()?;
        if !exterior.position().iter().all(|v| v.is_finite()) {
            return Err(PtvMvgError::InvalidCalibration("camera position must be finite"));
        }
        if !interfaces.is_camera_side(exterior.position()) {
            return Err(PtvMvgError::CameraInsideInterfaceStack);
        }
        Ok(Self {
            name: name.into(),
            exterior,
            interior,
            added,
            sensor,
            interfaces,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exterior(&self) -> &Exterior {
        &self.exterior
    }

    pub fn interior(&self) -> &Interior {
        &self.interior
    }

    pub fn added(&self) -> &AddedParameters {
        &self.added
    }

    pub fn sensor(&self) -> &SensorFormat {
        &self.sensor
    }

    pub fn interfaces(&self) -> &InterfaceStack {
        &self.interfaces
    }

    /// Project a world point to a distorted pixel, refracting through the
    /// interface stack.
    ///
    /// Returns `None` if the point is behind the camera or outside the
    /// object medium.
    pub fn project(&self, p: &Point3<f64>) -> Option<DistortedPixel> {
        let sensor = self.project_to_sensor(p)?;
        Some(self.sensor_to_pixel(&sensor))
    }

    /// Like [`Camera::project`] but stops at undistorted sensor coordinates.
    pub fn project_to_sensor(&self, p: &Point3<f64>) -> Option<SensorPoint> {
        let dir = self
            .interfaces
            .direction_towards(self.exterior.position(), p)?;
        let cam = self.exterior.rotation().tr_mul(dir.as_ref());
        self.camera_frame_to_sensor(&cam)
    }

    /// Project ignoring refraction, as an ideal pinhole with distortion.
    ///
    /// This is cheaper than [`Camera::project`] and is meant for coarse
    /// pre-filtering. Returns `None` only for points behind the camera.
    pub fn project_flat(&self, p: &Point3<f64>) -> Option<DistortedPixel> {
        let cam = self.exterior.world_to_camera(p);
        let sensor = self.camera_frame_to_sensor(&cam)?;
        Some(self.sensor_to_pixel(&sensor))
    }

    /// The ray in the object medium that images onto `px`.
    ///
    /// If the camera ray never reaches the interface stack, the ray in the
    /// camera medium is returned. Returns `None` on total internal
    /// reflection.
    pub fn back_project(&self, px: &DistortedPixel) -> Option<Ray> {
        self.sensor_ray(&self.pixel_to_sensor(px))
    }

    pub fn sensor_ray(&self, s: &SensorPoint) -> Option<Ray> {
        let cam_dir = Vector3::new(s.coords.x, s.coords.y, -self.interior.cc);
        let world_dir = Unit::try_new(self.exterior.camera_to_world_dir(&cam_dir), 1e-15)?;
        let traced = self
            .interfaces
            .trace(self.exterior.position(), &world_dir)?;
        Some(Ray::new(traced.origin, traced.direction))
    }

    /// Pixel to undistorted sensor coordinates relative to the principal point.
    pub fn pixel_to_sensor(&self, px: &DistortedPixel) -> SensorPoint {
        let metric = self.sensor.pixel_to_metric(px);
        let corrected = self.added.correct(&metric);
        SensorPoint::new(corrected.x - self.interior.xh, corrected.y - self.interior.yh)
    }

    pub fn sensor_to_pixel(&self, s: &SensorPoint) -> DistortedPixel {
        let shifted = Point2::new(s.coords.x + self.interior.xh, s.coords.y + self.interior.yh);
        let metric = self.added.distort(&shifted);
        self.sensor.metric_to_pixel(&metric)
    }

    fn camera_frame_to_sensor(&self, v: &Vector3<f64>) -> Option<SensorPoint> {
        // the camera looks along -Z
        if v.z.is_nan() || v.z >= 0.0 {
            return None;
        }
        let cc = self.interior.cc;
        Some(SensorPoint::new(-cc * v.x / v.z, -cc * v.y / v.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tank() -> InterfaceStack {
        InterfaceStack::slabs(Vector3::new(0.0, 0.0, -1.0), -100.0, 1.0, &[(1.49, 5.0)], 1.33)
            .unwrap()
    }

    fn camera(stack: InterfaceStack) -> Camera {
        let exterior = Exterior::new(Point3::new(-120.0, 40.0, 600.0), 0.05, -0.2, 0.1);
        let added = AddedParameters {
            k1: 1e-4,
            p1: 2e-5,
            scx: 1.001,
            ..Default::default()
        };
        Camera::new(
            "cam1",
            exterior,
            Interior {
                xh: 0.05,
                yh: -0.03,
                cc: 40.0,
            },
            added,
            SensorFormat::new(1280, 1024, 0.012, 0.012),
            stack,
        )
        .unwrap()
    }

    #[test]
    fn project_then_back_project() {
        let cam = camera(tank());
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-30.0, 25.0, 40.0),
            Point3::new(45.0, -20.0, -60.0),
        ] {
            let px = cam.project(&p).unwrap();
            let ray = cam.back_project(&px).unwrap();
            assert!(ray.distance_to(&p) < 1e-6);
            let at_depth = ray.point_at_world_z(p.z).unwrap();
            assert_relative_eq!(at_depth, p, epsilon = 1e-6);
        }
    }

    #[test]
    fn flat_path_differs_only_with_refraction() {
        let p = Point3::new(30.0, 10.0, -20.0);

        let air = camera(InterfaceStack::default());
        let a = air.project(&p).unwrap();
        let b = air.project_flat(&p).unwrap();
        assert_relative_eq!(a.coords, b.coords, epsilon = 1e-9);

        let water = camera(tank());
        let c = water.project(&p).unwrap();
        let d = water.project_flat(&p).unwrap();
        assert!(c.distance(&d) > 1.0);
    }

    #[test]
    fn unusable_points() {
        let cam = camera(tank());
        // above the water surface
        assert!(cam.project(&Point3::new(0.0, 0.0, 200.0)).is_none());

        let air = camera(InterfaceStack::default());
        // behind the camera
        assert!(air.project(&Point3::new(-120.0, 40.0, 900.0)).is_none());
        assert!(air.project_flat(&Point3::new(-120.0, 40.0, 900.0)).is_none());
    }

    #[test]
    fn pixel_sensor_round_trip() {
        let cam = camera(tank());
        let px = DistortedPixel::new(321.5, 777.25);
        let back = cam.sensor_to_pixel(&cam.pixel_to_sensor(&px));
        assert_relative_eq!(back.coords, px.coords, epsilon = 1e-9);
    }

    #[test]
    fn camera_in_water_is_rejected() {
        let exterior = Exterior::new(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0);
        let err = Camera::new(
            "wet",
            exterior,
            Interior {
                xh: 0.0,
                yh: 0.0,
                cc: 40.0,
            },
            AddedParameters::default(),
            SensorFormat::new(100, 100, 0.01, 0.01),
            tank(),
        )
        .unwrap_err();
        assert_eq!(err, PtvMvgError::CameraInsideInterfaceStack);
    }
}
