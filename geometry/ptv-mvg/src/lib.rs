//! Camera geometry for particle tracking velocimetry.
//!
//! This crate models the cameras of a PTV rig: each [`Camera`] has an
//! exterior orientation (position and rotation), an interior orientation
//! (principal point and principal distance), lens distortion with affine
//! scale and shear, a sensor format and a stack of planar refractive
//! interfaces (for example the glass wall of a water tank).
//!
//! ## Core Types
//!
//! - [`Camera`]: a single calibrated camera with projection
//!   ([`Camera::project`]) and back-projection ([`Camera::back_project`])
//! - [`MultiCameraSystem`]: the cameras of a rig with triangulation and
//!   epipolar curves
//! - [`DistortedPixel`], [`SensorPoint`]: image and sensor coordinates
//! - [`Ray`]: a ray in the object medium
//!
//! ## Coordinate Systems
//!
//! - **World frame**: millimetres.
//! - **Camera frame**: `dmᵀ (p - p0)`; the camera looks along its -Z axis.
//! - **Sensor coordinates**: millimetres on the sensor, relative to the
//!   principal point, with distortion removed.
//! - **Pixel coordinates**: origin at the top-left pixel, y down, distorted.
//!
//! Geometry that cannot be evaluated (a point behind the camera, outside the
//! object medium, a totally reflected ray) is reported as `None` rather than
//! an error.
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::{Point3, Vector3};
//! use ptv_mvg::{
//!     AddedParameters, Camera, Exterior, InterfaceStack, Interior, MultiCameraSystem,
//!     SensorFormat,
//! };
//!
//! let tank = InterfaceStack::slabs(Vector3::new(0.0, 0.0, -1.0), -100.0, 1.0, &[(1.49, 5.0)], 1.33)
//!     .unwrap();
//! let mut cams = Vec::new();
//! for x0 in [-150.0f64, 150.0] {
//!     let exterior = Exterior::new(Point3::new(x0, 0.0, 600.0), 0.0, (x0 / 600.0).atan(), 0.0);
//!     let camera = Camera::new(
//!         format!("cam{x0}"),
//!         exterior,
//!         Interior { xh: 0.0, yh: 0.0, cc: 50.0 },
//!         AddedParameters::default(),
//!         SensorFormat::new(1280, 1024, 0.012, 0.012),
//!         tank.clone(),
//!     )
//!     .unwrap();
//!     cams.push(camera);
//! }
//! let system = MultiCameraSystem::new(cams);
//!
//! let original = Point3::new(12.0, -7.0, 20.0);
//! let observations: Vec<_> = system
//!     .cams()
//!     .iter()
//!     .enumerate()
//!     .map(|(i, cam)| (i, cam.project(&original).unwrap()))
//!     .collect();
//!
//! let found = system.find3d(&observations).unwrap().unwrap();
//! assert!((found.point - original).norm() < 1e-6);
//! assert!(found.mean_reproj_dist < 1e-6);
//! ```
#![deny(rust_2018_idioms)]

use nalgebra::Point2;
use thiserror::Error;

mod calibration_data;
mod camera;
mod exterior;
mod intrinsics;
mod multi_cam_system;
mod ray;

pub use calibration_data::CalibrationData;
pub use camera::Camera;
pub use exterior::Exterior;
pub use intrinsics::{AddedParameters, InterlaceField, Interior, SensorFormat, UNDISTORT_ITERATIONS};
pub use multi_cam_system::{MultiCameraSystem, PointWithReprojError, polyline_distance};
pub use ray::{Ray, RayIntersection, intersect_rays};

pub use refraction::{InterfaceStack, RefractionError, RefractiveInterface};

#[derive(Error, Debug, PartialEq)]
pub enum PtvMvgError {
    #[error("not enough points")]
    NotEnoughPoints,
    #[error("unknown camera index {0}")]
    UnknownCamera(usize),
    #[error("invalid rotation matrix")]
    InvalidRotationMatrix,
    #[error("invalid calibration: {0}")]
    InvalidCalibration(&'static str),
    #[error("camera center is not on the camera side of the interface stack")]
    CameraInsideInterfaceStack,
    #[error("invalid interface stack: {source}")]
    InvalidInterfaceStack {
        #[from]
        source: RefractionError,
    },
}

pub type Result<M> = std::result::Result<M, PtvMvgError>;

/// A location in the image, in pixels, including lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortedPixel {
    pub coords: Point2<f64>,
}

impl DistortedPixel {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            coords: Point2::new(x, y),
        }
    }

    pub fn distance(&self, other: &DistortedPixel) -> f64 {
        nalgebra::distance(&self.coords, &other.coords)
    }
}

/// A location on the sensor in millimetres, relative to the principal point
/// and with distortion removed.
///
/// This is the image of an ideal pinhole camera with the camera's principal
/// distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPoint {
    pub coords: Point2<f64>,
}

impl SensorPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            coords: Point2::new(x, y),
        }
    }

    pub fn distance(&self, other: &SensorPoint) -> f64 {
        nalgebra::distance(&self.coords, &other.coords)
    }
}
