use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{DistortedPixel, PtvMvgError, Result};

/// Number of fixed-point iterations used to remove lens distortion.
pub const UNDISTORT_ITERATIONS: usize = 10;

/// Principal point `(xh, yh)` and principal distance `cc`, in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interior {
    pub xh: f64,
    pub yh: f64,
    pub cc: f64,
}

impl Interior {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.xh.is_finite() && self.yh.is_finite()) {
            return Err(PtvMvgError::InvalidCalibration("principal point must be finite"));
        }
        if !self.cc.is_finite() || self.cc == 0.0 {
            return Err(PtvMvgError::InvalidCalibration(
                "principal distance must be finite and non-zero",
            ));
        }
        Ok(())
    }
}

/// Lens distortion and affine sensor parameters.
///
/// `k1..k3` are radial terms, `p1, p2` decentering terms, `scx` scales x
/// relative to y and `she` is the shear angle in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddedParameters {
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub k3: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
    #[serde(default = "default_scx")]
    pub scx: f64,
    #[serde(default)]
    pub she: f64,
}

fn default_scx() -> f64 {
    1.0
}

impl Default for AddedParameters {
    fn default() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            scx: default_scx(),
            she: 0.0,
        }
    }
}

impl AddedParameters {
    pub(crate) fn validate(&self) -> Result<()> {
        let all = [self.k1, self.k2, self.k3, self.p1, self.p2, self.scx, self.she];
        if !all.iter().all(|v| v.is_finite()) {
            return Err(PtvMvgError::InvalidCalibration("distortion terms must be finite"));
        }
        if self.scx == 0.0 {
            return Err(PtvMvgError::InvalidCalibration("affine scale must be non-zero"));
        }
        if self.she.cos().abs() < 1e-9 {
            return Err(PtvMvgError::InvalidCalibration("shear must not be ±π/2"));
        }
        Ok(())
    }

    /// Radial and decentering displacement at `(x, y)`.
    fn displacement(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        (
            x * radial + self.p1 * (r2 + 2.0 * x * x) + 2.0 * self.p2 * x * y,
            y * radial + self.p2 * (r2 + 2.0 * y * y) + 2.0 * self.p1 * x * y,
        )
    }

    /// Apply distortion followed by the affine scale and shear.
    pub fn distort(&self, p: &Point2<f64>) -> Point2<f64> {
        let (dx, dy) = self.displacement(p.x, p.y);
        let (x1, y1) = (p.x + dx, p.y + dy);
        let (sin_she, cos_she) = self.she.sin_cos();
        Point2::new(self.scx * x1 - sin_she * y1, cos_she * y1)
    }

    /// Invert [`AddedParameters::distort`].
    ///
    /// The affine part is removed exactly. The distortion displacement is
    /// then evaluated at the current corrected estimate and subtracted from
    /// the measured location, [`UNDISTORT_ITERATIONS`] times.
    pub fn correct(&self, p: &Point2<f64>) -> Point2<f64> {
        let (sin_she, cos_she) = self.she.sin_cos();
        let yd = p.y / cos_she;
        let xd = (p.x + sin_she * yd) / self.scx;

        let (mut x, mut y) = (xd, yd);
        for _ in 0..UNDISTORT_ITERATIONS {
            let (dx, dy) = self.displacement(x, y);
            x = xd - dx;
            y = yd - dy;
        }
        Point2::new(x, y)
    }
}

/// Which lines of an interlaced sensor are read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterlaceField {
    /// Full frame.
    #[default]
    Frame,
    Odd,
    Even,
}

impl InterlaceField {
    fn is_field(&self) -> bool {
        !matches!(self, InterlaceField::Frame)
    }
}

/// Image size in pixels and pixel pitch in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    #[serde(default)]
    pub field: InterlaceField,
}

impl SensorFormat {
    pub fn new(width: u32, height: u32, pixel_size_x: f64, pixel_size_y: f64) -> Self {
        Self {
            width,
            height,
            pixel_size_x,
            pixel_size_y,
            field: InterlaceField::Frame,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PtvMvgError::InvalidCalibration("image size must be non-zero"));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.pixel_size_x) && positive(self.pixel_size_y)) {
            return Err(PtvMvgError::InvalidCalibration("pixel size must be positive"));
        }
        Ok(())
    }

    /// Image height and vertical pitch as read out, halved and doubled for
    /// a single interlaced field.
    fn vertical(&self) -> (f64, f64) {
        if self.field.is_field() {
            (f64::from(self.height) / 2.0, 2.0 * self.pixel_size_y)
        } else {
            (f64::from(self.height), self.pixel_size_y)
        }
    }

    /// Sensor millimetres (origin at the image centre, y up) to pixels.
    pub fn metric_to_pixel(&self, p: &Point2<f64>) -> DistortedPixel {
        let (height, pix_y) = self.vertical();
        DistortedPixel::new(
            p.x / self.pixel_size_x + f64::from(self.width) / 2.0,
            height / 2.0 - p.y / pix_y,
        )
    }

    pub fn pixel_to_metric(&self, px: &DistortedPixel) -> Point2<f64> {
        let (height, pix_y) = self.vertical();
        Point2::new(
            (px.coords.x - f64::from(self.width) / 2.0) * self.pixel_size_x,
            (height / 2.0 - px.coords.y) * pix_y,
        )
    }

    /// True if `px` lies on the image.
    pub fn contains(&self, px: &DistortedPixel) -> bool {
        let (height, _) = self.vertical();
        px.coords.x >= 0.0
            && px.coords.y >= 0.0
            && px.coords.x <= f64::from(self.width)
            && px.coords.y <= height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lens() -> AddedParameters {
        AddedParameters {
            k1: 2e-4,
            k2: -3e-7,
            k3: 0.0,
            p1: 1e-5,
            p2: -2e-5,
            scx: 1.002,
            she: 1e-3,
        }
    }

    #[test]
    fn default_is_identity() {
        let added = AddedParameters::default();
        let p = Point2::new(3.2, -1.5);
        assert_eq!(added.distort(&p), p);
        assert_eq!(added.correct(&p), p);
    }

    #[test]
    fn correct_undoes_distort() {
        let added = lens();
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 2.0),
            Point2::new(-7.0, 5.5),
            Point2::new(6.1, -6.1),
        ] {
            let back = added.correct(&added.distort(&p));
            assert_relative_eq!(back, p, epsilon = 1e-9);
        }
    }

    #[test]
    fn distortion_moves_points() {
        let p = Point2::new(5.0, 4.0);
        let d = lens().distort(&p);
        assert!((d - p).norm() > 1e-3);
    }

    #[test]
    fn pixel_metric_round_trip() {
        let sensor = SensorFormat::new(1280, 1024, 0.012, 0.01);
        let centre = sensor.metric_to_pixel(&Point2::origin());
        assert_relative_eq!(centre.coords, Point2::new(640.0, 512.0));

        // y up in metric, y down in pixels
        let up = sensor.metric_to_pixel(&Point2::new(0.0, 1.0));
        assert_relative_eq!(up.coords.y, 412.0, epsilon = 1e-9);

        let px = DistortedPixel::new(100.25, 900.5);
        let back = sensor.metric_to_pixel(&sensor.pixel_to_metric(&px));
        assert_relative_eq!(back.coords, px.coords, epsilon = 1e-9);
    }

    #[test]
    fn interlaced_field_halves_rows() {
        let mut sensor = SensorFormat::new(1280, 1024, 0.012, 0.01);
        sensor.field = InterlaceField::Odd;
        let centre = sensor.metric_to_pixel(&Point2::origin());
        assert_relative_eq!(centre.coords, Point2::new(640.0, 256.0));
        let up = sensor.metric_to_pixel(&Point2::new(0.0, 1.0));
        assert_relative_eq!(up.coords.y, 206.0, epsilon = 1e-9);
        assert!(sensor.contains(&DistortedPixel::new(10.0, 500.0)));
        assert!(!sensor.contains(&DistortedPixel::new(10.0, 600.0)));
    }

    #[test]
    fn validation() {
        assert!(Interior { xh: 0.0, yh: 0.0, cc: 0.0 }.validate().is_err());
        assert!(Interior { xh: 0.0, yh: 0.0, cc: 25.0 }.validate().is_ok());
        let mut added = AddedParameters::default();
        added.scx = 0.0;
        assert!(added.validate().is_err());
        assert!(SensorFormat::new(0, 10, 0.01, 0.01).validate().is_err());
        assert!(SensorFormat::new(10, 10, -0.01, 0.01).validate().is_err());
    }
}
