use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::{
    MyFloat, PtvTypesError, Result, check_finite, check_min_max, check_positive, check_range,
};

/// Observation volume and correspondence criteria
///
/// The volume is bounded laterally by `x_lay` and in depth by two layers:
/// at `x = x_lay[0]` depths run from `z_min_lay[0]` to `z_max_lay[0]`, at
/// `x = x_lay[1]` from `z_min_lay[1]` to `z_max_lay[1]`, linearly
/// interpolated in between.
///
/// The ratio thresholds compare two targets as `min / max` of their values;
/// zero disables a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeParams {
    pub x_lay: [f64; 2],
    pub z_min_lay: [f64; 2],
    pub z_max_lay: [f64; 2],
    /// half-width of the epipolar band, in millimetres on the sensor
    pub epipolar_band: f64,
    /// maximum reprojection distance for a camera to join a candidate
    #[serde(default = "default_reprojection_tolerance_px")]
    pub reprojection_tolerance_px: f64,
    #[serde(default = "default_min_cameras")]
    pub min_cameras: u8,
    /// number of points used to approximate each epipolar curve
    #[serde(default = "default_epipolar_samples")]
    pub epipolar_samples: usize,
    #[serde(default)]
    pub min_pixel_count_ratio: f64,
    #[serde(default)]
    pub min_bbox_x_ratio: f64,
    #[serde(default)]
    pub min_bbox_y_ratio: f64,
    #[serde(default)]
    pub min_gray_ratio: f64,
    /// candidates of lower quality are rejected
    #[serde(default)]
    pub min_correlation: f64,
}

fn default_reprojection_tolerance_px() -> f64 {
    2.0
}

fn default_min_cameras() -> u8 {
    2
}

fn default_epipolar_samples() -> usize {
    10
}

/// Validated [`VolumeParams`] used by the correspondence search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchVolume {
    pub x_lay: [MyFloat; 2],
    pub z_min_lay: [MyFloat; 2],
    pub z_max_lay: [MyFloat; 2],
    pub epipolar_band: MyFloat,
    pub reprojection_tolerance_px: MyFloat,
    pub min_cameras: usize,
    pub epipolar_samples: usize,
    pub min_pixel_count_ratio: MyFloat,
    pub min_bbox_x_ratio: MyFloat,
    pub min_bbox_y_ratio: MyFloat,
    pub min_gray_ratio: MyFloat,
    pub min_correlation: MyFloat,
}

impl SearchVolume {
    /// Depth bounds at lateral position `x`, clamped to the layer range.
    pub fn depth_bounds_at(&self, x: MyFloat) -> (MyFloat, MyFloat) {
        let [x0, x1] = self.x_lay;
        let t = if x1 > x0 {
            ((x - x0) / (x1 - x0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let lerp = |v: [MyFloat; 2]| v[0] + (v[1] - v[0]) * t;
        (lerp(self.z_min_lay), lerp(self.z_max_lay))
    }

    /// The overall depth range over both layers.
    pub fn depth_range(&self) -> (MyFloat, MyFloat) {
        (
            self.z_min_lay[0].min(self.z_min_lay[1]),
            self.z_max_lay[0].max(self.z_max_lay[1]),
        )
    }

    pub fn contains(&self, p: &Point3<MyFloat>) -> bool {
        if p.x < self.x_lay[0] || p.x > self.x_lay[1] {
            return false;
        }
        let (zmin, zmax) = self.depth_bounds_at(p.x);
        p.z >= zmin && p.z <= zmax
    }
}

impl TryFrom<VolumeParams> for SearchVolume {
    type Error = PtvTypesError;

    fn try_from(orig: VolumeParams) -> Result<Self> {
        TryFrom::try_from(&orig)
    }
}

impl TryFrom<&VolumeParams> for SearchVolume {
    type Error = PtvTypesError;

    fn try_from(orig: &VolumeParams) -> Result<Self> {
        check_min_max("x_lay", orig.x_lay[0], orig.x_lay[1])?;
        check_min_max("depth layer 0", orig.z_min_lay[0], orig.z_max_lay[0])?;
        check_min_max("depth layer 1", orig.z_min_lay[1], orig.z_max_lay[1])?;
        check_positive("epipolar_band", orig.epipolar_band)?;
        check_positive("reprojection_tolerance_px", orig.reprojection_tolerance_px)?;
        if orig.min_cameras < 2 {
            return Err(PtvTypesError::TooSmall {
                name: "min_cameras",
                value: orig.min_cameras.into(),
                min: 2,
            });
        }
        if orig.epipolar_samples < 2 {
            return Err(PtvTypesError::TooSmall {
                name: "epipolar_samples",
                value: orig.epipolar_samples,
                min: 2,
            });
        }
        for (name, value) in [
            ("min_pixel_count_ratio", orig.min_pixel_count_ratio),
            ("min_bbox_x_ratio", orig.min_bbox_x_ratio),
            ("min_bbox_y_ratio", orig.min_bbox_y_ratio),
            ("min_gray_ratio", orig.min_gray_ratio),
        ] {
            check_range(name, value, 0.0, 1.0)?;
        }
        check_finite("min_correlation", orig.min_correlation)?;

        Ok(Self {
            x_lay: orig.x_lay,
            z_min_lay: orig.z_min_lay,
            z_max_lay: orig.z_max_lay,
            epipolar_band: orig.epipolar_band,
            reprojection_tolerance_px: orig.reprojection_tolerance_px,
            min_cameras: orig.min_cameras.into(),
            epipolar_samples: orig.epipolar_samples,
            min_pixel_count_ratio: orig.min_pixel_count_ratio,
            min_bbox_x_ratio: orig.min_bbox_x_ratio,
            min_bbox_y_ratio: orig.min_bbox_y_ratio,
            min_gray_ratio: orig.min_gray_ratio,
            min_correlation: orig.min_correlation,
        })
    }
}

impl From<&SearchVolume> for VolumeParams {
    fn from(v: &SearchVolume) -> Self {
        Self {
            x_lay: v.x_lay,
            z_min_lay: v.z_min_lay,
            z_max_lay: v.z_max_lay,
            epipolar_band: v.epipolar_band,
            reprojection_tolerance_px: v.reprojection_tolerance_px,
            min_cameras: u8::try_from(v.min_cameras).unwrap_or(u8::MAX),
            epipolar_samples: v.epipolar_samples,
            min_pixel_count_ratio: v.min_pixel_count_ratio,
            min_bbox_x_ratio: v.min_bbox_x_ratio,
            min_bbox_y_ratio: v.min_bbox_y_ratio,
            min_gray_ratio: v.min_gray_ratio,
            min_correlation: v.min_correlation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> VolumeParams {
        VolumeParams {
            x_lay: [-100.0, 100.0],
            z_min_lay: [-50.0, -30.0],
            z_max_lay: [50.0, 70.0],
            epipolar_band: 0.05,
            reprojection_tolerance_px: default_reprojection_tolerance_px(),
            min_cameras: default_min_cameras(),
            epipolar_samples: default_epipolar_samples(),
            min_pixel_count_ratio: 0.0,
            min_bbox_x_ratio: 0.0,
            min_bbox_y_ratio: 0.0,
            min_gray_ratio: 0.0,
            min_correlation: 0.0,
        }
    }

    #[test]
    fn depth_bounds_interpolate() {
        let v = SearchVolume::try_from(params()).unwrap();
        let (lo, hi) = v.depth_bounds_at(0.0);
        assert_relative_eq!(lo, -40.0);
        assert_relative_eq!(hi, 60.0);
        assert_eq!(v.depth_bounds_at(-500.0), (-50.0, 50.0));
        assert_eq!(v.depth_range(), (-50.0, 70.0));
    }

    #[test]
    fn contains() {
        let v = SearchVolume::try_from(params()).unwrap();
        assert!(v.contains(&Point3::new(0.0, 1e6, 0.0)));
        assert!(v.contains(&Point3::new(100.0, 0.0, 69.0)));
        assert!(!v.contains(&Point3::new(-100.0, 0.0, 69.0)));
        assert!(!v.contains(&Point3::new(101.0, 0.0, 0.0)));
        assert!(!v.contains(&Point3::new(0.0, 0.0, -45.0)));
    }

    #[test]
    fn rejects_contradictions() {
        let mut p = params();
        p.z_min_lay = [60.0, -30.0];
        assert_eq!(
            SearchVolume::try_from(&p),
            Err(PtvTypesError::MinExceedsMax {
                name: "depth layer 0",
                min: 60.0,
                max: 50.0
            })
        );

        let mut p = params();
        p.min_cameras = 1;
        assert!(matches!(
            SearchVolume::try_from(&p),
            Err(PtvTypesError::TooSmall { name: "min_cameras", .. })
        ));

        let mut p = params();
        p.epipolar_band = 0.0;
        assert!(matches!(
            SearchVolume::try_from(&p),
            Err(PtvTypesError::NotPositive { .. })
        ));

        let mut p = params();
        p.min_gray_ratio = 1.5;
        assert!(matches!(
            SearchVolume::try_from(&p),
            Err(PtvTypesError::OutOfRange { .. })
        ));
    }

    #[test]
    fn round_trips_through_params() {
        let v = SearchVolume::try_from(params()).unwrap();
        assert_eq!(VolumeParams::from(&v), params());
    }
}
