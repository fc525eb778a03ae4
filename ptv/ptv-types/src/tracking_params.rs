use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    MyFloat, PtvTypesError, Result, check_finite, check_min_max, check_range, check_positive,
};

/// Tracking parameters
///
/// This is the implementation for (de)serialization. See
/// [`TrackingParamsInner`] for the validated values used by the linker.
/// Velocities are in world units per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingParams {
    /// lower bound of the displacement from the predicted position, per axis
    pub velocity_min: [f64; 3],
    /// upper bound of the displacement from the predicted position, per axis
    pub velocity_max: [f64; 3],
    /// maximum angle between consecutive motion vectors, in degrees
    #[serde(default = "default_max_turning_angle_deg")]
    pub max_turning_angle_deg: f64,
    /// maximum change of the motion vector between frames
    pub max_acceleration: f64,
    /// start new trajectories from unlinked candidates after the first frame
    #[serde(default = "default_add_new_particles")]
    pub add_new_particles: bool,
    /// candidates with a lower summed gray value are not linked
    #[serde(default)]
    pub min_sum_gray: f64,
    /// candidates seen by fewer cameras are not linked, at least 2
    #[serde(default = "default_min_cameras")]
    pub min_cameras: u8,
    /// number of steps before a tentative trajectory becomes active
    #[serde(default = "default_min_track_length")]
    pub min_track_length: usize,
}

fn default_max_turning_angle_deg() -> f64 {
    120.0
}

fn default_add_new_particles() -> bool {
    true
}

fn default_min_cameras() -> u8 {
    2
}

fn default_min_track_length() -> usize {
    // Long enough to suppress single-frame ghosts, short enough that real
    // particles entering the volume are picked up quickly.
    3
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            velocity_min: [-2.0; 3],
            velocity_max: [2.0; 3],
            max_turning_angle_deg: default_max_turning_angle_deg(),
            max_acceleration: 0.5,
            add_new_particles: default_add_new_particles(),
            min_sum_gray: 0.0,
            min_cameras: default_min_cameras(),
            min_track_length: default_min_track_length(),
        }
    }
}

/// Tracking parameters actually used for tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingParamsInner {
    pub velocity_min: Vector3<MyFloat>,
    pub velocity_max: Vector3<MyFloat>,
    /// radians
    pub max_turning_angle: MyFloat,
    pub max_acceleration: MyFloat,
    pub add_new_particles: bool,
    pub min_sum_gray: MyFloat,
    pub min_cameras: u8,
    pub min_track_length: usize,
}

impl TrackingParamsInner {
    /// Half the diagonal of the velocity box, used to normalize distances.
    pub fn velocity_box_radius(&self) -> MyFloat {
        (self.velocity_max - self.velocity_min).norm() / 2.0
    }
}

impl From<TrackingParamsInner> for TrackingParams {
    fn from(inner: TrackingParamsInner) -> Self {
        TrackingParams {
            velocity_min: inner.velocity_min.into(),
            velocity_max: inner.velocity_max.into(),
            max_turning_angle_deg: inner.max_turning_angle.to_degrees(),
            max_acceleration: inner.max_acceleration,
            add_new_particles: inner.add_new_particles,
            min_sum_gray: inner.min_sum_gray,
            min_cameras: inner.min_cameras,
            min_track_length: inner.min_track_length,
        }
    }
}

impl TryFrom<TrackingParams> for TrackingParamsInner {
    type Error = PtvTypesError;

    fn try_from(orig: TrackingParams) -> Result<Self> {
        TryFrom::try_from(&orig)
    }
}

impl TryFrom<&TrackingParams> for TrackingParamsInner {
    type Error = PtvTypesError;

    fn try_from(orig: &TrackingParams) -> Result<Self> {
        const AXES: [&str; 3] = ["velocity x", "velocity y", "velocity z"];
        for (i, name) in AXES.into_iter().enumerate() {
            check_min_max(name, orig.velocity_min[i], orig.velocity_max[i])?;
        }
        check_range(
            "max_turning_angle_deg",
            orig.max_turning_angle_deg,
            0.0,
            180.0,
        )?;
        check_finite("max_acceleration", orig.max_acceleration)?;
        if orig.max_acceleration < 0.0 {
            return Err(PtvTypesError::OutOfRange {
                name: "max_acceleration",
                value: orig.max_acceleration,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        check_finite("min_sum_gray", orig.min_sum_gray)?;
        if orig.min_cameras < 2 {
            return Err(PtvTypesError::TooSmall {
                name: "min_cameras",
                value: orig.min_cameras.into(),
                min: 2,
            });
        }
        if orig.min_track_length < 1 {
            return Err(PtvTypesError::TooSmall {
                name: "min_track_length",
                value: orig.min_track_length,
                min: 1,
            });
        }
        let velocity_min = Vector3::from(orig.velocity_min);
        let velocity_max = Vector3::from(orig.velocity_max);
        check_positive(
            "velocity box size",
            (velocity_max - velocity_min).norm(),
        )?;

        Ok(Self {
            velocity_min,
            velocity_max,
            max_turning_angle: orig.max_turning_angle_deg.to_radians(),
            max_acceleration: orig.max_acceleration,
            add_new_particles: orig.add_new_particles,
            min_sum_gray: orig.min_sum_gray,
            min_cameras: orig.min_cameras,
            min_track_length: orig.min_track_length,
        })
    }
}

impl Default for TrackingParamsInner {
    fn default() -> Self {
        Self {
            velocity_min: Vector3::from_element(-2.0),
            velocity_max: Vector3::from_element(2.0),
            max_turning_angle: default_max_turning_angle_deg().to_radians(),
            max_acceleration: 0.5,
            add_new_particles: default_add_new_particles(),
            min_sum_gray: 0.0,
            min_cameras: default_min_cameras(),
            min_track_length: default_min_track_length(),
        }
    }
}
