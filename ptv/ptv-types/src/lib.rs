//! Core type definitions shared by the PTV correspondence and tracking
//! crates.
//!
//! The parameter structs here are the (de)serialization format. Each has a
//! validated counterpart ([`TrackingParamsInner`], [`SearchVolume`]) built by
//! `TryFrom`, which is what the engines actually use. Contradictory or out of
//! range values are rejected at that point, before any frame is processed.
#![deny(rust_2018_idioms)]

mod cam_num;
mod candidate;
mod frame_number;
mod target;
mod tracking_params;
mod volume_params;

pub use cam_num::CamNum;
pub use candidate::{CandidatePoint, FrameCorrespondences};
pub use frame_number::FrameNumber;
pub use target::{FrameTargets, Target, TargetRef};
pub use tracking_params::{TrackingParams, TrackingParamsInner};
pub use volume_params::{SearchVolume, VolumeParams};

pub type MyFloat = f64;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PtvTypesError {
    #[error("{name}: minimum {min} exceeds maximum {max}")]
    MinExceedsMax {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        value: usize,
        min: usize,
    },
    #[error("{name} must be finite")]
    NotFinite { name: &'static str },
}

pub type Result<M> = std::result::Result<M, PtvTypesError>;

pub(crate) fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PtvTypesError::NotFinite { name })
    }
}

pub(crate) fn check_min_max(name: &'static str, min: f64, max: f64) -> Result<()> {
    check_finite(name, min)?;
    check_finite(name, max)?;
    if min > max {
        return Err(PtvTypesError::MinExceedsMax { name, min, max });
    }
    Ok(())
}

pub(crate) fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(PtvTypesError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(PtvTypesError::NotPositive { name, value });
    }
    Ok(())
}
