//! Configuration file format for a PTV rig.
//!
//! A configuration is a TOML file with a `[tracking]` table, a `[volume]`
//! table, one `[[cameras]]` entry per camera and optional `[refinement]` and
//! `[refiner]` tables. [`PtvConfig::validate`] checks everything and builds
//! the runtime types before any frame is processed.
#![deny(rust_2018_idioms)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use orient_adj::{ParameterMask, RefineFlags, RefinerConfig};
use ptv_mvg::{CalibrationData, Camera, MultiCameraSystem, PtvMvgError};
use ptv_types::{
    PtvTypesError, SearchVolume, TrackingParams, TrackingParamsInner, VolumeParams,
};

/// The configuration error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid parameters: {source}")]
    InvalidParameters {
        #[from]
        source: PtvTypesError,
    },
    #[error("camera {name}: {source}")]
    InvalidCalibration { name: String, source: PtvMvgError },
    #[error("camera name {0} is used more than once")]
    DuplicateCameraName(String),
    #[error("{need} cameras required by the volume, {have} configured")]
    NotEnoughCameras { have: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PtvConfig {
    pub tracking: TrackingParams,
    pub volume: VolumeParams,
    pub cameras: Vec<CalibrationData>,
    /// Parameters freed when refining a camera's orientation.
    #[serde(default)]
    pub refinement: RefineFlags,
    #[serde(default)]
    pub refiner: RefinerConfig,
}

/// A checked configuration, ready for the engines.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub tracking: TrackingParamsInner,
    pub volume: SearchVolume,
    pub system: MultiCameraSystem,
    pub mask: ParameterMask,
    pub refiner: RefinerConfig,
}

impl PtvConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Check all parameters and build the runtime types.
    ///
    /// Cameras keep their order; camera `i` of the system is entry `i` of
    /// `cameras`.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        let tracking = TrackingParamsInner::try_from(&self.tracking)?;
        let volume = SearchVolume::try_from(&self.volume)?;

        let mut names = BTreeSet::new();
        let mut cams = Vec::with_capacity(self.cameras.len());
        for data in self.cameras.iter() {
            if !names.insert(data.name.as_str()) {
                return Err(Error::DuplicateCameraName(data.name.clone()));
            }
            let cam = Camera::try_from(data).map_err(|source| Error::InvalidCalibration {
                name: data.name.clone(),
                source,
            })?;
            cams.push(cam);
        }
        if cams.len() < volume.min_cameras {
            return Err(Error::NotEnoughCameras {
                have: cams.len(),
                need: volume.min_cameras,
            });
        }
        if usize::from(tracking.min_cameras) > cams.len() {
            warn!(
                "tracking requires {} cameras per candidate but only {} are configured, nothing will be linked",
                tracking.min_cameras,
                cams.len()
            );
        }

        let mask = ParameterMask::from(&self.refinement);
        if mask.count_free() == 0 {
            warn!("no parameter is enabled for refinement");
        }
        debug!(
            "validated configuration with {} cameras, {} free orientation parameters",
            cams.len(),
            mask.count_free()
        );

        Ok(ValidatedConfig {
            tracking,
            volume,
            system: MultiCameraSystem::new(cams),
            mask,
            refiner: self.refiner.clone(),
        })
    }
}

/// Parse a `.toml` file and return a [PtvConfig] structure.
pub fn parse_config_file<P: AsRef<std::path::Path>>(fname: P) -> Result<PtvConfig> {
    let contents = std::fs::read_to_string(fname.as_ref())?;
    PtvConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        cameras = []

        [tracking]
        velocity_min = [-1.0, -1.0, -1.0]
        velocity_max = [1.0, 1.0, 1.0]
        max_acceleration = 0.4

        [volume]
        x_lay = [-100.0, 100.0]
        z_min_lay = [-50.0, -60.0]
        z_max_lay = [50.0, 60.0]
        epipolar_band = 0.05
    "#;

    #[test]
    fn defaults_are_filled_in() {
        let cfg = PtvConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.refinement, RefineFlags::default());
        assert_eq!(cfg.refiner, RefinerConfig::default());
        assert!(cfg.tracking.add_new_particles);
        assert_eq!(cfg.volume.min_cameras, 2);
    }

    #[test]
    fn no_cameras_is_rejected() {
        let cfg = PtvConfig::from_toml_str(MINIMAL).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(Error::NotEnoughCameras { have: 0, need: 2 })
        ));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let bad = format!("{MINIMAL}\n[display]\nfps = 3\n");
        assert!(matches!(
            PtvConfig::from_toml_str(&bad),
            Err(Error::TomlDeError { .. })
        ));
    }

    #[test]
    fn contradictory_bounds_are_rejected() {
        let bad = MINIMAL.replace(
            "velocity_min = [-1.0, -1.0, -1.0]",
            "velocity_min = [-1.0, 2.0, -1.0]",
        );
        let cfg = PtvConfig::from_toml_str(&bad).unwrap();
        match cfg.validate() {
            Err(Error::InvalidParameters {
                source: PtvTypesError::MinExceedsMax { name, .. },
            }) => assert_eq!(name, "velocity y"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
