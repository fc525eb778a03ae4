use nalgebra::Point3;
use refraction::{InterfaceStack, RefractiveInterface};
use serde::{Deserialize, Serialize};

use crate::{AddedParameters, Camera, Exterior, Interior, PtvMvgError, SensorFormat};

fn default_medium_index() -> f64 {
    1.0
}

/// Serializable form of a [`Camera`].
///
/// Angles are `[omega, phi, kappa]` in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationData {
    pub name: String,
    pub position: [f64; 3],
    pub angles: [f64; 3],
    pub interior: Interior,
    #[serde(default)]
    pub added: AddedParameters,
    pub sensor: SensorFormat,
    #[serde(default = "default_medium_index")]
    pub camera_medium_index: f64,
    #[serde(default)]
    pub interfaces: Vec<RefractiveInterface>,
}

impl TryFrom<&CalibrationData> for Camera {
    type Error = PtvMvgError;

    fn try_from(data: &CalibrationData) -> Result<Self, Self::Error> {
        let [x0, y0, z0] = data.position;
        let [omega, phi, kappa] = data.angles;
        let interfaces = InterfaceStack::new(data.camera_medium_index, data.interfaces.clone())?;
        Camera::new(
            data.name.clone(),
            Exterior::new(Point3::new(x0, y0, z0), omega, phi, kappa),
            data.interior.clone(),
            data.added.clone(),
            data.sensor.clone(),
            interfaces,
        )
    }
}

impl From<&Camera> for CalibrationData {
    fn from(cam: &Camera) -> Self {
        let p = cam.exterior().position();
        let (omega, phi, kappa) = cam.exterior().angles();
        Self {
            name: cam.name().to_string(),
            position: [p.x, p.y, p.z],
            angles: [omega, phi, kappa],
            interior: cam.interior().clone(),
            added: cam.added().clone(),
            sensor: cam.sensor().clone(),
            camera_medium_index: cam.interfaces().camera_medium_index(),
            interfaces: cam.interfaces().interfaces().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InterlaceField;

    const CAM_TOML: &str = r#"
        name = "cam1"
        position = [-150.0, 0.0, 600.0]
        angles = [0.0, -0.245, 0.0]
        camera_medium_index = 1.0

        [interior]
        xh = 0.01
        yh = -0.02
        cc = 45.0

        [added]
        k1 = 1e-4

        [sensor]
        width = 1280
        height = 1024
        pixel_size_x = 0.012
        pixel_size_y = 0.012
        field = "odd"

        [[interfaces]]
        normal = [0.0, 0.0, -1.0]
        distance = -100.0
        refractive_index = 1.49
        thickness = 5.0

        [[interfaces]]
        normal = [0.0, 0.0, -1.0]
        distance = -95.0
        refractive_index = 1.33
    "#;

    #[test]
    fn parse_and_build() {
        let data: CalibrationData = toml::from_str(CAM_TOML).unwrap();
        assert_eq!(data.added.scx, 1.0);
        assert_eq!(data.sensor.field, InterlaceField::Odd);

        let cam = Camera::try_from(&data).unwrap();
        assert_eq!(cam.interfaces().interfaces().len(), 2);
        assert_eq!(cam.interfaces().object_medium_index(), 1.33);

        let back = CalibrationData::from(&cam);
        assert_eq!(back, data);
    }

    #[test]
    fn unknown_fields_rejected() {
        let bad = CAM_TOML.replace("cc = 45.0", "cc = 45.0\nfocal = 3.0");
        assert!(toml::from_str::<CalibrationData>(&bad).is_err());
    }

    #[test]
    fn inconsistent_stack_rejected() {
        let mut data: CalibrationData = toml::from_str(CAM_TOML).unwrap();
        data.interfaces[0].thickness = Some(7.0);
        assert!(matches!(
            Camera::try_from(&data),
            Err(PtvMvgError::InvalidInterfaceStack { .. })
        ));
    }
}
