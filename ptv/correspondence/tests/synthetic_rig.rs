use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use test_log::test;

use correspondence::CorrespondenceEngine;
use ptv_mvg::{
    AddedParameters, Camera, Exterior, InterfaceStack, Interior, MultiCameraSystem, SensorFormat,
};
use ptv_types::{FrameNumber, FrameTargets, SearchVolume, Target, VolumeParams};

const PARTICLES: [[f64; 3]; 8] = [
    [-40.0, -30.0, -20.0],
    [35.0, -25.0, 10.0],
    [-10.0, 40.0, 30.0],
    [50.0, 45.0, -35.0],
    [0.0, 0.0, 0.0],
    [-55.0, 10.0, 45.0],
    [20.0, -50.0, -50.0],
    [60.0, -5.0, 25.0],
];

fn four_camera_rig() -> MultiCameraSystem {
    let tank = InterfaceStack::slabs(
        Vector3::new(0.0, 0.0, -1.0),
        -100.0,
        1.0,
        &[(1.49, 5.0)],
        1.33,
    )
    .unwrap();
    let added = AddedParameters {
        k1: 1e-5,
        p1: 2e-6,
        ..Default::default()
    };
    let cams = [(-150.0, 0.0), (150.0, 0.0), (0.0, 150.0), (0.0, -150.0)]
        .into_iter()
        .enumerate()
        .map(|(i, (x0, y0)): (usize, (f64, f64))| {
            let z0 = 600.0;
            Camera::new(
                format!("cam{}", i + 1),
                Exterior::new(
                    Point3::new(x0, y0, z0),
                    -(y0 / z0).atan(),
                    (x0 / z0).atan(),
                    0.01 * i as f64,
                ),
                Interior {
                    xh: 0.05,
                    yh: -0.03,
                    cc: 45.0,
                },
                added.clone(),
                SensorFormat::new(1280, 1024, 0.012, 0.012),
                tank.clone(),
            )
            .unwrap()
        })
        .collect();
    MultiCameraSystem::new(cams)
}

fn volume() -> SearchVolume {
    SearchVolume::try_from(VolumeParams {
        x_lay: [-100.0, 100.0],
        z_min_lay: [-70.0, -60.0],
        z_max_lay: [60.0, 70.0],
        epipolar_band: 0.02,
        reprojection_tolerance_px: 1.0,
        min_cameras: 3,
        epipolar_samples: 30,
        min_pixel_count_ratio: 0.3,
        min_bbox_x_ratio: 0.3,
        min_bbox_y_ratio: 0.3,
        min_gray_ratio: 0.3,
        min_correlation: 1.0,
    })
    .unwrap()
}

/// Particles drifting at constant velocity, targets listed in a
/// camera-dependent order like a real detector would.
fn frames(system: &MultiCameraSystem, n: u64) -> Vec<FrameTargets> {
    let velocity = Vector3::new(0.8, -0.4, 0.5);
    (0..n)
        .map(|frame| {
            let per_camera = system
                .cams()
                .iter()
                .enumerate()
                .map(|(cam_idx, cam)| {
                    let mut targets: Vec<Target> = PARTICLES
                        .iter()
                        .map(|p| {
                            let p = Point3::from(*p) + velocity * frame as f64;
                            let px = cam.project(&p).unwrap();
                            Target {
                                x: px.coords.x,
                                y: px.coords.y,
                                num_pixels: 12,
                                bbox_width: 4,
                                bbox_height: 3,
                                sum_gray: 1200.0,
                            }
                        })
                        .collect();
                    targets.rotate_left(cam_idx);
                    targets
                })
                .collect();
            FrameTargets {
                frame: FrameNumber(frame),
                per_camera,
            }
        })
        .collect()
}

#[test]
fn recovers_every_particle_in_every_frame() {
    let system = four_camera_rig();
    let input = frames(&system, 4);
    let engine = CorrespondenceEngine::new(system, volume()).unwrap();

    let results = engine.process_sequence(&input).unwrap();
    assert_eq!(results.len(), input.len());
    let velocity = Vector3::new(0.8, -0.4, 0.5);

    for (k, result) in results.iter().enumerate() {
        assert_eq!(result.frame, FrameNumber(k as u64));
        assert_eq!(result.candidates.len(), PARTICLES.len());
        assert!(result.unmatched.is_empty());
        for p in PARTICLES.iter() {
            let expected = Point3::from(*p) + velocity * k as f64;
            let found = result
                .candidates
                .iter()
                .find(|c| nalgebra::distance(&c.position, &expected) < 1e-3)
                .unwrap_or_else(|| panic!("frame {k}: {expected:?} not found"));
            assert_eq!(found.num_cameras(), 4);
            assert!(found.mean_reproj_dist < 1e-3);
            assert_relative_eq!(found.quality, 4.0, epsilon = 1e-2);
        }
    }
}

#[test]
fn repeated_runs_agree() {
    let system = four_camera_rig();
    let input = frames(&system, 2);
    let engine = CorrespondenceEngine::new(system, volume()).unwrap();
    let first = engine.process_sequence(&input).unwrap();
    let second = engine.process_sequence(&input).unwrap();
    assert_eq!(first, second);
}
