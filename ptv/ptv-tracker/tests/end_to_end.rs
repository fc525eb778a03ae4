use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use test_log::test;

use correspondence::CorrespondenceEngine;
use ptv_mvg::{
    AddedParameters, Camera, Exterior, InterfaceStack, Interior, MultiCameraSystem, SensorFormat,
};
use ptv_tracker::{
    LinkDirection, LinkSource, TrajectoryState, link_bidirectional, link_sequence,
};
use ptv_types::{
    FrameCorrespondences, FrameNumber, FrameTargets, SearchVolume, Target, TrackingParams,
    TrackingParamsInner, VolumeParams,
};

const N_FRAMES: u64 = 6;

struct Particle {
    start: Point3<f64>,
    velocity: Vector3<f64>,
    last_frame: u64,
}

impl Particle {
    fn at(&self, frame: u64) -> Option<Point3<f64>> {
        if frame > self.last_frame {
            None
        } else {
            Some(self.start + self.velocity * frame as f64)
        }
    }
}

fn particles() -> Vec<Particle> {
    vec![
        Particle {
            start: Point3::new(-30.0, -20.0, -10.0),
            velocity: Vector3::new(0.8, -0.4, 0.5),
            last_frame: N_FRAMES - 1,
        },
        Particle {
            start: Point3::new(25.0, 30.0, 15.0),
            velocity: Vector3::new(-0.6, 0.3, -0.2),
            last_frame: 2,
        },
        Particle {
            start: Point3::new(5.0, -40.0, 30.0),
            velocity: Vector3::zeros(),
            last_frame: N_FRAMES - 1,
        },
    ]
}

fn rig() -> MultiCameraSystem {
    let tank = InterfaceStack::slabs(
        Vector3::new(0.0, 0.0, -1.0),
        -100.0,
        1.0,
        &[(1.49, 5.0)],
        1.33,
    )
    .unwrap();
    let cams = [(-150.0, 0.0), (150.0, 0.0), (0.0, 150.0)]
        .into_iter()
        .enumerate()
        .map(|(i, (x0, y0)): (usize, (f64, f64))| {
            let z0 = 600.0;
            Camera::new(
                format!("cam{i}"),
                Exterior::new(
                    Point3::new(x0, y0, z0),
                    -(y0 / z0).atan(),
                    (x0 / z0).atan(),
                    0.0,
                ),
                Interior {
                    xh: 0.0,
                    yh: 0.0,
                    cc: 45.0,
                },
                AddedParameters::default(),
                SensorFormat::new(1280, 1024, 0.012, 0.012),
                tank.clone(),
            )
            .unwrap()
        })
        .collect();
    MultiCameraSystem::new(cams)
}

fn correspondences() -> Vec<FrameCorrespondences> {
    let system = rig();
    let particles = particles();
    let frames: Vec<FrameTargets> = (0..N_FRAMES)
        .map(|k| FrameTargets {
            frame: FrameNumber(k),
            per_camera: system
                .cams()
                .iter()
                .map(|cam| {
                    particles
                        .iter()
                        .filter_map(|p| p.at(k))
                        .map(|p| {
                            let px = cam.project(&p).unwrap();
                            Target {
                                x: px.coords.x,
                                y: px.coords.y,
                                num_pixels: 10,
                                bbox_width: 3,
                                bbox_height: 4,
                                sum_gray: 900.0,
                            }
                        })
                        .collect()
                })
                .collect(),
        })
        .collect();

    let volume = SearchVolume::try_from(VolumeParams {
        x_lay: [-100.0, 100.0],
        z_min_lay: [-60.0, -60.0],
        z_max_lay: [60.0, 60.0],
        epipolar_band: 0.02,
        reprojection_tolerance_px: 1.0,
        min_cameras: 3,
        epipolar_samples: 30,
        min_pixel_count_ratio: 0.5,
        min_bbox_x_ratio: 0.0,
        min_bbox_y_ratio: 0.0,
        min_gray_ratio: 0.5,
        min_correlation: 0.0,
    })
    .unwrap();
    let engine = CorrespondenceEngine::new(system, volume).unwrap();
    engine.process_sequence(&frames).unwrap()
}

fn tracking_params() -> Arc<TrackingParamsInner> {
    let params = TrackingParams {
        velocity_min: [-2.0; 3],
        velocity_max: [2.0; 3],
        max_turning_angle_deg: 60.0,
        max_acceleration: 0.5,
        add_new_particles: true,
        min_sum_gray: 1000.0,
        min_cameras: 3,
        min_track_length: 3,
    };
    Arc::new(params.try_into().unwrap())
}

#[test]
fn targets_to_trajectories() {
    let frames = correspondences();
    for (k, f) in frames.iter().enumerate() {
        let expected = if k <= 2 { 3 } else { 2 };
        assert_eq!(f.candidates.len(), expected, "frame {k}");
    }

    let result = link_sequence(tracking_params(), &frames, LinkDirection::Forward).unwrap();
    assert_eq!(result.trajectories.len(), 3);
    assert!(result.unlinked.is_empty());

    let particles = particles();
    for p in particles.iter() {
        let t = result
            .trajectories
            .iter()
            .find(|t| nalgebra::distance(&t.steps()[0].position, &p.start) < 1e-3)
            .unwrap();
        for (k, step) in t.steps().iter().enumerate() {
            let truth = p.at(k as u64).unwrap();
            assert!(nalgebra::distance(&step.position, &truth) < 1e-3);
        }
        if p.last_frame == 2 {
            assert_eq!(t.len(), 3);
            assert_eq!(t.state(), TrajectoryState::Terminated);
            assert_eq!(t.terminated_at(), Some(FrameNumber(3)));
        } else {
            assert_eq!(t.len(), N_FRAMES as usize);
            assert_eq!(t.state(), TrajectoryState::Active);
        }
    }
}

#[test]
fn both_directions_agree_on_clean_data() {
    let frames = correspondences();
    let forward = link_sequence(tracking_params(), &frames, LinkDirection::Forward).unwrap();
    let merged = link_bidirectional(tracking_params(), &frames).unwrap();

    assert_eq!(merged.trajectories.len(), forward.trajectories.len());
    for t in merged.trajectories.iter() {
        assert!(
            t.steps()[1..]
                .iter()
                .all(|s| s.link == Some(LinkSource::Both))
        );
        let twin = forward
            .trajectories
            .iter()
            .find(|f| f.steps()[0].candidate == t.steps()[0].candidate)
            .unwrap();
        let a: Vec<_> = t.candidates().collect();
        let b: Vec<_> = twin.candidates().collect();
        assert_eq!(a, b);
        assert_eq!(t.state(), twin.state());
    }
}
