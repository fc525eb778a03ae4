use nalgebra::{Point3, Vector3};
use ptv_mvg::{
    AddedParameters, Camera, Exterior, InterfaceStack, Interior, MultiCameraSystem, SensorFormat,
};

fn stacks() -> Vec<(&'static str, InterfaceStack)> {
    let down = Vector3::new(0.0, 0.0, -1.0);
    vec![
        ("air", InterfaceStack::default()),
        (
            "glass and water",
            InterfaceStack::slabs(down, -100.0, 1.0, &[(1.49, 5.0)], 1.33).unwrap(),
        ),
        (
            "two windows",
            InterfaceStack::slabs(down, -120.0, 1.0, &[(1.52, 3.0), (1.0, 10.0), (1.49, 6.0)], 1.33)
                .unwrap(),
        ),
    ]
}

fn camera(name: &str, position: Point3<f64>, stack: InterfaceStack) -> Camera {
    let omega = -(position.y / position.z).atan();
    let phi = (position.x / position.z).atan();
    let added = AddedParameters {
        k1: 5e-5,
        k2: -1e-7,
        p2: 1e-5,
        she: 2e-4,
        ..Default::default()
    };
    Camera::new(
        name,
        Exterior::new(position, omega, phi, 0.02),
        Interior {
            xh: -0.02,
            yh: 0.04,
            cc: 50.0,
        },
        added,
        SensorFormat::new(2048, 2048, 0.0055, 0.0055),
        stack,
    )
    .unwrap()
}

fn grid() -> impl Iterator<Item = Point3<f64>> {
    let xs = [-40.0, 0.0, 40.0];
    let zs = [-60.0, 0.0, 60.0];
    xs.into_iter().flat_map(move |x| {
        xs.into_iter()
            .flat_map(move |y| zs.into_iter().map(move |z| Point3::new(x, y * 0.5, z)))
    })
}

#[test]
fn back_project_recovers_projected_points() {
    for (label, stack) in stacks() {
        let cam = camera("c", Point3::new(-180.0, 90.0, 650.0), stack);
        for p in grid() {
            let px = cam
                .project(&p)
                .unwrap_or_else(|| panic!("{label}: {p} unusable"));
            let ray = cam.back_project(&px).unwrap();
            let recovered = ray.point_at_world_z(p.z).unwrap();
            let err = (recovered - p).norm();
            assert!(err < 1e-6, "{label}: {p} recovered as {recovered}");
        }
    }
}

#[test]
fn triangulation_matches_every_stack() {
    for (label, stack) in stacks() {
        let system = MultiCameraSystem::new(vec![
            camera("a", Point3::new(-200.0, 0.0, 650.0), stack.clone()),
            camera("b", Point3::new(200.0, 0.0, 650.0), stack.clone()),
            camera("c", Point3::new(0.0, 200.0, 650.0), stack),
        ]);
        for p in grid() {
            let obs: Vec<_> = system
                .cams()
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.project(&p).unwrap()))
                .collect();
            let found = system.find3d(&obs).unwrap().unwrap();
            assert!(
                (found.point - p).norm() < 1e-6,
                "{label}: {p} found at {}",
                found.point
            );
            assert!(found.mean_reproj_dist < 1e-6);
        }
    }
}

#[test]
fn cam_by_name_lookup() {
    let system = MultiCameraSystem::new(vec![
        camera("a", Point3::new(-200.0, 0.0, 650.0), InterfaceStack::default()),
        camera("b", Point3::new(200.0, 0.0, 650.0), InterfaceStack::default()),
    ]);
    assert_eq!(system.cam_by_name("b").map(|(i, _)| i), Some(1));
    assert!(system.cam_by_name("z").is_none());
}
