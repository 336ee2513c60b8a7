//! A simulated user walking in a circle around a spot on the floor, holding the
//! phone towards it. Drives the binaries together with
//! [`DummyArSession`](crate::dummy_session::DummyArSession).

use std::f32::consts::{FRAC_PI_3, TAU};
use std::time::Duration;

use nalgebra::{Isometry3, Point3, Vector3};
use rand::prelude::*;

use crate::ar_session::{HitResult, PlaneType, Trackable, TrackingState};
use crate::geometry::{perspective, Pose};
use crate::hosting::CameraFrame;

const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    center: Point3<f32>,
    radius: f32,
    /// Camera height above the centre.
    height: f32,
    /// Time for one full lap.
    period: Duration,
    start_angle: f32,
    aspect: f32,
    fovy: f32,
    /// Largest random offset added to the camera position, in meters.
    jitter: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            radius: 1.5,
            height: 1.4,
            period: Duration::from_secs(40),
            start_angle: 0.1,
            aspect: 9.0 / 16.0,
            fovy: FRAC_PI_3,
            jitter: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn new(center: Point3<f32>, radius: f32, height: f32, period: Duration) -> Self {
        Self {
            center,
            radius,
            height,
            period,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.abs();
        self
    }

    pub fn center(&self) -> Point3<f32> {
        self.center
    }

    /// Angle around the centre, in radians, after `elapsed`.
    pub fn angle_at(&self, elapsed: Duration) -> f32 {
        let laps = elapsed.as_secs_f32() / self.period.as_secs_f32().max(f32::EPSILON);
        (self.start_angle + laps * TAU) % TAU
    }

    /// Camera position after `elapsed`, before jitter.
    pub fn eye_at(&self, elapsed: Duration) -> Point3<f32> {
        let angle = self.angle_at(elapsed);
        self.center
            + Vector3::new(
                self.radius * angle.cos(),
                self.height,
                self.radius * angle.sin(),
            )
    }

    /// The tracked camera after `elapsed`, looking at the centre.
    pub fn frame_at<R: Rng>(&self, elapsed: Duration, rng: &mut R) -> CameraFrame {
        let mut eye = self.eye_at(elapsed);
        if self.jitter > 0.0 {
            eye += Vector3::from_fn(|_, _| rng.gen_range(-self.jitter..self.jitter));
        }
        let world_to_camera = Isometry3::look_at_rh(&eye, &self.center, &Vector3::y());
        CameraFrame {
            pose: world_to_camera.inverse(),
            view: world_to_camera.to_homogeneous(),
            projection: perspective(self.aspect, self.fovy, NEAR, FAR),
            tracking_state: TrackingState::Tracking,
        }
    }

    /// What a tap on the floor under the orbit centre hits.
    pub fn floor_hit(&self) -> HitResult {
        HitResult {
            hit_pose: Pose::translation(self.center.x, self.center.y, self.center.z),
            trackable: Trackable::Plane {
                plane_type: PlaneType::HorizontalUpwardFacing,
                pose_in_polygon: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_map_quality::is_anchor_in_view;

    #[test]
    fn laps_wrap_around() {
        let orbit = OrbitCamera::new(Point3::origin(), 1.0, 1.0, Duration::from_secs(4));
        let quarter = orbit.angle_at(Duration::from_secs(1));
        assert!((quarter - (0.1 + TAU / 4.0)).abs() < 1e-4);
        let again = orbit.angle_at(Duration::from_secs(5));
        assert!((again - quarter).abs() < 1e-3);
    }

    #[test]
    fn camera_keeps_the_centre_in_view() {
        let orbit = OrbitCamera::default().with_jitter(0.05);
        let mut rng = StdRng::seed_from_u64(3);
        for s in 0..40 {
            let frame = orbit.frame_at(Duration::from_secs(s), &mut rng);
            assert!(is_anchor_in_view(&orbit.center(), &frame.view, &frame.projection));
        }
    }

    #[test]
    fn pose_is_inverse_of_view() {
        let orbit = OrbitCamera::default();
        let mut rng = StdRng::seed_from_u64(0);
        let frame = orbit.frame_at(Duration::from_secs(7), &mut rng);
        let eye = orbit.eye_at(Duration::from_secs(7));
        assert!((frame.pose.translation.vector - eye.coords).norm() < 1e-4);
        // The camera looks down its -z axis, towards the centre.
        let forward = frame.pose.rotation * -Vector3::z();
        let to_center = (orbit.center() - eye).normalize();
        assert!((forward - to_center).norm() < 1e-4);
    }

    #[test]
    fn floor_hit_can_host() {
        let hit = OrbitCamera::default().floor_hit();
        assert!(hit.can_create_anchor());
        assert_eq!(hit.plane_type(), Some(PlaneType::HorizontalUpwardFacing));
    }
}
