mod gui;

use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ghosts::ar_session::{Anchor, TrackingState};
use ghosts::cloud_anchor_manager::CloudAnchorManager;
use ghosts::config::GhostConfig;
use ghosts::dummy_session::DummyArSession;
use ghosts::hosting::HostingSession;
use ghosts::orbit::OrbitCamera;
use gui::{engage_gui, ChartRenderer, RingView};
use nalgebra::{Point3, Vector3};
use rand::prelude::*;

fn main() {
    env_logger::init();

    let config = GhostConfig::default();
    let session = Arc::new(Mutex::new(DummyArSession::builder().build()));
    let manager = Arc::new(CloudAnchorManager::new(session.clone(), config.ttl_days));
    let (tx, rx) = mpsc::channel();
    let radius = f64::from(config.quality_ui.radius);
    let hosting = HostingSession::new(session.clone(), manager.clone(), config, tx);

    let orbit = OrbitCamera::new(
        Point3::origin(),
        1.5,
        1.4,
        Duration::from_secs(20),
    )
    .with_jitter(0.02);
    let anchor = hosting.handle_tap(&[orbit.floor_hit()], TrackingState::Tracking);

    let mut rng = StdRng::from_entropy();
    let start = Instant::now();
    let mut status = String::new();

    let _ = engage_gui(
        Box::new(move || {
            session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update();
            manager.on_update();
            let camera = orbit.frame_at(start.elapsed(), &mut rng);
            hosting.on_frame(&camera, Instant::now());
            if let Some(message) = rx.try_iter().last() {
                status = message.to_string();
            }

            let center = anchor
                .as_ref()
                .map(|a| a.pose().translation.vector)
                .unwrap_or_else(Vector3::zeros);
            let mut renderer =
                ChartRenderer::new((f64::from(center.x), f64::from(center.z)), radius);
            hosting.draw_ui(&mut renderer);

            let to_camera = camera.pose.translation.vector - center;
            let len = f64::from(to_camera.x).hypot(f64::from(to_camera.z)).max(1e-6);
            RingView {
                bars: renderer.points,
                camera: (
                    1.5 * f64::from(to_camera.x) / len,
                    1.5 * f64::from(to_camera.z) / len,
                ),
                overall_quality: hosting.overall_quality(),
                status: status.clone(),
            }
        }),
        Duration::from_millis(100),
    );
}
