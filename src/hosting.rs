//! The hosting flow: place an anchor on a plane, walk around it until the
//! quality ring fills up, then host it once.
//!
//! [`HostingSession`] is driven by two threads. The gesture thread calls
//! [`HostingSession::handle_tap`]; the render thread calls
//! [`HostingSession::on_frame`] after each session update. Status changes are
//! sent to the UI over a channel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nalgebra::{Matrix4, Point3};

use crate::ar_session::{
    Anchor, ArSession, CloudAnchorState, FeatureMapQuality, HitResult, PlaneType, TrackingState,
};
use crate::cloud_anchor_manager::CloudAnchorManager;
use crate::config::GhostConfig;
use crate::feature_map_quality::{is_anchor_in_view, BarRenderer, FeatureMapQualityUi};
use crate::geometry::Pose;
use crate::messages::UserMessage;

/// Everything the render loop knows about the camera this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub pose: Pose,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub tracking_state: TrackingState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingPhase {
    /// Waiting for the user to tap a plane.
    PlaceAnchor,
    /// Anchor placed, collecting viewpoints.
    Mapping,
    /// Hosting request sent.
    Processing,
    Succeeded(String),
    Failed(CloudAnchorState),
}

/// Where the camera stands relative to the comfortable mapping distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBand {
    TooClose,
    TooFar,
    Ready,
}

impl DistanceBand {
    fn message(self) -> UserMessage {
        match self {
            DistanceBand::TooClose => UserMessage::TooClose,
            DistanceBand::TooFar => UserMessage::TooFar,
            DistanceBand::Ready => UserMessage::HostingSave,
        }
    }
}

/// What happened during one [`HostingSession::on_frame`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Horizontal distance from the ring centre to the camera.
    pub distance: f64,
    pub band: DistanceBand,
    /// Set when the quality was estimated this frame.
    pub sampled: Option<FeatureMapQuality>,
    pub overall_quality: f32,
    /// Set on the single frame that started hosting.
    pub hosting_started: bool,
}

struct HostingState<A> {
    anchor: Option<A>,
    quality_ui: Option<FeatureMapQualityUi>,
    phase: HostingPhase,
    cloud_anchor_id: Option<String>,
    last_estimate: Option<Instant>,
    last_band: Option<DistanceBand>,
}

pub struct HostingSession<S>
where
    S: ArSession,
{
    config: GhostConfig,
    session: Arc<Mutex<S>>,
    manager: Arc<CloudAnchorManager<S>>,
    hosted: AtomicBool,
    state: Arc<Mutex<HostingState<S::Anchor>>>,
    messages: Sender<UserMessage>,
}

impl<S> HostingSession<S>
where
    S: ArSession + 'static,
{
    pub fn new(
        session: Arc<Mutex<S>>,
        manager: Arc<CloudAnchorManager<S>>,
        config: GhostConfig,
        messages: Sender<UserMessage>,
    ) -> Self {
        let _ = messages.send(UserMessage::PlaceAnchor);
        Self {
            config,
            session,
            manager,
            hosted: AtomicBool::new(false),
            state: Arc::new(Mutex::new(HostingState {
                anchor: None,
                quality_ui: None,
                phase: HostingPhase::PlaceAnchor,
                cloud_anchor_id: None,
                last_estimate: None,
                last_band: None,
            })),
            messages,
        }
    }

    /// Places the anchor on the first usable hit. Only one anchor is ever
    /// placed, and only while the camera is tracking. Returns the new anchor.
    pub fn handle_tap(&self, hits: &[HitResult], camera_tracking: TrackingState) -> Option<S::Anchor> {
        let mut state = lock(&self.state);
        if state.anchor.is_some() || camera_tracking != TrackingState::Tracking {
            return None;
        }
        let hit = hits.iter().find(|hit| hit.can_create_anchor())?;

        let anchor = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .create_anchor(hit.hit_pose);
        let ui_config = self.config.quality_ui;
        state.quality_ui = Some(match hit.plane_type() {
            Some(PlaneType::Vertical) => FeatureMapQualityUi::vertical(ui_config),
            _ => FeatureMapQualityUi::horizontal(ui_config),
        });
        state.anchor = Some(anchor.clone());
        state.phase = HostingPhase::Mapping;
        info!("Anchor placed on {:?}", hit.trackable);
        Some(anchor)
    }

    /// Runs the per-frame mapping step. Returns `None` when there is nothing
    /// to map: no anchor yet, the anchor is not tracking, or it was already
    /// sent for hosting.
    pub fn on_frame(&self, frame: &CameraFrame, now: Instant) -> Option<FrameReport> {
        if frame.tracking_state != TrackingState::Tracking || self.is_hosted() {
            return None;
        }
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let anchor = state.anchor.clone()?;
        if anchor.tracking_state() != TrackingState::Tracking {
            return None;
        }
        let quality_ui = state.quality_ui.as_mut()?;
        let anchor_pose = anchor.pose();

        let camera_ui = quality_ui.camera_in_ui_frame(&anchor_pose, &frame.pose);
        let distance = f64::from(camera_ui.x).hypot(f64::from(camera_ui.z));
        let band = if distance < self.config.min_distance {
            DistanceBand::TooClose
        } else if distance > self.config.max_distance {
            DistanceBand::TooFar
        } else {
            DistanceBand::Ready
        };
        if state.last_band != Some(band) {
            state.last_band = Some(band);
            self.notify(band.message());
        }

        let mut report = FrameReport {
            distance,
            band,
            sampled: None,
            overall_quality: quality_ui.compute_overall_quality(),
            hosting_started: false,
        };

        let interval = Duration::from_millis(self.config.estimate_interval_ms);
        let due = state
            .last_estimate
            .map_or(true, |last| now.saturating_duration_since(last) > interval);
        let anchor_position = Point3::from(anchor_pose.translation.vector);
        // Looking away from the anchor would credit the wrong bar.
        if !due || !is_anchor_in_view(&anchor_position, &frame.view, &frame.projection) {
            return Some(report);
        }
        state.last_estimate = Some(now);

        let quality = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .estimate_feature_map_quality_for_hosting(&frame.pose);
        quality_ui.update_quality_for_viewpoint(&camera_ui, quality);
        report.sampled = Some(quality);
        report.overall_quality = quality_ui.compute_overall_quality();
        debug!(
            "Estimated {quality:?}, overall mapping quality is now {:.3}",
            report.overall_quality
        );

        if report.overall_quality >= self.config.quality_threshold
            && !self.hosted.swap(true, Ordering::SeqCst)
        {
            info!("Mapping quality reached the threshold, hosting the anchor");
            state.phase = HostingPhase::Processing;
            let listener_state = self.state.clone();
            let listener_messages = self.messages.clone();
            self.manager.host_cloud_anchor(Some(&anchor), move |hosted| {
                on_host_complete(&listener_state, &listener_messages, hosted)
            });
            self.notify(UserMessage::HostingProcessing);
            report.hosting_started = true;
        }
        Some(report)
    }

    /// Draws the quality ring while the anchor is still being mapped.
    pub fn draw_ui<R: BarRenderer>(&self, renderer: &mut R) {
        if self.is_hosted() {
            return;
        }
        let state = lock(&self.state);
        if let (Some(anchor), Some(quality_ui)) = (&state.anchor, &state.quality_ui) {
            if anchor.tracking_state() == TrackingState::Tracking {
                quality_ui.draw_ui(&anchor.pose(), renderer);
            }
        }
    }

    /// True once hosting has been requested.
    pub fn is_hosted(&self) -> bool {
        self.hosted.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> HostingPhase {
        lock(&self.state).phase.clone()
    }

    pub fn anchor(&self) -> Option<S::Anchor> {
        lock(&self.state).anchor.clone()
    }

    pub fn cloud_anchor_id(&self) -> Option<String> {
        lock(&self.state).cloud_anchor_id.clone()
    }

    /// Overall quality of the ring, or 0 before an anchor is placed.
    pub fn overall_quality(&self) -> f32 {
        lock(&self.state)
            .quality_ui
            .as_ref()
            .map_or(0.0, FeatureMapQualityUi::compute_overall_quality)
    }

    /// Runs `f` on the quality ring, if an anchor has been placed.
    pub fn with_quality_ui<T>(&self, f: impl FnOnce(&FeatureMapQualityUi) -> T) -> Option<T> {
        lock(&self.state).quality_ui.as_ref().map(f)
    }

    /// Stops listening for the hosting result.
    pub fn shutdown(&self) {
        self.manager.clear_listeners();
    }

    fn notify(&self, message: UserMessage) {
        if self.messages.send(message).is_err() {
            debug!("Nobody is listening for status messages");
        }
    }
}

fn on_host_complete<A: Anchor>(
    state: &Mutex<HostingState<A>>,
    messages: &Sender<UserMessage>,
    anchor: A,
) {
    let cloud_state = anchor.cloud_anchor_state();
    let mut state = lock(state);
    let message = if cloud_state.is_error() {
        error!("Error hosting a cloud anchor, state {cloud_state}");
        state.phase = HostingPhase::Failed(cloud_state);
        UserMessage::HostingError(cloud_state)
    } else {
        if state.cloud_anchor_id.is_some() {
            warn!("Ignoring a second hosting result");
            return;
        }
        let Some(id) = anchor.cloud_anchor_id() else {
            error!("Hosting succeeded without a cloud anchor id");
            state.phase = HostingPhase::Failed(CloudAnchorState::ErrorInternal);
            let _ = messages.send(UserMessage::HostingError(CloudAnchorState::ErrorInternal));
            return;
        };
        info!("Anchor {id} created");
        state.cloud_anchor_id = Some(id.clone());
        state.anchor = Some(anchor);
        state.phase = HostingPhase::Succeeded(id.clone());
        UserMessage::HostingSuccess(id)
    };
    let _ = messages.send(message);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
