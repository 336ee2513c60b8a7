//! A simulated [`ArSession`] that stands in for the device AR subsystem.
//!
//! Anchors are shared handles whose state the session changes in
//! [`DummyArSession::update`], the way the real subsystem updates anchors
//! during its per-frame update. Hosting and resolving requests finish after a
//! configurable number of frames, and may fail at random.

use crate::ar_session::*;
use crate::geometry::Pose;
use log::{debug, warn};
use rand::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct AnchorData {
    pose: Pose,
    tracking_state: TrackingState,
    cloud_state: CloudAnchorState,
    cloud_id: Option<String>,
}

/// Anchor handle handed out by [`DummyArSession`]. Clones share state.
#[derive(Debug, Clone)]
pub struct DummyAnchor {
    inner: Arc<Mutex<AnchorData>>,
}

impl DummyAnchor {
    /// A local anchor tracking at `pose`.
    pub fn new(pose: Pose) -> Self {
        Self::with_state(pose, TrackingState::Tracking, CloudAnchorState::None, None)
    }

    fn with_state(
        pose: Pose,
        tracking_state: TrackingState,
        cloud_state: CloudAnchorState,
        cloud_id: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AnchorData {
                pose,
                tracking_state,
                cloud_state,
                cloud_id,
            })),
        }
    }

    fn data(&self) -> MutexGuard<'_, AnchorData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_cloud_anchor_state(&self, state: CloudAnchorState) {
        self.data().cloud_state = state;
    }

    pub fn set_tracking_state(&self, state: TrackingState) {
        self.data().tracking_state = state;
    }

    pub fn set_pose(&self, pose: Pose) {
        self.data().pose = pose;
    }

    pub fn set_cloud_anchor_id(&self, id: &str) {
        self.data().cloud_id = Some(id.to_owned());
    }

    /// True when both handles refer to the same anchor.
    pub fn same_anchor(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for DummyAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.same_anchor(other)
    }
}

impl Anchor for DummyAnchor {
    fn pose(&self) -> Pose {
        self.data().pose
    }
    fn tracking_state(&self) -> TrackingState {
        self.data().tracking_state
    }
    fn cloud_anchor_state(&self) -> CloudAnchorState {
        self.data().cloud_state
    }
    fn cloud_anchor_id(&self) -> Option<String> {
        self.data().cloud_id.clone()
    }
}

/// How the simulated estimator rates viewpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityMode {
    /// Always the same answer.
    Fixed(FeatureMapQuality),
    /// Good with probability `good`, otherwise sufficient with probability
    /// `sufficient`, otherwise insufficient.
    Random { good: f64, sufficient: f64 },
}

enum Request {
    Host { pose: Option<Pose> },
    Resolve { id: String },
}

struct InFlight {
    anchor: DummyAnchor,
    request: Request,
    completes_at: u64,
}

pub struct DummyArSession {
    rng: Mutex<StdRng>,
    frame: u64,
    latency_frames: u64,
    failure_rate: f64,
    quality: QualityMode,
    cloud: HashMap<String, Pose>,
    in_flight: Vec<InFlight>,
    next_cloud_id: u64,
}

/// Builder for [`DummyArSession`].
#[derive(Debug, Clone)]
pub struct DummyArSessionBuilder {
    seed: Option<u64>,
    latency_frames: u64,
    failure_rate: f64,
    quality: QualityMode,
    cloud: HashMap<String, Pose>,
}

impl DummyArSessionBuilder {
    /// Seeds the random generator so runs are reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    /// Number of [`DummyArSession::update`] calls a request takes.
    pub fn latency_frames(mut self, frames: u64) -> Self {
        self.latency_frames = frames;
        self
    }
    /// Probability that a finished request fails.
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
    pub fn quality(mut self, quality: QualityMode) -> Self {
        self.quality = quality;
        self
    }
    /// Makes `id` resolvable, as if it had been hosted in an earlier session.
    pub fn cloud_anchor(mut self, id: &str, pose: Pose) -> Self {
        self.cloud.insert(id.to_owned(), pose);
        self
    }
    pub fn build(self) -> DummyArSession {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        DummyArSession {
            rng: Mutex::new(rng),
            frame: 0,
            latency_frames: self.latency_frames,
            failure_rate: self.failure_rate,
            quality: self.quality,
            cloud: self.cloud,
            in_flight: Vec::new(),
            next_cloud_id: 0,
        }
    }
}

impl DummyArSession {
    pub fn builder() -> DummyArSessionBuilder {
        DummyArSessionBuilder {
            seed: None,
            latency_frames: 30,
            failure_rate: 0.0,
            quality: QualityMode::Random {
                good: 0.4,
                sufficient: 0.4,
            },
            cloud: HashMap::new(),
        }
    }

    /// Number of updates so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Handles of every request still running, oldest first.
    pub fn in_flight_anchors(&self) -> Vec<DummyAnchor> {
        self.in_flight.iter().map(|f| f.anchor.clone()).collect()
    }

    /// Ids of every anchor hosted through or seeded into this session.
    pub fn cloud_anchor_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.cloud.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Advances the simulation by one frame, finishing requests whose latency
    /// has elapsed.
    pub fn update(&mut self) {
        self.frame += 1;
        let frame = self.frame;
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|f| f.completes_at <= frame);
        self.in_flight = running;

        for InFlight {
            anchor, request, ..
        } in done
        {
            if anchor.cloud_anchor_state() != CloudAnchorState::TaskInProgress {
                // Someone already decided this request's fate.
                continue;
            }
            let failed = self.roll(self.failure_rate);
            match request {
                Request::Host { pose: None } => {
                    anchor.set_cloud_anchor_state(CloudAnchorState::ErrorInternal);
                }
                Request::Host { pose: Some(_) } if failed => {
                    anchor.set_cloud_anchor_state(CloudAnchorState::ErrorHostingServiceUnavailable);
                }
                Request::Host { pose: Some(pose) } => {
                    let id = format!("ua-{:016x}", self.next_cloud_id);
                    self.next_cloud_id += 1;
                    self.cloud.insert(id.clone(), pose);
                    anchor.set_cloud_anchor_id(&id);
                    anchor.set_cloud_anchor_state(CloudAnchorState::Success);
                    debug!("Simulated hosting finished as {id}");
                }
                Request::Resolve { id } => match self.cloud.get(&id) {
                    Some(_) if failed => {
                        anchor.set_cloud_anchor_state(CloudAnchorState::ErrorInternal);
                    }
                    Some(&pose) => {
                        anchor.set_pose(pose);
                        anchor.set_tracking_state(TrackingState::Tracking);
                        anchor.set_cloud_anchor_state(CloudAnchorState::Success);
                        debug!("Simulated resolving of {id} finished");
                    }
                    None => {
                        warn!("Simulated cloud has no anchor {id}");
                        anchor.set_cloud_anchor_state(CloudAnchorState::ErrorCloudIdNotFound);
                    }
                },
            }
        }
    }

    fn roll(&self, probability: f64) -> bool {
        probability > 0.0
            && self
                .rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_bool(probability)
    }

    fn push_request(&mut self, anchor: DummyAnchor, request: Request) {
        self.in_flight.push(InFlight {
            anchor,
            request,
            completes_at: self.frame + self.latency_frames,
        });
    }
}

impl ArSession for DummyArSession {
    type Anchor = DummyAnchor;

    fn create_anchor(&mut self, pose: Pose) -> DummyAnchor {
        DummyAnchor::new(pose)
    }

    fn host_cloud_anchor_with_ttl(&mut self, anchor: Option<&DummyAnchor>, ttl_days: u32) -> DummyAnchor {
        let pose = anchor.map(|a| a.pose());
        debug!("Simulated hosting requested with ttl {ttl_days}");
        let handle = DummyAnchor::with_state(
            pose.unwrap_or_else(Pose::identity),
            TrackingState::Tracking,
            CloudAnchorState::TaskInProgress,
            None,
        );
        self.push_request(handle.clone(), Request::Host { pose });
        handle
    }

    fn resolve_cloud_anchor(&mut self, anchor_id: &str) -> DummyAnchor {
        let handle = DummyAnchor::with_state(
            Pose::identity(),
            TrackingState::Paused,
            CloudAnchorState::TaskInProgress,
            Some(anchor_id.to_owned()),
        );
        self.push_request(
            handle.clone(),
            Request::Resolve {
                id: anchor_id.to_owned(),
            },
        );
        handle
    }

    fn estimate_feature_map_quality_for_hosting(&self, _camera_pose: &Pose) -> FeatureMapQuality {
        match self.quality {
            QualityMode::Fixed(q) => q,
            QualityMode::Random { good, sufficient } => {
                if self.roll(good) {
                    FeatureMapQuality::Good
                } else if self.roll(sufficient) {
                    FeatureMapQuality::Sufficient
                } else {
                    FeatureMapQuality::Insufficient
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn hosting_then_resolving() {
        let mut session = DummyArSession::builder().seed(1).latency_frames(2).build();
        let pose = Pose::from_parts(Translation3::new(1.0, 0.0, -2.0), UnitQuaternion::identity());
        let local = session.create_anchor(pose);
        let hosted = session.host_cloud_anchor_with_ttl(Some(&local), 1);

        session.update();
        assert_eq!(hosted.cloud_anchor_state(), CloudAnchorState::TaskInProgress);
        session.update();
        assert_eq!(hosted.cloud_anchor_state(), CloudAnchorState::Success);
        let id = hosted.cloud_anchor_id().unwrap();

        let resolved = session.resolve_cloud_anchor(&id);
        assert_eq!(resolved.tracking_state(), TrackingState::Paused);
        session.update();
        session.update();
        assert_eq!(resolved.cloud_anchor_state(), CloudAnchorState::Success);
        assert_eq!(resolved.tracking_state(), TrackingState::Tracking);
        assert_eq!(resolved.pose(), pose);
    }

    #[test]
    fn unknown_ids_and_missing_anchors_fail() {
        let mut session = DummyArSession::builder().latency_frames(0).build();
        let resolved = session.resolve_cloud_anchor("nope");
        let hosted = session.host_cloud_anchor_with_ttl(None, 1);
        session.update();
        assert_eq!(
            resolved.cloud_anchor_state(),
            CloudAnchorState::ErrorCloudIdNotFound
        );
        assert_eq!(hosted.cloud_anchor_state(), CloudAnchorState::ErrorInternal);
    }

    #[test]
    fn certain_failure_fails_hosting() {
        let mut session = DummyArSession::builder()
            .seed(3)
            .latency_frames(0)
            .failure_rate(1.0)
            .build();
        let local = session.create_anchor(Pose::identity());
        let hosted = session.host_cloud_anchor_with_ttl(Some(&local), 1);
        session.update();
        assert!(hosted.cloud_anchor_state().is_error());
        assert!(session.cloud_anchor_ids().is_empty());
    }

    #[test]
    fn fixed_quality_is_returned() {
        let session = DummyArSession::builder()
            .quality(QualityMode::Fixed(FeatureMapQuality::Sufficient))
            .build();
        assert_eq!(
            session.estimate_feature_map_quality_for_hosting(&Pose::identity()),
            FeatureMapQuality::Sufficient
        );
    }
}
