//! The resolving flow: look up previously hosted anchors by id and keep track
//! of which ones have been found.

use std::sync::{mpsc::Sender, Arc, Mutex, PoisonError};

use log::{error, info};
use nalgebra::{Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

use crate::ar_session::{Anchor, ArSession};
use crate::cloud_anchor_manager::CloudAnchorManager;
use crate::feature_map_quality::is_anchor_in_view;
use crate::geometry::{rotate_between, GeometryError, Pose};
use crate::messages::UserMessage;

/// The direction the ghost model faces in its own frame.
fn model_facing() -> Vector3<f32> {
    Vector3::x()
}

/// Change of which resolved anchor is the one playing its media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Pause and rewind the media of this anchor.
    Stop(String),
    /// Start the media of this anchor.
    Start(String),
}

/// The anchors requested for resolving, and those found so far.
#[derive(Debug)]
pub struct ResolvedAnchors<A> {
    unresolved_ids: Vec<String>,
    resolved: Vec<A>,
    playing: Option<String>,
}

impl<A> Default for ResolvedAnchors<A> {
    fn default() -> Self {
        Self {
            unresolved_ids: Vec::new(),
            resolved: Vec::new(),
            playing: None,
        }
    }
}

impl<A: Anchor> ResolvedAnchors<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ids that are about to be resolved.
    pub fn begin(&mut self, ids: Vec<String>) {
        self.unresolved_ids = ids;
    }

    pub fn unresolved_ids(&self) -> &[String] {
        &self.unresolved_ids
    }

    pub fn resolved(&self) -> &[A] {
        &self.resolved
    }

    /// Adds `anchor` to the resolved set if its id is still awaited. Returns
    /// whether it was added.
    pub fn set_anchor_as_resolved(&mut self, anchor: A) -> bool {
        let Some(id) = anchor.cloud_anchor_id() else {
            return false;
        };
        let Some(pos) = self.unresolved_ids.iter().position(|u| *u == id) else {
            return false;
        };
        self.unresolved_ids.remove(pos);
        self.resolved.push(anchor);
        true
    }

    /// Handles the result of one resolving request and returns the status to
    /// show.
    pub fn on_resolve_complete(&mut self, anchor: A) -> UserMessage {
        let state = anchor.cloud_anchor_state();
        if state.is_error() {
            error!("Error resolving a cloud anchor, state {state}");
            return UserMessage::ResolvingError(state);
        }
        self.set_anchor_as_resolved(anchor);
        if self.unresolved_ids.is_empty() {
            info!("All anchors resolved");
            UserMessage::ResolvingSuccess
        } else {
            info!(
                "Attempting to resolve {} anchor(s): {:?}",
                self.unresolved_ids.len(),
                self.unresolved_ids
            );
            UserMessage::ResolvingProcessing(self.unresolved_ids.len())
        }
    }

    /// The resolved anchor nearest to the camera among those on screen.
    pub fn closest_visible(
        &self,
        camera_pose: &Pose,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Option<&A> {
        let camera = camera_pose.translation.vector;
        self.resolved
            .iter()
            .map(|anchor| (anchor, anchor.pose().translation.vector))
            .filter(|(_, position)| is_anchor_in_view(&Point3::from(*position), view, projection))
            .min_by(|(_, a), (_, b)| {
                (a - camera)
                    .norm_squared()
                    .total_cmp(&(b - camera).norm_squared())
            })
            .map(|(anchor, _)| anchor)
    }

    /// Makes the closest visible anchor the one playing its media, and returns
    /// what has to stop and start for that.
    pub fn update_playback(
        &mut self,
        camera_pose: &Pose,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Vec<PlaybackEvent> {
        let closest = self
            .closest_visible(camera_pose, view, projection)
            .and_then(Anchor::cloud_anchor_id);
        if closest == self.playing {
            return Vec::new();
        }
        let mut events = Vec::new();
        if let Some(old) = self.playing.take() {
            events.push(PlaybackEvent::Stop(old));
        }
        if let Some(new) = closest {
            events.push(PlaybackEvent::Start(new.clone()));
            self.playing = Some(new);
        }
        events
    }

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }
}

/// Requests every id in `ids`. Results land in `anchors`, and the status to
/// show for each result is sent on `messages`.
pub fn resolve_all<S, M>(
    manager: &CloudAnchorManager<S>,
    anchors: &Arc<Mutex<ResolvedAnchors<S::Anchor>>>,
    ids: Vec<String>,
    messages: &Sender<M>,
) where
    S: ArSession,
    M: From<UserMessage> + Send + 'static,
{
    anchors
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .begin(ids.clone());
    info!("Attempting to resolve {} anchor(s): {:?}", ids.len(), ids);
    let _ = messages.send(UserMessage::ResolvingProcessing(ids.len()).into());

    for id in &ids {
        let anchors = anchors.clone();
        let messages = messages.clone();
        manager.resolve_cloud_anchor(id, move |anchor| {
            let message = anchors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_resolve_complete(anchor);
            let _ = messages.send(message.into());
        });
    }
}

/// Pose at which to draw a resolved anchor's model so that it turns to face
/// the camera about the vertical axis.
pub fn camera_facing_pose(anchor_pose: &Pose, camera_pose: &Pose) -> Result<Pose, GeometryError> {
    let anchor_translation = Pose::from_parts(anchor_pose.translation, UnitQuaternion::identity());
    let mut object_to_camera = (anchor_translation.inverse() * camera_pose)
        .translation
        .vector;
    object_to_camera.y = 0.0;

    let facing = rotate_between(&model_facing(), &object_to_camera)?;
    let quarter_turn = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
    Ok(anchor_translation
        * Pose::from_parts(Translation3::identity(), facing)
        * Pose::from_parts(Translation3::identity(), quarter_turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ar_session::CloudAnchorState;
    use crate::dummy_session::{DummyAnchor, DummyArSession};
    use crate::geometry::{look_at, perspective};
    use std::sync::mpsc::channel;

    fn resolved_anchor(id: &str, x: f32, z: f32) -> DummyAnchor {
        let anchor = DummyAnchor::new(Pose::translation(x, 0.0, z));
        anchor.set_cloud_anchor_id(id);
        anchor.set_cloud_anchor_state(CloudAnchorState::Success);
        anchor
    }

    #[test]
    fn only_awaited_ids_are_accepted() {
        let mut anchors = ResolvedAnchors::new();
        anchors.begin(vec!["a".into(), "b".into()]);

        assert!(!anchors.set_anchor_as_resolved(resolved_anchor("c", 0.0, 0.0)));
        assert_eq!(
            anchors.on_resolve_complete(resolved_anchor("a", 0.0, 0.0)),
            UserMessage::ResolvingProcessing(1)
        );
        // A second result for the same id is not added again.
        assert!(!anchors.set_anchor_as_resolved(resolved_anchor("a", 0.0, 0.0)));
        assert_eq!(
            anchors.on_resolve_complete(resolved_anchor("b", 0.0, 0.0)),
            UserMessage::ResolvingSuccess
        );
        assert_eq!(anchors.resolved().len(), 2);
        assert!(anchors.unresolved_ids().is_empty());
    }

    #[test]
    fn errors_leave_the_id_unresolved() {
        let mut anchors = ResolvedAnchors::new();
        anchors.begin(vec!["a".into()]);
        let failed = resolved_anchor("a", 0.0, 0.0);
        failed.set_cloud_anchor_state(CloudAnchorState::ErrorCloudIdNotFound);
        assert_eq!(
            anchors.on_resolve_complete(failed),
            UserMessage::ResolvingError(CloudAnchorState::ErrorCloudIdNotFound)
        );
        assert_eq!(anchors.unresolved_ids(), ["a".to_string()]);
    }

    #[test]
    fn playback_follows_the_closest_visible_anchor() {
        let mut anchors = ResolvedAnchors::new();
        anchors.begin(vec!["near".into(), "far".into(), "behind".into()]);
        anchors.set_anchor_as_resolved(resolved_anchor("near", 0.0, -1.0));
        anchors.set_anchor_as_resolved(resolved_anchor("far", 0.0, -5.0));
        anchors.set_anchor_as_resolved(resolved_anchor("behind", 0.0, 1.0));

        let proj = perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 100.0);
        let camera = Pose::identity();
        let view = look_at(&Point3::origin(), &Point3::new(0.0, 0.0, -1.0));

        let closest = anchors.closest_visible(&camera, &view, &proj).unwrap();
        assert_eq!(closest.cloud_anchor_id().as_deref(), Some("near"));

        assert_eq!(
            anchors.update_playback(&camera, &view, &proj),
            vec![PlaybackEvent::Start("near".into())]
        );
        assert!(anchors.update_playback(&camera, &view, &proj).is_empty());

        // Turn around: only "behind" is on screen now.
        let view = look_at(&Point3::origin(), &Point3::new(0.0, 0.0, 1.0));
        assert_eq!(
            anchors.update_playback(&camera, &view, &proj),
            vec![
                PlaybackEvent::Stop("near".into()),
                PlaybackEvent::Start("behind".into())
            ]
        );
        assert_eq!(anchors.playing(), Some("behind"));
    }

    #[test]
    fn resolve_all_reports_each_result() {
        let session = Arc::new(Mutex::new(
            DummyArSession::builder()
                .latency_frames(1)
                .cloud_anchor("known", Pose::translation(1.0, 0.0, 0.0))
                .build(),
        ));
        let manager = CloudAnchorManager::new(session.clone(), 1);
        let anchors = Arc::new(Mutex::new(ResolvedAnchors::new()));
        let (tx, rx) = channel::<UserMessage>();

        resolve_all(
            &manager,
            &anchors,
            vec!["known".into(), "unknown".into()],
            &tx,
        );
        assert_eq!(rx.try_recv(), Ok(UserMessage::ResolvingProcessing(2)));

        session.lock().unwrap().update();
        manager.on_update();

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.contains(&UserMessage::ResolvingProcessing(1)));
        assert!(messages.contains(&UserMessage::ResolvingError(
            CloudAnchorState::ErrorCloudIdNotFound
        )));
        let anchors = anchors.lock().unwrap();
        assert_eq!(anchors.resolved().len(), 1);
        assert_eq!(anchors.unresolved_ids(), ["unknown".to_string()]);
    }

    #[test]
    fn facing_pose_turns_towards_camera() {
        let anchor = Pose::translation(1.0, 0.0, 0.0);
        let camera = Pose::translation(1.0, 1.5, 2.0);
        let pose = camera_facing_pose(&anchor, &camera).unwrap();
        assert!((pose.translation.vector - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-5);

        // The model's facing axis, undone by the quarter turn, points at the
        // camera along the floor.
        let quarter_turn =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let facing = pose.rotation * (quarter_turn.inverse() * model_facing());
        assert!((facing - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn facing_pose_needs_a_horizontal_offset() {
        let anchor = Pose::identity();
        let camera = Pose::translation(0.0, 2.0, 0.0);
        assert_eq!(
            camera_facing_pose(&anchor, &camera),
            Err(GeometryError::ZeroLength)
        );
    }
}
