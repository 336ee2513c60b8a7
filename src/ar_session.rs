//! The seam between this crate and the AR subsystem that tracks the world,
//! detects planes and talks to the cloud anchor service.
//!
//! Nothing here does any tracking itself. [`ArSession`] and [`Anchor`] are
//! implemented by whatever backs the session: the device SDK in an app, or
//! [`DummyArSession`](crate::dummy_session::DummyArSession) in the binaries and
//! tests.

use std::fmt::{self, Display};

use crate::geometry::Pose;

/// Whether the AR subsystem is currently tracking something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Progress of a hosting or resolving request, as reported on the anchor
/// handle returned by the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudAnchorState {
    None,
    TaskInProgress,
    Success,
    ErrorInternal,
    ErrorNotAuthorized,
    ErrorResourceExhausted,
    ErrorHostingDatasetProcessingFailed,
    ErrorCloudIdNotFound,
    ErrorResolvingSdkVersionTooOld,
    ErrorResolvingSdkVersionTooNew,
    ErrorHostingServiceUnavailable,
}

impl CloudAnchorState {
    /// True for every variant describing a failed request.
    pub fn is_error(self) -> bool {
        !matches!(self, Self::None | Self::TaskInProgress | Self::Success)
    }

    /// A request in this state will not change any more, so its listener can
    /// be told about it.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::None | Self::TaskInProgress)
    }
}

impl Display for CloudAnchorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::TaskInProgress => "TASK_IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::ErrorInternal => "ERROR_INTERNAL",
            Self::ErrorNotAuthorized => "ERROR_NOT_AUTHORIZED",
            Self::ErrorResourceExhausted => "ERROR_RESOURCE_EXHAUSTED",
            Self::ErrorHostingDatasetProcessingFailed => "ERROR_HOSTING_DATASET_PROCESSING_FAILED",
            Self::ErrorCloudIdNotFound => "ERROR_CLOUD_ID_NOT_FOUND",
            Self::ErrorResolvingSdkVersionTooOld => "ERROR_RESOLVING_SDK_VERSION_TOO_OLD",
            Self::ErrorResolvingSdkVersionTooNew => "ERROR_RESOLVING_SDK_VERSION_TOO_NEW",
            Self::ErrorHostingServiceUnavailable => "ERROR_HOSTING_SERVICE_UNAVAILABLE",
        };
        f.write_str(s)
    }
}

/// The estimator's verdict on how well a viewpoint has been mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMapQuality {
    Insufficient,
    Sufficient,
    Good,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneType {
    HorizontalUpwardFacing,
    HorizontalDownwardFacing,
    Vertical,
}

/// What a hit test hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trackable {
    Plane {
        plane_type: PlaneType,
        /// Whether the hit pose lies inside the plane's polygon.
        pose_in_polygon: bool,
    },
    Point,
    DepthPoint,
}

/// One result of a hit test against the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub hit_pose: Pose,
    pub trackable: Trackable,
}

impl HitResult {
    /// Anchors are only created on hits inside a detected plane's polygon.
    pub fn can_create_anchor(&self) -> bool {
        match self.trackable {
            Trackable::Plane {
                pose_in_polygon, ..
            } => pose_in_polygon,
            Trackable::Point | Trackable::DepthPoint => false,
        }
    }

    /// The plane type, if a plane was hit.
    pub fn plane_type(&self) -> Option<PlaneType> {
        match self.trackable {
            Trackable::Plane { plane_type, .. } => Some(plane_type),
            Trackable::Point | Trackable::DepthPoint => None,
        }
    }
}

/// A handle to an anchor owned by the AR subsystem. Reading its state is cheap
/// and reflects the subsystem's latest update.
pub trait Anchor: Clone + Send + 'static {
    fn pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    fn cloud_anchor_state(&self) -> CloudAnchorState;
    /// The cloud id, once hosting succeeded or for anchors being resolved.
    fn cloud_anchor_id(&self) -> Option<String>;
}

/// The subset of the AR session the hosting and resolving logic needs.
pub trait ArSession: Send {
    type Anchor: Anchor;

    /// Places a local anchor at `pose`.
    fn create_anchor(&mut self, pose: Pose) -> Self::Anchor;

    /// Starts hosting `anchor` so it stays resolvable for `ttl_days`.
    fn host_cloud_anchor_with_ttl(
        &mut self,
        anchor: Option<&Self::Anchor>,
        ttl_days: u32,
    ) -> Self::Anchor;

    /// Starts resolving the anchor hosted under `anchor_id`.
    fn resolve_cloud_anchor(&mut self, anchor_id: &str) -> Self::Anchor;

    /// Estimates how well the area around the anchor has been mapped from
    /// `camera_pose`.
    fn estimate_feature_map_quality_for_hosting(&self, camera_pose: &Pose) -> FeatureMapQuality;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!CloudAnchorState::None.is_terminal());
        assert!(!CloudAnchorState::TaskInProgress.is_terminal());
        assert!(CloudAnchorState::Success.is_terminal());
        assert!(!CloudAnchorState::Success.is_error());
        assert!(CloudAnchorState::ErrorCloudIdNotFound.is_terminal());
        assert!(CloudAnchorState::ErrorCloudIdNotFound.is_error());
    }

    #[test]
    fn only_plane_hits_inside_polygon_create_anchors() {
        let inside = HitResult {
            hit_pose: Pose::identity(),
            trackable: Trackable::Plane {
                plane_type: PlaneType::Vertical,
                pose_in_polygon: true,
            },
        };
        let outside = HitResult {
            trackable: Trackable::Plane {
                plane_type: PlaneType::HorizontalUpwardFacing,
                pose_in_polygon: false,
            },
            ..inside
        };
        let point = HitResult {
            trackable: Trackable::Point,
            ..inside
        };
        assert!(inside.can_create_anchor());
        assert!(!outside.can_create_anchor());
        assert!(!point.can_create_anchor());
        assert_eq!(inside.plane_type(), Some(PlaneType::Vertical));
        assert_eq!(point.plane_type(), None);
    }
}
