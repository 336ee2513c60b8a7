//! Status messages shown to the user while hosting or resolving.

use std::fmt::{self, Display};

use crate::ar_session::CloudAnchorState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    PlaceAnchor,
    TooClose,
    TooFar,
    HostingSave,
    HostingProcessing,
    HostingSuccess(String),
    HostingError(CloudAnchorState),
    /// Still waiting for this many anchors.
    ResolvingProcessing(usize),
    ResolvingSuccess,
    ResolvingError(CloudAnchorState),
}

impl UserMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::HostingError(_) | Self::ResolvingError(_))
    }
}

impl Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaceAnchor => write!(f, "Tap on a surface to place an anchor."),
            Self::TooClose => write!(f, "You are too close, move further away."),
            Self::TooFar => write!(f, "You are too far, move closer."),
            Self::HostingSave => write!(f, "Walk around the anchor to capture it from every side."),
            Self::HostingProcessing => write!(f, "Hosting anchor..."),
            Self::HostingSuccess(id) => write!(f, "Anchor hosted as {id}."),
            Self::HostingError(state) => write!(f, "Hosting failed: {state}"),
            Self::ResolvingProcessing(n) => write!(f, "Looking for {n} anchor(s)..."),
            Self::ResolvingSuccess => write!(f, "Anchor resolved."),
            Self::ResolvingError(state) => write!(f, "Resolving failed: {state}"),
        }
    }
}
