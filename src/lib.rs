//! Ghosts of History places short historical scenes ("ghosts") at real world
//! spots. A visitor on site places an anchor, walks around it until the AR
//! subsystem has mapped it from enough viewpoints, and hosts it in the cloud.
//! Later visitors resolve the hosted anchors by id, and the closest one on
//! screen plays its scene.
//!
//! This crate is the anchor core of that app, independent of any particular AR
//! SDK or renderer:
//!
//! - [`cloud_anchor_manager`] turns the SDK's polled request states into
//!   one-shot completion callbacks.
//! - [`feature_map_quality`] keeps the ring of quality bars around an anchor
//!   that tells the visitor which sides still need mapping.
//! - [`hosting`] and [`resolving`] are the two user flows built on top.
//! - [`anchor_store`] remembers hosted anchors between runs.
//!
//! The AR subsystem sits behind the [`ar_session`] traits.
//! [`dummy_session`] and [`orbit`] simulate it for the `ghosts` and `monitor`
//! binaries and for tests.

pub mod anchor_store;
pub mod ar_session;
pub mod args;
pub mod cloud_anchor_manager;
pub mod config;
pub mod dummy_session;
pub mod error;
pub mod feature_map_quality;
pub mod geometry;
pub mod gui;
pub mod hosting;
pub mod messages;
pub mod orbit;
pub mod resolving;

pub use error::GhostError;
