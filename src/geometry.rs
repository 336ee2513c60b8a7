//! Vector and pose helpers shared by the quality ring, the hosting loop and the
//! resolved-anchor drawing code.
//!
//! Poses follow the AR subsystem's convention: right handed, y up, the camera
//! looks down its own -z axis, and view/projection matrices are the usual
//! column-major OpenGL matrices.

use nalgebra::{Isometry3, Matrix4, Point3, Unit, UnitQuaternion, Vector3};
use thiserror::Error;

/// A rigid transform (rotation + translation) in the AR subsystem's world.
pub type Pose = Isometry3<f32>;

/// Vectors shorter than this have no usable direction.
const MIN_VECTOR_LENGTH: f32 = 1e-6;

/// The view angle (in degrees) from which an anchor counts as seen. Observed
/// empirically on devices.
pub const MIN_SEEN_ANGLE_DEGREES: f64 = 130.0;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// A direction was requested from a vector with (almost) no length.
    #[error("vector has zero length and no direction")]
    ZeroLength,
    /// Only the x (0), y (1) and z (2) axes exist.
    #[error("invalid axis {0}")]
    InvalidAxis(usize),
    /// The view matrix could not be inverted.
    #[error("view matrix is singular")]
    SingularView,
}

/// Returns the 2-norm of `v`.
pub fn norm(v: &Vector3<f32>) -> f32 {
    v.norm()
}

/// Returns `v` scaled to unit length.
pub fn normalize(v: &Vector3<f32>) -> Result<Vector3<f32>, GeometryError> {
    let len = norm(v);
    if len < MIN_VECTOR_LENGTH {
        return Err(GeometryError::ZeroLength);
    }
    Ok(v / len)
}

/// Returns the rotation about the origin that turns `from` so that it is
/// colinear with `to`. The rotation takes the shortest path, so its angle is
/// always in `[0, π]`.
pub fn rotate_between(
    from: &Vector3<f32>,
    to: &Vector3<f32>,
) -> Result<UnitQuaternion<f32>, GeometryError> {
    let from = normalize(from)?;
    let to = normalize(to)?;
    let cross = from.cross(&to);
    let dot = from.dot(&to);
    let angle = norm(&cross).atan2(dot);

    if norm(&cross) < MIN_VECTOR_LENGTH {
        if dot > 0.0 {
            return Ok(UnitQuaternion::identity());
        }
        // Opposite vectors: every axis perpendicular to `from` is a shortest path.
        let helper = if from.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = Unit::new_normalize(from.cross(&helper));
        return Ok(UnitQuaternion::from_axis_angle(&axis, angle));
    }

    Ok(UnitQuaternion::from_axis_angle(
        &Unit::new_normalize(cross),
        angle,
    ))
}

/// Returns a rotation of `angle_rad` about the x (0), y (1) or z (2) axis.
pub fn axis_rotation(axis: usize, angle_rad: f32) -> Result<UnitQuaternion<f32>, GeometryError> {
    let axis = match axis {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        2 => Vector3::z_axis(),
        other => return Err(GeometryError::InvalidAxis(other)),
    };
    Ok(UnitQuaternion::from_axis_angle(&axis, angle_rad))
}

/// World position of the camera described by `view`.
pub fn camera_position(view: &Matrix4<f32>) -> Result<Point3<f32>, GeometryError> {
    let inv = view.try_inverse().ok_or(GeometryError::SingularView)?;
    Ok(Point3::new(inv[(0, 3)], inv[(1, 3)], inv[(2, 3)]))
}

/// Unit z axis of the camera frame, in world coordinates. The camera looks
/// down the opposite direction.
pub fn camera_look(view: &Matrix4<f32>) -> Result<Vector3<f32>, GeometryError> {
    let inv = view.try_inverse().ok_or(GeometryError::SingularView)?;
    normalize(&Vector3::new(inv[(0, 2)], inv[(1, 2)], inv[(2, 2)]))
}

/// Angle in degrees between the camera frame's z axis and the ray from the
/// camera to `anchor`.
pub fn view_angle(view: &Matrix4<f32>, anchor: &Point3<f32>) -> Result<f64, GeometryError> {
    let look = camera_look(view)?;
    let diff = normalize(&(anchor - camera_position(view)?))?;
    let cos = f64::from(look.dot(&diff)).clamp(-1.0, 1.0);
    Ok(cos.acos().to_degrees())
}

/// True when the anchor lies within the camera's viewing cone.
pub fn can_anchor_be_seen(view: &Matrix4<f32>, anchor: &Point3<f32>) -> Result<bool, GeometryError> {
    Ok(view_angle(view, anchor)? >= MIN_SEEN_ANGLE_DEGREES)
}

/// Projects a world point into normalized device coordinates. Returns `None`
/// when the point is on or behind the camera plane (w <= 0).
pub fn project_to_ndc(
    point: &Point3<f32>,
    view: &Matrix4<f32>,
    projection: &Matrix4<f32>,
) -> Option<(f32, f32)> {
    let clip = projection * view * point.to_homogeneous();
    if clip.w <= 0.0 {
        return None;
    }
    Some((clip.x / clip.w, clip.y / clip.w))
}

/// Builds a right handed perspective projection. Used by the simulated session
/// and by tests; the real AR subsystem hands out its own matrix.
pub fn perspective(aspect: f32, fovy_rad: f32, near: f32, far: f32) -> Matrix4<f32> {
    Matrix4::new_perspective(aspect, fovy_rad, near, far)
}

/// View matrix of a camera placed at `eye` looking at `target`.
pub fn look_at(eye: &Point3<f32>, target: &Point3<f32>) -> Matrix4<f32> {
    Isometry3::look_at_rh(eye, target, &Vector3::y()).to_homogeneous()
}
