//! The ring of quality bars drawn around an anchor while it is being mapped.
//!
//! The ring covers a half circle in front of the anchor (a plane has no
//! "behind" worth mapping) and is split into bars of equal angular width. Each
//! time the camera's viewpoint is rated by the AR subsystem the bar facing the
//! camera takes that rating, and the mean over all bars says whether enough of
//! the anchor's surroundings has been seen to host it.

use std::f64::consts::PI;

use log::{trace, warn};
use nalgebra::{Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

use crate::ar_session::FeatureMapQuality;
use crate::config::{QualityUiConfig, Rgba, MIN_SPACING_DEGREES};
use crate::geometry::{project_to_ndc, Pose};

/// Ratios closer to an integer than this count as that integer when sizing
/// the ring.
const BAR_COUNT_TOLERANCE: f64 = 1e-9;

/// Quality of one bar of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Unknown,
    Insufficient,
    Sufficient,
    Good,
}

impl Quality {
    /// Contribution of a bar to the overall quality.
    pub fn score(self) -> f32 {
        match self {
            Quality::Unknown | Quality::Insufficient => 0.0,
            Quality::Sufficient => 0.6,
            Quality::Good => 1.0,
        }
    }
}

impl From<FeatureMapQuality> for Quality {
    fn from(quality: FeatureMapQuality) -> Self {
        match quality {
            FeatureMapQuality::Insufficient => Quality::Insufficient,
            FeatureMapQuality::Sufficient => Quality::Sufficient,
            FeatureMapQuality::Good => Quality::Good,
        }
    }
}

/// The kind of plane the anchor was placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneOrientation {
    Horizontal,
    Vertical,
}

impl PlaneOrientation {
    /// Transform from the anchor frame to the ring's frame. In the ring frame
    /// +x points to the left of the screen and +z away from the camera.
    pub fn ui_transform(self) -> Pose {
        let rotation = match self {
            PlaneOrientation::Horizontal => {
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI)
            }
            PlaneOrientation::Vertical => {
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -std::f32::consts::FRAC_PI_2)
                    * UnitQuaternion::from_axis_angle(
                        &Vector3::x_axis(),
                        std::f32::consts::FRAC_PI_2,
                    )
            }
        };
        Pose::from_parts(Translation3::identity(), rotation)
    }
}

/// Draws bars. Implemented by whatever renders the ring.
pub trait BarRenderer {
    fn draw_bar(&mut self, model_matrix: &Matrix4<f32>, scale: f32, color: &Rgba);
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityBar {
    local_pose: Pose,
    quality: Quality,
}

impl QualityBar {
    fn new(rad: f64, radius: f32) -> Self {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), rad as f32);
        let local_pose = Pose::from_parts(Translation3::identity(), rotation)
            * Pose::translation(radius, 0.0, 0.0);
        Self {
            local_pose,
            quality: Quality::Unknown,
        }
    }

    /// Pose of the bar relative to the ring frame.
    pub fn local_pose(&self) -> &Pose {
        &self.local_pose
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }
}

pub struct FeatureMapQualityUi {
    orientation: PlaneOrientation,
    config: QualityUiConfig,
    ui_transform: Pose,
    bars: Vec<QualityBar>,
}

impl FeatureMapQualityUi {
    /// Builds the ring. A bar spacing outside `[MIN_SPACING_DEGREES, 180]`
    /// is clamped into that range.
    pub fn new(orientation: PlaneOrientation, mut config: QualityUiConfig) -> Self {
        if !(MIN_SPACING_DEGREES..=180.0).contains(&config.spacing_degrees) {
            let clamped = if config.spacing_degrees > 180.0 {
                180.0
            } else {
                MIN_SPACING_DEGREES
            };
            warn!(
                "Bar spacing {} degrees is out of range, using {clamped}",
                config.spacing_degrees
            );
            config.spacing_degrees = clamped;
        }
        let spacing = config.spacing_radians();
        let num_bars = ((PI / spacing) - BAR_COUNT_TOLERANCE).ceil().max(1.0) as usize;
        let bars = (0..num_bars)
            .map(|i| QualityBar::new(PI / num_bars as f64 * i as f64, config.radius))
            .collect();
        Self {
            orientation,
            config,
            ui_transform: orientation.ui_transform(),
            bars,
        }
    }

    /// A ring for an anchor on a horizontal plane.
    pub fn horizontal(config: QualityUiConfig) -> Self {
        Self::new(PlaneOrientation::Horizontal, config)
    }

    /// A ring for an anchor on a vertical plane.
    pub fn vertical(config: QualityUiConfig) -> Self {
        Self::new(PlaneOrientation::Vertical, config)
    }

    pub fn orientation(&self) -> PlaneOrientation {
        self.orientation
    }

    pub fn ui_transform(&self) -> &Pose {
        &self.ui_transform
    }

    pub fn bars(&self) -> &[QualityBar] {
        &self.bars
    }

    pub fn num_bars(&self) -> usize {
        self.bars.len()
    }

    pub fn radius(&self) -> f32 {
        self.config.radius
    }

    /// Camera position expressed in the ring frame of an anchor at
    /// `anchor_pose`.
    pub fn camera_in_ui_frame(&self, anchor_pose: &Pose, camera_pose: &Pose) -> Vector3<f32> {
        let ui_pose = anchor_pose * self.ui_transform;
        (ui_pose.inverse() * camera_pose).translation.vector
    }

    /// Index of the bar facing a camera at `view_ray` (in the ring frame). May
    /// be outside the ring when the camera is behind the anchor.
    pub fn compute_bar_index(&self, view_ray: &Vector3<f32>) -> i64 {
        let rad = -f64::from(view_ray.z).atan2(f64::from(view_ray.x));
        (rad / self.config.spacing_radians()).floor() as i64
    }

    /// Records `quality` on the bar facing `camera_position` (in the ring
    /// frame). Returns the index of the updated bar, or `None` when no bar
    /// faces the camera.
    pub fn update_quality_for_viewpoint(
        &mut self,
        camera_position: &Vector3<f32>,
        quality: FeatureMapQuality,
    ) -> Option<usize> {
        let idx = self.compute_bar_index(camera_position);
        let idx = usize::try_from(idx).ok().filter(|&i| i < self.bars.len())?;
        self.bars[idx].quality = quality.into();
        trace!("Bar {idx} is now {:?}", self.bars[idx].quality);
        Some(idx)
    }

    /// Mean bar score, in `[0, 1]`.
    pub fn compute_overall_quality(&self) -> f32 {
        let sum: f32 = self.bars.iter().map(|bar| bar.quality.score()).sum();
        sum / self.bars.len() as f32
    }

    /// Draws every bar at its place around an anchor at `anchor_pose`.
    pub fn draw_ui<R: BarRenderer>(&self, anchor_pose: &Pose, renderer: &mut R) {
        let ui_pose = anchor_pose * self.ui_transform;
        for bar in &self.bars {
            let model = (ui_pose * bar.local_pose).to_homogeneous();
            renderer.draw_bar(&model, self.config.bar_scale, &self.color(bar.quality));
        }
    }

    /// Colour used for bars of the given quality.
    pub fn color(&self, quality: Quality) -> Rgba {
        let colors = &self.config.colors;
        match quality {
            Quality::Unknown => colors.unknown,
            Quality::Insufficient => colors.low,
            Quality::Sufficient => colors.medium,
            Quality::Good => colors.high,
        }
    }
}

/// True when the anchor at `anchor_world` projects inside the visible part of
/// the screen for the camera described by `view` and `projection`.
pub fn is_anchor_in_view(
    anchor_world: &Point3<f32>,
    view: &Matrix4<f32>,
    projection: &Matrix4<f32>,
) -> bool {
    match project_to_ndc(anchor_world, view, projection) {
        Some((x, y)) => (-1.0..=1.0).contains(&x) && (-1.0..=1.0).contains(&y),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{look_at, perspective};

    /// Ray pointing at the middle of bar `i`.
    fn ray_for_bar(ui: &FeatureMapQualityUi, i: usize) -> Vector3<f32> {
        let theta = (i as f64 + 0.5) * ui.config.spacing_radians();
        Vector3::new(theta.cos() as f32, 0.0, -theta.sin() as f32)
    }

    #[test]
    fn ring_has_24_bars() {
        let ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        assert_eq!(ui.num_bars(), 24);
        assert!(ui.bars().iter().all(|b| b.quality() == Quality::Unknown));
        assert_eq!(ui.compute_overall_quality(), 0.0);
    }

    #[test]
    fn bar_count_rounds_up() {
        let config = QualityUiConfig {
            spacing_degrees: 50.0,
            ..QualityUiConfig::default()
        };
        assert_eq!(FeatureMapQualityUi::vertical(config).num_bars(), 4);
    }

    #[test]
    fn two_bars_give_expected_average() {
        let mut ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        let r0 = ray_for_bar(&ui, 0);
        let r12 = ray_for_bar(&ui, 12);
        assert_eq!(ui.update_quality_for_viewpoint(&r0, FeatureMapQuality::Good), Some(0));
        assert_eq!(
            ui.update_quality_for_viewpoint(&r12, FeatureMapQuality::Sufficient),
            Some(12)
        );
        let expected = (1.0 + 0.6) / 24.0;
        assert!((ui.compute_overall_quality() - expected).abs() < 1e-6);
    }

    #[test]
    fn rays_behind_the_anchor_are_ignored() {
        let mut ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        let behind = Vector3::new(0.0, 0.0, 1.0);
        assert!(ui.compute_bar_index(&behind) < 0);
        assert_eq!(
            ui.update_quality_for_viewpoint(&behind, FeatureMapQuality::Good),
            None
        );
        assert_eq!(ui.compute_overall_quality(), 0.0);
    }

    #[test]
    fn overall_quality_never_decreases_while_bars_improve() {
        let mut ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        let mut last = ui.compute_overall_quality();
        for step in [
            FeatureMapQuality::Insufficient,
            FeatureMapQuality::Sufficient,
            FeatureMapQuality::Good,
        ] {
            for i in 0..ui.num_bars() {
                let ray = ray_for_bar(&ui, i);
                ui.update_quality_for_viewpoint(&ray, step);
                let now = ui.compute_overall_quality();
                assert!(now >= last && (0.0..=1.0).contains(&now));
                last = now;
            }
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bars_sit_on_the_ring() {
        let ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        for bar in ui.bars() {
            let r = bar.local_pose().translation.vector.norm();
            assert!((r - ui.radius()).abs() < 1e-5);
        }
    }

    #[test]
    fn camera_in_front_of_horizontal_anchor() {
        let ui = FeatureMapQualityUi::horizontal(QualityUiConfig::default());
        let anchor = Pose::identity();
        // The horizontal ring frame is turned half way round, so a camera at
        // +z in anchor space is at -z in the ring frame.
        let camera = Pose::translation(-0.1, 1.0, 1.0);
        let v = ui.camera_in_ui_frame(&anchor, &camera);
        assert!((v - Vector3::new(0.1, 1.0, -1.0)).norm() < 1e-5);
        assert_eq!(ui.compute_bar_index(&v), 11);
    }

    struct Recorder {
        calls: Vec<(Matrix4<f32>, Rgba)>,
    }

    impl BarRenderer for Recorder {
        fn draw_bar(&mut self, model_matrix: &Matrix4<f32>, _scale: f32, color: &Rgba) {
            self.calls.push((*model_matrix, *color));
        }
    }

    #[test]
    fn draw_visits_every_bar() {
        let mut ui = FeatureMapQualityUi::vertical(QualityUiConfig::default());
        let ray = ray_for_bar(&ui, 3);
        ui.update_quality_for_viewpoint(&ray, FeatureMapQuality::Good);
        let mut recorder = Recorder { calls: vec![] };
        ui.draw_ui(&Pose::translation(1.0, 0.0, 0.0), &mut recorder);

        assert_eq!(recorder.calls.len(), 24);
        let colors = QualityUiConfig::default().colors;
        assert_eq!(recorder.calls[3].1, colors.high);
        assert_eq!(recorder.calls[0].1, colors.unknown);
    }

    #[test]
    fn spacing_is_clamped() {
        let narrow = QualityUiConfig {
            spacing_degrees: 1e-9,
            ..QualityUiConfig::default()
        };
        assert_eq!(FeatureMapQualityUi::horizontal(narrow).num_bars(), 360);

        let nan = QualityUiConfig {
            spacing_degrees: f64::NAN,
            ..QualityUiConfig::default()
        };
        assert_eq!(FeatureMapQualityUi::horizontal(nan).num_bars(), 360);

        let wide = QualityUiConfig {
            spacing_degrees: 400.0,
            ..QualityUiConfig::default()
        };
        assert_eq!(FeatureMapQualityUi::horizontal(wide).num_bars(), 1);
    }

    #[test]
    fn anchor_on_screen_edge_is_in_view() {
        // 90 degree field of view: the edges are where |x| == -z.
        let view = Matrix4::identity();
        #[rustfmt::skip]
        let proj = Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, -1.0, -0.2,
            0.0, 0.0, -1.0, 0.0,
        );
        assert!(is_anchor_in_view(&Point3::new(2.0, 0.0, -2.0), &view, &proj));
        assert!(is_anchor_in_view(&Point3::new(-2.0, 2.0, -2.0), &view, &proj));
        assert!(is_anchor_in_view(&Point3::new(0.0, -2.0, -2.0), &view, &proj));
        assert!(!is_anchor_in_view(&Point3::new(2.01, 0.0, -2.0), &view, &proj));
        assert!(!is_anchor_in_view(&Point3::new(0.0, -2.01, -2.0), &view, &proj));
    }

    #[test]
    fn anchor_visibility() {
        let view = look_at(&Point3::new(0.0, 0.0, 2.0), &Point3::origin());
        let proj = perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 100.0);
        assert!(is_anchor_in_view(&Point3::origin(), &view, &proj));
        // Far off to the side.
        assert!(!is_anchor_in_view(&Point3::new(50.0, 0.0, 0.0), &view, &proj));
        assert!(!is_anchor_in_view(&Point3::new(0.0, -50.0, 0.0), &view, &proj));
        // Behind the camera, whatever the x and y.
        assert!(!is_anchor_in_view(&Point3::new(0.0, 0.0, 3.0), &view, &proj));
        assert!(!is_anchor_in_view(&Point3::new(0.1, 0.1, 10.0), &view, &proj));
    }
}
