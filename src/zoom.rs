//! Per-page pinch zoom and pan.
//!
//! `scale` maps image pixels to screen pixels, so the fit scale is the
//! minimum and `relative_scale() == 1.0` means "fit to container". The
//! offset is measured from the container center to the content center.

use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::animation::{AnimatedValue, EasingFunction, TickOutcome};
use crate::config::PreviewConfig;
use crate::geometry::{Rect, Size, Vec2};

/// Slack used when deciding whether a page is zoomed past fit.
pub const FIT_EPSILON: f32 = 1e-3;

/// Gesture stream consumed by the engine. Positions are container-local.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomGesture {
    Tap,
    DoubleTap { centroid: Vec2 },
    TransformStart,
    /// One frame of a drag or pinch. `zoom` is the multiplicative change.
    Transform { centroid: Vec2, pan: Vec2, zoom: f32 },
    TransformEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomEffect {
    /// Single tap: flip the host's immersive flag.
    ToggleImmersive,
    /// A pinch started; immersive must be on.
    EnterImmersive,
    /// Zoomed content is pinned at an edge and was flung past it.
    RequestPageChange(i32),
    /// Container-sized decode, needed before anything can show.
    RequestLowRes { target: Size },
    /// Original-size decode, needed once the user zooms in.
    RequestHighRes,
}

pub type ZoomEffects = SmallVec<[ZoomEffect; 2]>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomSettings {
    /// Maximum zoom in image pixels per screen pixel
    pub max_scale: f32,
    /// Double tap target, relative to fit
    pub double_tap_scale: f32,
    pub high_res_factor: f32,
    pub fling_dead_zone: f32,
    pub settle: Duration,
    pub crossfade: Duration,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

impl ZoomSettings {
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            max_scale: config.max_zoom_scale,
            double_tap_scale: config.double_tap_scale,
            high_res_factor: config.high_res_zoom_factor,
            fling_dead_zone: config.edge_fling_dead_zone,
            settle: config.spring_back(),
            crossfade: config.high_res_crossfade(),
        }
    }
}

#[derive(Debug, Clone)]
enum HighRes {
    NotRequested,
    Requested,
    Loaded { alpha: AnimatedValue },
}

/// Zoom and pan state of one page.
#[derive(Debug, Clone)]
pub struct ZoomPanState {
    settings: ZoomSettings,
    container: Size,
    image: Size,
    scale: AnimatedValue,
    offset_x: AnimatedValue,
    offset_y: AnimatedValue,
    /// Scale has been seeded from the fit scale at least once.
    fitted: bool,
    gesture_active: bool,
    pinch_announced: bool,
    fling_fired: bool,
    last_pan_x: f32,
    low_res_requested: bool,
    high_res: HighRes,
}

impl ZoomPanState {
    pub fn new(settings: ZoomSettings) -> Self {
        Self {
            settings,
            container: Size::ZERO,
            image: Size::ZERO,
            scale: AnimatedValue::new(1.0),
            offset_x: AnimatedValue::new(0.0),
            offset_y: AnimatedValue::new(0.0),
            fitted: false,
            gesture_active: false,
            pinch_announced: false,
            fling_fired: false,
            last_pan_x: 0.0,
            low_res_requested: false,
            high_res: HighRes::NotRequested,
        }
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn image_size(&self) -> Size {
        self.image
    }

    /// Fit-to-container scale, or 1 while either size is unknown.
    pub fn min_scale(&self) -> f32 {
        if self.container.is_empty() || self.image.is_empty() {
            return 1.0;
        }
        let sw = self.container.width as f32 / self.image.width as f32;
        let sh = self.container.height as f32 / self.image.height as f32;
        sw.min(sh)
    }

    pub fn max_scale(&self) -> f32 {
        self.settings.max_scale.max(self.min_scale())
    }

    pub fn scale(&self, now: Instant) -> f32 {
        self.scale.sample(now)
    }

    pub fn offset(&self, now: Instant) -> Vec2 {
        Vec2::new(self.offset_x.sample(now), self.offset_y.sample(now))
    }

    /// Scale relative to fit; `<= 1` hands gestures to paging and dismiss.
    pub fn relative_scale(&self, now: Instant) -> f32 {
        let min = self.min_scale();
        if min <= 0.0 {
            return 1.0;
        }
        self.scale(now) / min
    }

    pub fn is_zoomed(&self, now: Instant) -> bool {
        self.relative_scale(now) > 1.0 + FIT_EPSILON
    }

    pub fn is_animating(&self) -> bool {
        self.scale.is_running()
            || self.offset_x.is_running()
            || self.offset_y.is_running()
            || matches!(&self.high_res, HighRes::Loaded { alpha } if alpha.is_running())
    }

    pub fn wants_high_res(&self) -> bool {
        !matches!(self.high_res, HighRes::NotRequested)
    }

    /// Opacity of the high-res layer over the low-res one.
    pub fn high_res_alpha(&self, now: Instant) -> f32 {
        match &self.high_res {
            HighRes::Loaded { alpha } => alpha.sample(now),
            _ => 0.0,
        }
    }

    /// Largest offset magnitude on each axis that keeps the content covering
    /// the container (zero on axes where the content is smaller).
    pub fn max_offset(&self, scale: f32) -> Vec2 {
        if self.container.is_empty() || self.image.is_empty() {
            return Vec2::ZERO;
        }
        let content_w = self.image.width as f32 * scale;
        let content_h = self.image.height as f32 * scale;
        Vec2::new(
            ((content_w - self.container.width as f32) / 2.0).max(0.0),
            ((content_h - self.container.height as f32) / 2.0).max(0.0),
        )
    }

    pub fn clamp_offset(&self, target: Vec2, scale: f32) -> Vec2 {
        let max = self.max_offset(scale);
        Vec2::new(target.x.clamp(-max.x, max.x), target.y.clamp(-max.y, max.y))
    }

    /// Content pulled fully right, so its left edge is showing.
    pub fn at_left_edge(&self, scale: f32, offset: Vec2) -> bool {
        if self.container.is_empty() || self.image.is_empty() {
            return true;
        }
        let content_w = self.image.width as f32 * scale;
        if content_w <= self.container.width as f32 + 1.0 {
            return true;
        }
        let max_x = (content_w - self.container.width as f32) / 2.0;
        offset.x >= max_x - 0.5
    }

    pub fn at_right_edge(&self, scale: f32, offset: Vec2) -> bool {
        if self.container.is_empty() || self.image.is_empty() {
            return true;
        }
        let content_w = self.image.width as f32 * scale;
        if content_w <= self.container.width as f32 + 1.0 {
            return true;
        }
        let max_x = (content_w - self.container.width as f32) / 2.0;
        offset.x <= -max_x + 0.5
    }

    /// Rendered content rectangle in container-local pixels.
    pub fn content_rect(&self, now: Instant) -> Rect {
        if self.container.is_empty() {
            return Rect::default();
        }
        if self.image.is_empty() {
            return Rect::from_size(self.container);
        }
        let scale = self.scale(now).max(self.min_scale());
        let offset = self.offset(now);
        let w = self.image.width as f32 * scale;
        let h = self.image.height as f32 * scale;
        let cx = self.container.width as f32 / 2.0 + offset.x;
        let cy = self.container.height as f32 / 2.0 + offset.y;
        Rect::new(
            (cx - w / 2.0).round() as i32,
            (cy - h / 2.0).round() as i32,
            w.round() as i32,
            h.round() as i32,
        )
    }

    /// Container measured. The first non-empty size requests the low-res layer.
    pub fn set_container(&mut self, container: Size, now: Instant) -> ZoomEffects {
        let mut effects = ZoomEffects::new();
        if container == self.container {
            return effects;
        }
        self.container = container;
        if !container.is_empty() && !self.low_res_requested {
            self.low_res_requested = true;
            effects.push(ZoomEffect::RequestLowRes { target: container });
        }
        self.refit(now);
        effects
    }

    /// Intrinsic size reported by the decoder.
    pub fn set_image_size(&mut self, image: Size, now: Instant) {
        if image.is_empty() || image == self.image {
            return;
        }
        self.image = image;
        self.refit(now);
    }

    pub fn on_high_res_loaded(&mut self, intrinsic: Size, now: Instant) {
        self.set_image_size(intrinsic, now);
        if matches!(self.high_res, HighRes::Loaded { .. }) {
            return;
        }
        let mut alpha = AnimatedValue::new(0.0);
        alpha.animate_to(1.0, self.settings.crossfade, EasingFunction::Linear, now);
        self.high_res = HighRes::Loaded { alpha };
        debug!("high-res layer loaded");
    }

    fn refit(&mut self, now: Instant) {
        if self.container.is_empty() || self.image.is_empty() {
            return;
        }
        let min = self.min_scale();
        if !self.fitted {
            self.fitted = true;
            self.scale.snap_to(min);
            self.offset_x.snap_to(0.0);
            self.offset_y.snap_to(0.0);
            return;
        }
        let current = self.scale.sample(now);
        if current < min {
            self.scale.animate_to(min, self.settings.settle, EasingFunction::EaseOut, now);
            self.offset_x.snap_to(0.0);
            self.offset_y.snap_to(0.0);
        } else if current > self.max_scale() {
            let max = self.max_scale();
            self.scale.snap_to(max);
            let clamped = self.clamp_offset(self.offset(now), max);
            self.offset_x.snap_to(clamped.x);
            self.offset_y.snap_to(clamped.y);
        } else {
            self.settle_offset(now);
        }
    }

    pub fn handle(&mut self, gesture: ZoomGesture, now: Instant) -> ZoomEffects {
        let mut effects = ZoomEffects::new();
        match gesture {
            ZoomGesture::Tap => effects.push(ZoomEffect::ToggleImmersive),
            ZoomGesture::TransformStart => self.begin_transform(now),
            ZoomGesture::Transform { centroid, pan, zoom } => {
                if !self.gesture_active {
                    self.begin_transform(now);
                }
                self.transform(centroid, pan, zoom, now, &mut effects);
            }
            ZoomGesture::TransformEnd => {
                self.gesture_active = false;
                self.settle(now);
            }
            ZoomGesture::DoubleTap { centroid } => self.double_tap(centroid, now, &mut effects),
        }
        effects
    }

    fn begin_transform(&mut self, now: Instant) {
        self.scale.stop(now);
        self.offset_x.stop(now);
        self.offset_y.stop(now);
        self.gesture_active = true;
        self.pinch_announced = false;
        self.fling_fired = false;
        self.last_pan_x = 0.0;
    }

    fn transform(&mut self, centroid: Vec2, pan: Vec2, zoom: f32, now: Instant, effects: &mut ZoomEffects) {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        if (zoom - 1.0).abs() > f32::EPSILON && !self.pinch_announced {
            self.pinch_announced = true;
            effects.push(ZoomEffect::EnterImmersive);
        }

        let old_scale = self.scale.value();
        let old_offset = Vec2::new(self.offset_x.value(), self.offset_y.value());
        let was_left = self.at_left_edge(old_scale, old_offset);
        let was_right = self.at_right_edge(old_scale, old_offset);

        let new_scale = (old_scale * zoom).clamp(self.min_scale(), self.max_scale());
        let k = if old_scale > 0.0 { new_scale / old_scale } else { 1.0 };
        let center = Vec2::new(self.container.width as f32 / 2.0, self.container.height as f32 / 2.0);
        let focal = centroid - center;
        // Keep the point under the centroid fixed while scaling, then pan.
        let raw = focal * (1.0 - k) + old_offset * k + pan;
        let clamped = self.clamp_offset(raw, new_scale);

        self.scale.snap_to(new_scale);
        self.offset_x.snap_to(clamped.x);
        self.offset_y.snap_to(clamped.y);
        self.last_pan_x = pan.x;

        let relative = self.relative_scale(now);
        if relative > 1.0 + FIT_EPSILON && !self.fling_fired {
            let dead_zone = self.settings.fling_dead_zone;
            if self.last_pan_x > dead_zone && was_left {
                self.fling_fired = true;
                debug!("edge fling to previous page");
                effects.push(ZoomEffect::RequestPageChange(-1));
            } else if self.last_pan_x < -dead_zone && was_right {
                self.fling_fired = true;
                debug!("edge fling to next page");
                effects.push(ZoomEffect::RequestPageChange(1));
            }
        }

        self.maybe_request_high_res(relative, effects);
        trace!(scale = new_scale, x = clamped.x, y = clamped.y, "transform");
    }

    fn maybe_request_high_res(&mut self, relative: f32, effects: &mut ZoomEffects) {
        if matches!(self.high_res, HighRes::NotRequested) && relative > self.settings.high_res_factor {
            self.high_res = HighRes::Requested;
            effects.push(ZoomEffect::RequestHighRes);
        }
    }

    /// Bring scale and offset back into range after a gesture.
    fn settle(&mut self, now: Instant) {
        let min = self.min_scale();
        if self.scale.value() < min {
            let d = self.settings.settle;
            self.scale.animate_to(min, d, EasingFunction::EaseOut, now);
            self.offset_x.animate_to(0.0, d, EasingFunction::EaseOut, now);
            self.offset_y.animate_to(0.0, d, EasingFunction::EaseOut, now);
        } else {
            self.settle_offset(now);
        }
    }

    fn settle_offset(&mut self, now: Instant) {
        let scale = self.scale.sample(now);
        let current = self.offset(now);
        let clamped = self.clamp_offset(current, scale);
        if clamped != current {
            let d = self.settings.settle;
            self.offset_x.animate_to(clamped.x, d, EasingFunction::EaseOut, now);
            self.offset_y.animate_to(clamped.y, d, EasingFunction::EaseOut, now);
        }
    }

    fn double_tap(&mut self, centroid: Vec2, now: Instant, effects: &mut ZoomEffects) {
        let d = self.settings.settle;
        let min = self.min_scale();
        if self.is_zoomed(now) {
            self.scale.animate_to(min, d, EasingFunction::EaseOut, now);
            self.offset_x.animate_to(0.0, d, EasingFunction::EaseOut, now);
            self.offset_y.animate_to(0.0, d, EasingFunction::EaseOut, now);
            return;
        }

        let old_scale = self.scale.sample(now);
        let target = (min * self.settings.double_tap_scale).clamp(min, self.max_scale());
        let k = if old_scale > 0.0 { target / old_scale } else { 1.0 };
        let center = Vec2::new(self.container.width as f32 / 2.0, self.container.height as f32 / 2.0);
        let raw = (centroid - center) * (1.0 - k) + self.offset(now) * k;
        let offset = self.clamp_offset(raw, target);

        self.scale.animate_to(target, d, EasingFunction::EaseOut, now);
        self.offset_x.animate_to(offset.x, d, EasingFunction::EaseOut, now);
        self.offset_y.animate_to(offset.y, d, EasingFunction::EaseOut, now);
        if min > 0.0 {
            self.maybe_request_high_res(target / min, effects);
        }
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::Idle;
        let mut merge = |o: TickOutcome| {
            outcome = match (outcome, o) {
                (TickOutcome::Running, _) | (_, TickOutcome::Running) => TickOutcome::Running,
                (TickOutcome::Finished, _) | (_, TickOutcome::Finished) => TickOutcome::Finished,
                _ => TickOutcome::Idle,
            };
        };
        merge(self.scale.tick(now));
        merge(self.offset_x.tick(now));
        merge(self.offset_y.tick(now));
        if let HighRes::Loaded { alpha } = &mut self.high_res {
            merge(alpha.tick(now));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(container: Size, image: Size) -> (ZoomPanState, Instant) {
        let t0 = Instant::now();
        let mut z = ZoomPanState::new(ZoomSettings::default());
        z.set_container(container, t0);
        z.set_image_size(image, t0);
        (z, t0)
    }

    fn pinch(z: &mut ZoomPanState, centroid: Vec2, pan: Vec2, zoom: f32, now: Instant) -> ZoomEffects {
        z.handle(ZoomGesture::Transform { centroid, pan, zoom }, now)
    }

    /// Tiny deterministic generator so the property loops stay reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }
    }

    #[test]
    fn first_measurement_requests_low_res_once() {
        let t0 = Instant::now();
        let mut z = ZoomPanState::new(ZoomSettings::default());
        let fx = z.set_container(Size::new(1080, 1920), t0);
        assert_eq!(fx.as_slice(), &[ZoomEffect::RequestLowRes { target: Size::new(1080, 1920) }]);
        assert!(z.set_container(Size::new(1920, 1080), t0).is_empty());
    }

    #[test]
    fn starts_at_fit_scale() {
        let (z, t0) = engine(Size::new(1080, 1920), Size::new(500, 500));
        assert!((z.scale(t0) - 2.16).abs() < 1e-4);
        assert_eq!(z.relative_scale(t0), 1.0);
        assert_eq!(z.content_rect(t0), Rect::new(0, 420, 1080, 1080));
        // image smaller than fit: effective maximum never drops below fit
        assert!(z.max_scale() >= z.min_scale());
    }

    #[test]
    fn scale_never_leaves_bounds() {
        let (mut z, t0) = engine(Size::new(1080, 1920), Size::new(4000, 3000));
        let mut rng = Lcg(7);
        z.handle(ZoomGesture::TransformStart, t0);
        for _ in 0..2000 {
            let zoom = 0.3 + rng.next_f32() * 2.4;
            let centroid = Vec2::new(rng.next_f32() * 1080.0, rng.next_f32() * 1920.0);
            let pan = Vec2::new(rng.next_f32() * 400.0 - 200.0, rng.next_f32() * 400.0 - 200.0);
            pinch(&mut z, centroid, pan, zoom, t0);
            let s = z.scale(t0);
            assert!(s >= z.min_scale() - 1e-6 && s <= z.max_scale() + 1e-6, "scale {s}");
            let max = z.max_offset(s);
            let o = z.offset(t0);
            assert!(o.x.abs() <= max.x + 1e-3 && o.y.abs() <= max.y + 1e-3, "offset {o:?} max {max:?}");
        }
    }

    #[test]
    fn content_always_covers_container_when_larger() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        let container = Rect::new(0, 0, 1000, 1000);
        pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::ZERO, 2.0, t0);
        for pan in [Vec2::new(5000.0, 0.0), Vec2::new(-9000.0, 3000.0), Vec2::new(10.0, -7000.0)] {
            pinch(&mut z, Vec2::new(500.0, 500.0), pan, 1.0, t0);
            assert!(z.content_rect(t0).contains_rect(&container));
        }
    }

    #[test]
    fn pinch_keeps_focal_point_stable() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        let focal = Vec2::new(750.0, 500.0);
        pinch(&mut z, focal, Vec2::ZERO, 2.0, t0);
        // The image point under (750, 500) was x=750; at 2x with the focal
        // point fixed, content center moves left by 250.
        assert!((z.offset(t0).x - -250.0).abs() < 1e-3);
    }

    #[test]
    fn pan_at_fit_is_pinned() {
        let (mut z, t0) = engine(Size::new(1080, 1920), Size::new(500, 500));
        let fx = pinch(&mut z, Vec2::new(540.0, 960.0), Vec2::new(300.0, 0.0), 1.0, t0);
        assert_eq!(z.offset(t0), Vec2::ZERO);
        assert!(fx.is_empty(), "no edge fling at fit scale");
    }

    #[test]
    fn edge_fling_fires_once_per_gesture() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        z.handle(ZoomGesture::TransformStart, t0);
        pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::ZERO, 2.0, t0);
        // Drag content fully right; the left edge becomes pinned.
        pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(600.0, 0.0), 1.0, t0);
        let fx = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(20.0, 0.0), 1.0, t0);
        assert!(fx.contains(&ZoomEffect::RequestPageChange(-1)));
        let again = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(20.0, 0.0), 1.0, t0);
        assert!(!again.contains(&ZoomEffect::RequestPageChange(-1)));
        z.handle(ZoomGesture::TransformEnd, t0);

        z.handle(ZoomGesture::TransformStart, t0);
        let small = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(5.0, 0.0), 1.0, t0);
        assert!(small.is_empty(), "within dead zone");
        pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(-2000.0, 0.0), 1.0, t0);
        let fx = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::new(-20.0, 0.0), 1.0, t0);
        assert!(fx.contains(&ZoomEffect::RequestPageChange(1)));
    }

    #[test]
    fn pinch_forces_immersive_and_requests_high_res() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        let fx = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::ZERO, 1.2, t0);
        assert_eq!(fx.as_slice(), &[ZoomEffect::EnterImmersive]);
        let fx = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::ZERO, 1.1, t0);
        assert_eq!(fx.as_slice(), &[ZoomEffect::RequestHighRes]);
        assert!(z.wants_high_res());
        let fx = pinch(&mut z, Vec2::new(500.0, 500.0), Vec2::ZERO, 1.1, t0);
        assert!(fx.is_empty());
    }

    #[test]
    fn high_res_cross_fades_in() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(500, 500));
        z.on_high_res_loaded(Size::new(500, 500), t0);
        assert_eq!(z.high_res_alpha(t0), 0.0);
        let later = t0 + Duration::from_secs(1);
        z.tick(later);
        assert_eq!(z.high_res_alpha(later), 1.0);
    }

    #[test]
    fn tap_toggles_immersive() {
        let (mut z, t0) = engine(Size::new(100, 100), Size::new(100, 100));
        assert_eq!(z.handle(ZoomGesture::Tap, t0).as_slice(), &[ZoomEffect::ToggleImmersive]);
    }

    #[test]
    fn double_tap_zooms_in_then_resets() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        z.handle(ZoomGesture::DoubleTap { centroid: Vec2::new(500.0, 500.0) }, t0);
        let t1 = t0 + Duration::from_secs(1);
        z.tick(t1);
        assert!((z.relative_scale(t1) - 2.5).abs() < 1e-4);
        z.handle(ZoomGesture::DoubleTap { centroid: Vec2::new(500.0, 500.0) }, t1);
        let t2 = t1 + Duration::from_secs(1);
        z.tick(t2);
        assert_eq!(z.relative_scale(t2), 1.0);
        assert_eq!(z.offset(t2), Vec2::ZERO);
    }

    #[test]
    fn container_growth_animates_back_to_fit() {
        let (mut z, t0) = engine(Size::new(1000, 1000), Size::new(1000, 1000));
        z.set_container(Size::new(2000, 2000), t0);
        // container grew: old scale 1.0 is now below fit 2.0
        assert!(z.is_animating());
        let t1 = t0 + Duration::from_secs(1);
        z.tick(t1);
        assert_eq!(z.scale(t1), 2.0);
    }
}
