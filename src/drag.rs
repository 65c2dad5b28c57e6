//! Drag-to-dismiss physics.
//!
//! A downward drag on the settled preview shrinks the content and fades the
//! background. Past the threshold a release commits the exit; below it the
//! offset springs back to zero.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::animation::{AnimatedValue, EasingFunction, TickOutcome};
use crate::config::PreviewConfig;
use crate::geometry::Vec2;

/// Mapping from drag distance to visual response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragPhysics {
    /// Distance (px) a release must exceed to commit the dismiss
    pub threshold_px: f32,
    pub exponent: f32,
    pub alpha_factor: f32,
    pub max_shrink: f32,
}

impl Default for DragPhysics {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default(), 1.0)
    }
}

impl DragPhysics {
    /// `density` converts the configured dp threshold to pixels.
    pub fn from_config(config: &PreviewConfig, density: f32) -> Self {
        Self {
            threshold_px: config.dismiss_threshold_dp * density.max(0.1),
            exponent: config.drag_easing_exponent.max(1.0),
            alpha_factor: config.drag_alpha_factor.clamp(0.0, 1.0),
            max_shrink: config.drag_max_shrink.clamp(0.0, 1.0),
        }
    }

    pub fn fraction(&self, distance: f32) -> f32 {
        if self.threshold_px <= 0.0 {
            return if distance.abs() > 0.0 { 1.0 } else { 0.0 };
        }
        (distance.abs() / self.threshold_px).clamp(0.0, 1.0)
    }

    pub fn eased(&self, distance: f32) -> f32 {
        self.fraction(distance).powf(self.exponent)
    }

    /// Multiplier for the background alpha.
    pub fn background_alpha(&self, distance: f32) -> f32 {
        1.0 - self.alpha_factor * self.eased(distance)
    }

    pub fn content_scale(&self, distance: f32) -> f32 {
        1.0 - self.max_shrink * self.eased(distance)
    }

    /// Strictly greater: a drag of exactly the threshold springs back.
    pub fn exceeds_threshold(&self, distance: f32) -> bool {
        distance > self.threshold_px
    }
}

/// `|dy| >= |dx|`
pub fn is_vertically_dominant(delta: Vec2) -> bool {
    delta.y.abs() >= delta.x.abs()
}

/// What feeding one drag delta did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragStep {
    /// The delta moved the dismiss offset; other handlers should not see it.
    pub consumed: bool,
    /// Source cell blanking switched to this value.
    pub blank_changed: Option<bool>,
}

/// How a released drag resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragRelease {
    /// Offset is past the threshold; the exit starts from this offset.
    Commit { offset: f32 },
    /// Below threshold; the offset is animating back to zero.
    SpringBack { unblank: bool },
    /// No drag was in progress.
    Idle,
}

/// Live state of one vertical dismiss drag.
#[derive(Debug, Clone)]
pub struct DismissDrag {
    physics: DragPhysics,
    spring_back: Duration,
    down: AnimatedValue,
    /// Upward pull, tracked but without visual effect.
    up: f32,
    active: bool,
    blanked: bool,
}

impl DismissDrag {
    pub fn new(physics: DragPhysics, spring_back: Duration) -> Self {
        Self {
            physics,
            spring_back,
            down: AnimatedValue::new(0.0),
            up: 0.0,
            active: false,
            blanked: false,
        }
    }

    pub fn physics(&self) -> &DragPhysics {
        &self.physics
    }

    pub fn set_physics(&mut self, physics: DragPhysics) {
        self.physics = physics;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    pub fn is_springing_back(&self) -> bool {
        self.down.is_running()
    }

    /// Downward offset at `now`, including an in-flight spring-back.
    pub fn offset(&self, now: Instant) -> f32 {
        self.down.sample(now)
    }

    pub fn upward_pull(&self) -> f32 {
        self.up
    }

    /// Start tracking. A spring-back still in flight is caught where it is.
    pub fn begin(&mut self, now: Instant) {
        self.down.stop(now);
        self.up = 0.0;
        self.active = true;
    }

    pub fn update(&mut self, delta: Vec2, now: Instant) -> DragStep {
        if !self.active || !is_vertically_dominant(delta) {
            return DragStep::default();
        }

        let before = self.down.sample(now);
        if before <= 0.0 && delta.y <= 0.0 {
            self.up += -delta.y;
            return DragStep::default();
        }

        let next = before + delta.y;
        if next < 0.0 {
            self.up += -next;
        }
        self.down.snap_to(next.max(0.0));

        let mut step = DragStep {
            consumed: true,
            blank_changed: None,
        };
        if self.down.value() > 0.0 && !self.blanked {
            self.blanked = true;
            step.blank_changed = Some(true);
        }
        step
    }

    pub fn release(&mut self, now: Instant) -> DragRelease {
        if !self.active {
            return DragRelease::Idle;
        }
        self.active = false;
        self.up = 0.0;

        let offset = self.down.sample(now);
        if self.physics.exceeds_threshold(offset) {
            debug!(offset, threshold = self.physics.threshold_px, "dismiss drag committed");
            return DragRelease::Commit { offset };
        }

        debug!(offset, "dismiss drag springing back");
        self.down
            .animate_to(0.0, self.spring_back, EasingFunction::EaseOut, now);
        let unblank = std::mem::replace(&mut self.blanked, false);
        DragRelease::SpringBack { unblank }
    }

    /// Drop the drag without resolving it.
    pub fn cancel(&mut self, now: Instant) -> DragRelease {
        if !self.active {
            return DragRelease::Idle;
        }
        self.active = false;
        self.up = 0.0;
        self.down
            .animate_to(0.0, self.spring_back, EasingFunction::EaseOut, now);
        let unblank = std::mem::replace(&mut self.blanked, false);
        DragRelease::SpringBack { unblank }
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.down.tick(now)
    }

    pub fn reset(&mut self) {
        self.down.snap_to(0.0);
        self.up = 0.0;
        self.active = false;
        self.blanked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics() -> DragPhysics {
        DragPhysics {
            threshold_px: 32.0,
            exponent: 3.0,
            alpha_factor: 0.6,
            max_shrink: 0.3,
        }
    }

    #[test]
    fn eased_is_monotonic_with_fixed_endpoints() {
        for exponent in [1.0, 1.5, 3.0, 7.0] {
            let p = DragPhysics { exponent, ..physics() };
            assert_eq!(p.eased(0.0), 0.0);
            assert_eq!(p.eased(32.0), 1.0);
            let mut last = 0.0;
            for i in 0..=64 {
                let v = p.eased(i as f32);
                assert!(v >= last, "exponent {exponent} at {i}");
                last = v;
            }
        }
    }

    #[test]
    fn visual_response_at_full_drag() {
        let p = physics();
        assert!((p.background_alpha(40.0) - 0.4).abs() < 1e-6);
        assert!((p.content_scale(40.0) - 0.7).abs() < 1e-6);
        assert_eq!(p.background_alpha(0.0), 1.0);
        assert_eq!(p.content_scale(0.0), 1.0);
    }

    #[test]
    fn threshold_is_strict() {
        let p = physics();
        assert!(!p.exceeds_threshold(31.0));
        assert!(!p.exceeds_threshold(32.0));
        assert!(p.exceeds_threshold(33.0));
    }

    #[test]
    fn fraction_matches_partial_drag() {
        assert!((physics().fraction(20.0) - 0.625).abs() < 1e-6);
    }

    #[test]
    fn density_scales_threshold() {
        let p = DragPhysics::from_config(&PreviewConfig::default(), 2.5);
        assert_eq!(p.threshold_px, 80.0);
    }

    #[test]
    fn downward_drag_consumes_and_blanks_once() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(220));
        drag.begin(t0);
        let first = drag.update(Vec2::new(0.0, 10.0), t0);
        assert!(first.consumed);
        assert_eq!(first.blank_changed, Some(true));
        let second = drag.update(Vec2::new(1.0, 10.0), t0);
        assert!(second.consumed);
        assert_eq!(second.blank_changed, None);
        assert_eq!(drag.offset(t0), 20.0);
    }

    #[test]
    fn horizontal_and_upward_drags_pass_through() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(220));
        drag.begin(t0);
        assert!(!drag.update(Vec2::new(30.0, 5.0), t0).consumed);
        let up = drag.update(Vec2::new(0.0, -12.0), t0);
        assert!(!up.consumed);
        assert_eq!(drag.upward_pull(), 12.0);
        assert_eq!(drag.offset(t0), 0.0);
        assert!(!drag.is_blanked());
    }

    #[test]
    fn overshooting_back_up_clamps_down_offset_at_zero() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(220));
        drag.begin(t0);
        drag.update(Vec2::new(0.0, 10.0), t0);
        let step = drag.update(Vec2::new(0.0, -15.0), t0);
        assert!(step.consumed);
        assert_eq!(drag.offset(t0), 0.0);
        assert_eq!(drag.upward_pull(), 5.0);
    }

    #[test]
    fn release_below_threshold_springs_back_and_unblanks() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(220));
        drag.begin(t0);
        drag.update(Vec2::new(0.0, 20.0), t0);
        assert_eq!(drag.release(t0), DragRelease::SpringBack { unblank: true });
        assert!(drag.is_springing_back());
        assert_eq!(drag.tick(t0 + Duration::from_millis(300)), TickOutcome::Finished);
        assert_eq!(drag.offset(t0 + Duration::from_millis(300)), 0.0);
    }

    #[test]
    fn release_past_threshold_commits_with_offset() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(220));
        drag.begin(t0);
        drag.update(Vec2::new(0.0, 40.0), t0);
        assert_eq!(drag.release(t0), DragRelease::Commit { offset: 40.0 });
        assert!(drag.is_blanked());
    }

    #[test]
    fn new_drag_catches_spring_back_mid_flight() {
        let t0 = Instant::now();
        let mut drag = DismissDrag::new(physics(), Duration::from_millis(200));
        drag.begin(t0);
        drag.update(Vec2::new(0.0, 30.0), t0);
        drag.release(t0);
        let mid = t0 + Duration::from_millis(50);
        let caught = drag.offset(mid);
        assert!(caught > 0.0 && caught < 30.0);
        drag.begin(mid);
        assert!(!drag.is_springing_back());
        assert_eq!(drag.offset(mid + Duration::from_millis(500)), caught);
    }
}
