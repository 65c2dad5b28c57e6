//! Animation system module
//!
//! Handles the time-based pieces of the preview:
//! - Shared-bounds entry/exit progress
//! - Drag spring-back and zoom settle
//! - Chrome fade and high-res cross-fade
//! - Carousel phase timers
//!
//! Nothing in here reads the clock. Every call takes `now`, so the host
//! decides what time it is and tests can step time explicitly.

use std::time::{Duration, Instant};

/// Easing function type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EasingFunction {
    /// Linear interpolation
    Linear,
    /// Smooth ease-out (deceleration)
    EaseOut,
    /// Smooth ease-in-out
    EaseInOut,
    /// Material-style standard curve, used for the shared-bounds morph
    FastOutSlowIn,
    /// Overshoot then settle
    EaseOutBack,
}

impl EasingFunction {
    /// Apply the easing function to a value t in [0, 1]
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            EasingFunction::Linear => t,

            EasingFunction::EaseOut => {
                // Cubic ease-out: 1 - (1 - t)^3
                1.0 - (1.0 - t).powi(3)
            }

            EasingFunction::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }

            EasingFunction::FastOutSlowIn => cubic_bezier(0.4, 0.0, 0.2, 1.0, t),

            EasingFunction::EaseOutBack => {
                let c1 = 1.70158;
                let c3 = c1 + 1.0;
                1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
            }
        }
    }
}

/// Evaluate a CSS-style cubic bezier easing curve at `x`.
fn cubic_bezier(x1: f32, y1: f32, x2: f32, y2: f32, x: f32) -> f32 {
    if x <= 0.0 || x >= 1.0 {
        return x;
    }
    let bez = |a: f32, b: f32, s: f32| {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * a + 3.0 * inv * s * s * b + s * s * s
    };
    // Bisection on the x curve; monotonic for valid control points.
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    let mut s = x;
    for _ in 0..24 {
        let bx = bez(x1, x2, s);
        if (bx - x).abs() < 1e-5 {
            break;
        }
        if bx < x {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) * 0.5;
    }
    bez(y1, y2, s)
}

/// A single animation instance
#[derive(Debug, Clone)]
pub struct Animation {
    /// Start value
    pub start: f32,
    /// End value
    pub end: f32,
    /// Animation duration
    pub duration: Duration,
    /// When the animation started
    pub start_time: Instant,
    /// Easing function to use
    pub easing: EasingFunction,
}

impl Animation {
    pub fn new(start: f32, end: f32, duration: Duration, easing: EasingFunction, now: Instant) -> Self {
        Self {
            start,
            end,
            duration,
            start_time: now,
            easing,
        }
    }

    /// Linear progress through the duration, in [0, 1].
    pub fn fraction_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Get the animated value at `now`
    pub fn value_at(&self, now: Instant) -> f32 {
        let t = self.fraction_at(now);
        if t >= 1.0 {
            return self.end;
        }
        self.start + (self.end - self.start) * self.easing.apply(t)
    }

    pub fn is_complete_at(&self, now: Instant) -> bool {
        self.fraction_at(now) >= 1.0
    }

    /// Update the animation target, continuing from the current value
    pub fn retarget(&mut self, now: Instant, new_end: f32, new_duration: Duration) {
        self.start = self.value_at(now);
        self.end = new_end;
        self.duration = new_duration;
        self.start_time = now;
    }
}

/// Result of advancing an [`AnimatedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was running.
    Idle,
    /// Still moving; the host should schedule another frame.
    Running,
    /// Reached its target during this tick.
    Finished,
}

/// A property that rests at a value or animates towards one.
///
/// Starting a new animation supersedes any in-flight one, picking up from
/// the currently sampled value so there is no visual jump.
#[derive(Debug, Clone)]
pub struct AnimatedValue {
    current: f32,
    animation: Option<Animation>,
}

impl AnimatedValue {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            animation: None,
        }
    }

    /// Value at `now` without committing it.
    pub fn sample(&self, now: Instant) -> f32 {
        match &self.animation {
            Some(anim) => anim.value_at(now),
            None => self.current,
        }
    }

    /// Last committed value.
    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.animation.as_ref().map_or(self.current, |a| a.end)
    }

    pub fn is_running(&self) -> bool {
        self.animation.is_some()
    }

    pub fn animate_to(&mut self, target: f32, duration: Duration, easing: EasingFunction, now: Instant) {
        let from = self.sample(now);
        if duration.is_zero() || (from - target).abs() < f32::EPSILON {
            self.snap_to(target);
            return;
        }
        self.current = from;
        self.animation = Some(Animation::new(from, target, duration, easing, now));
    }

    /// Jump to a value, cancelling any animation.
    pub fn snap_to(&mut self, value: f32) {
        self.current = value;
        self.animation = None;
    }

    /// Freeze at the sampled value, cancelling any animation.
    pub fn stop(&mut self, now: Instant) {
        let v = self.sample(now);
        self.snap_to(v);
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let Some(anim) = &self.animation else {
            return TickOutcome::Idle;
        };
        self.current = anim.value_at(now);
        if anim.is_complete_at(now) {
            self.current = anim.end;
            self.animation = None;
            TickOutcome::Finished
        } else {
            TickOutcome::Running
        }
    }
}

/// Point in time a bounded wait gives up at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(now: Instant, wait: Duration) -> Self {
        Self(now + wait)
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.0
    }

    pub fn at(&self) -> Instant {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn easings_hit_endpoints() {
        for e in [
            EasingFunction::Linear,
            EasingFunction::EaseOut,
            EasingFunction::EaseInOut,
            EasingFunction::FastOutSlowIn,
            EasingFunction::EaseOutBack,
        ] {
            assert!((e.apply(0.0)).abs() < 1e-4, "{e:?}");
            assert!((e.apply(1.0) - 1.0).abs() < 1e-4, "{e:?}");
        }
    }

    #[test]
    fn fast_out_slow_in_is_monotonic() {
        let mut last = 0.0;
        for i in 0..=100 {
            let v = EasingFunction::FastOutSlowIn.apply(i as f32 / 100.0);
            assert!(v + 1e-4 >= last);
            last = v;
        }
    }

    #[test]
    fn animation_value_follows_time() {
        let t0 = Instant::now();
        let a = Animation::new(0.0, 10.0, ms(100), EasingFunction::Linear, t0);
        assert_eq!(a.value_at(t0), 0.0);
        assert!((a.value_at(t0 + ms(50)) - 5.0).abs() < 1e-3);
        assert_eq!(a.value_at(t0 + ms(100)), 10.0);
        assert!(a.is_complete_at(t0 + ms(150)));
    }

    #[test]
    fn animate_to_supersedes_in_flight_animation() {
        let t0 = Instant::now();
        let mut v = AnimatedValue::new(100.0);
        v.animate_to(0.0, ms(100), EasingFunction::Linear, t0);
        assert_eq!(v.tick(t0 + ms(50)), TickOutcome::Running);
        assert!((v.value() - 50.0).abs() < 1e-3);

        // New request starts from the sampled value, not from the old start.
        v.animate_to(80.0, ms(100), EasingFunction::Linear, t0 + ms(50));
        assert!((v.sample(t0 + ms(50)) - 50.0).abs() < 1e-3);
        assert_eq!(v.tick(t0 + ms(150)), TickOutcome::Finished);
        assert_eq!(v.value(), 80.0);
        assert_eq!(v.tick(t0 + ms(200)), TickOutcome::Idle);
    }

    #[test]
    fn zero_duration_snaps() {
        let t0 = Instant::now();
        let mut v = AnimatedValue::new(1.0);
        v.animate_to(0.0, Duration::ZERO, EasingFunction::EaseOut, t0);
        assert!(!v.is_running());
        assert_eq!(v.value(), 0.0);
    }

    #[test]
    fn deadline_expires() {
        let t0 = Instant::now();
        let d = Deadline::after(t0, ms(250));
        assert!(!d.expired(t0 + ms(249)));
        assert!(d.expired(t0 + ms(250)));
    }
}
