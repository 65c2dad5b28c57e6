//! Center-snapping thumbnail strip kept in step with the pager.
//!
//! When the pager moves, the old focused thumbnail shrinks while the strip
//! scrolls to the new one, and only after the scroll settles does the new
//! thumbnail grow. While the strip is driving its own scroll it never
//! reports a centered-index change, so pager and strip cannot chase each
//! other.

use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::animation::{AnimatedValue, Animation, EasingFunction, TickOutcome};
use crate::config::CarouselConfig;

/// Pixel layout of the strip. Emphasis `0` is a plain thumbnail, `1` the
/// focused one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarouselLayout {
    pub item_height: f32,
    pub item_width: f32,
    pub spacing: f32,
    pub focused_width: f32,
    pub focused_gutter: f32,
    pub viewport_width: f32,
}

/// Horizontal placement of one item in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemExtent {
    pub start: f32,
    pub width: f32,
}

impl ItemExtent {
    pub fn center(&self) -> f32 {
        self.start + self.width / 2.0
    }

    pub fn end(&self) -> f32 {
        self.start + self.width
    }
}

impl CarouselLayout {
    pub fn from_config(config: &CarouselConfig, density: f32) -> Self {
        let density = density.max(0.1);
        let item_height = (config.item_height * density).round();
        let item_width = (item_height / config.height_width_aspect).floor();
        let spacing = config.base_spacing * density;
        Self {
            item_height,
            item_width,
            spacing,
            focused_width: item_width * config.center_width_scale,
            focused_gutter: spacing * config.center_gutter_scale,
            viewport_width: 0.0,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.viewport_width > 0.0
    }

    /// Padding that lets the first and last items reach the viewport center.
    pub fn side_padding(&self) -> f32 {
        (self.viewport_width / 2.0 - self.focused_width / 2.0).max(0.0)
    }

    /// Visible width of a thumbnail at `emphasis`.
    pub fn thumb_width(&self, emphasis: f32) -> f32 {
        let e = emphasis.clamp(0.0, 1.0);
        self.item_width + (self.focused_width - self.item_width) * e
    }

    /// Thumbnail plus its gutters on both sides.
    pub fn outer_width(&self, emphasis: f32) -> f32 {
        let e = emphasis.clamp(0.0, 1.0);
        let gutter = self.spacing + (self.focused_gutter - self.spacing) * e;
        self.thumb_width(e) + gutter * 2.0
    }

    fn stride(&self) -> f32 {
        self.outer_width(0.0) + self.spacing
    }

    pub fn item_extents(&self, count: usize, emphasis: impl Fn(usize) -> f32) -> Vec<ItemExtent> {
        let mut extents = Vec::with_capacity(count);
        let mut x = self.side_padding();
        for i in 0..count {
            let width = self.outer_width(emphasis(i));
            extents.push(ItemExtent { start: x, width });
            x += width + self.spacing;
        }
        extents
    }

    /// Scroll offset centering `index` when every item is at base size.
    pub fn resting_scroll_for(&self, index: usize) -> f32 {
        self.side_padding() + index as f32 * self.stride() + self.outer_width(0.0) / 2.0
            - self.viewport_width / 2.0
    }
}

/// Among items overlapping the viewport, the one whose center is nearest
/// the viewport center. Ties go to the lower index.
pub fn center_item_index(extents: &[ItemExtent], scroll: f32, viewport_width: f32) -> Option<usize> {
    let center = scroll + viewport_width / 2.0;
    let mut best: Option<(usize, f32)> = None;
    for (i, e) in extents.iter().enumerate() {
        if e.end() < scroll || e.start > scroll + viewport_width {
            continue;
        }
        let d = (e.center() - center).abs();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CarouselEvent {
    ViewportMeasured { width: f32 },
    /// The pager's current index changed.
    SelectedIndexChanged(usize),
    DragStart,
    /// Finger moved by `dx` pixels; content follows the finger.
    DragBy(f32),
    DragEnd,
    ItemTapped(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselEffect {
    /// The user scrolled the strip onto a different item.
    CenteredIndexChanged(usize),
    /// A thumbnail was tapped; the pager should go there.
    ItemClicked(usize),
}

pub type CarouselEffects = SmallVec<[CarouselEffect; 1]>;

/// Snapshot of which thumbnails are emphasized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarouselFocus {
    pub centered: Option<usize>,
    pub expanded: Option<usize>,
    pub shrinking: Option<usize>,
    pub expanding: Option<usize>,
}

/// A visible thumbnail, positioned relative to the viewport's left edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarouselItem {
    pub index: usize,
    pub x: f32,
    pub outer_width: f32,
    pub thumb_width: f32,
    pub emphasis: f32,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    /// Programmatic scroll towards `target` in flight.
    Scrolling { target: usize },
    /// Scroll settled; `index` is growing.
    Expanding { index: usize, grow: Animation },
}

#[derive(Debug, Clone)]
struct Shrink {
    index: usize,
    anim: Animation,
}

pub struct ThumbnailCarousel {
    layout: CarouselLayout,
    count: usize,
    selected: usize,
    duration: Duration,
    scroll: AnimatedValue,
    phase: Phase,
    expanded: Option<usize>,
    shrinking: Option<Shrink>,
    /// The strip is scrolling itself; center changes are not reported.
    programmatic: bool,
    /// First placement onto the initial index done.
    initialized: bool,
    dragging: bool,
    /// Post-drag snap animation in flight.
    user_snap: bool,
    /// Scroll follows the emphasized item; cleared when the user takes over.
    anchored: bool,
    pending: Option<usize>,
}

impl ThumbnailCarousel {
    pub fn new(config: &CarouselConfig, density: f32, count: usize, selected: usize) -> Self {
        let selected = clamp_index(selected, count);
        Self {
            layout: CarouselLayout::from_config(config, density),
            count,
            selected,
            duration: config.animation(),
            scroll: AnimatedValue::new(0.0),
            phase: Phase::Idle,
            expanded: (count > 0).then_some(selected),
            shrinking: None,
            programmatic: false,
            initialized: false,
            dragging: false,
            user_snap: false,
            anchored: false,
            pending: None,
        }
    }

    pub fn layout(&self) -> &CarouselLayout {
        &self.layout
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn is_programmatic(&self) -> bool {
        self.programmatic
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_scrolling(&self) -> bool {
        self.dragging || self.scroll.is_running()
    }

    pub fn is_animating(&self) -> bool {
        self.scroll.is_running() || self.shrinking.is_some() || !matches!(self.phase, Phase::Idle)
    }

    pub fn scroll_offset(&self, now: Instant) -> f32 {
        self.scroll.sample(now)
    }

    pub fn emphasis(&self, index: usize, now: Instant) -> f32 {
        if let Phase::Expanding { index: i, grow } = &self.phase {
            if *i == index {
                return grow.value_at(now);
            }
        }
        if self.expanded == Some(index) {
            return 1.0;
        }
        match &self.shrinking {
            Some(s) if s.index == index => s.anim.value_at(now),
            _ => 0.0,
        }
    }

    fn extents(&self, now: Instant) -> Vec<ItemExtent> {
        self.layout.item_extents(self.count, |i| self.emphasis(i, now))
    }

    pub fn centered_index(&self, now: Instant) -> Option<usize> {
        if !self.layout.is_measured() {
            return None;
        }
        center_item_index(&self.extents(now), self.scroll.sample(now), self.layout.viewport_width)
    }

    pub fn focus(&self, now: Instant) -> CarouselFocus {
        CarouselFocus {
            centered: self.centered_index(now),
            expanded: self.expanded,
            shrinking: self.shrinking.as_ref().map(|s| s.index),
            expanding: match &self.phase {
                Phase::Expanding { index, .. } => Some(*index),
                _ => None,
            },
        }
    }

    /// Thumbnails overlapping the viewport, ready to draw.
    pub fn visible_items(&self, now: Instant) -> Vec<CarouselItem> {
        let scroll = self.scroll.sample(now);
        let vw = self.layout.viewport_width;
        self.extents(now)
            .into_iter()
            .enumerate()
            .filter(|(_, e)| e.end() >= scroll && e.start <= scroll + vw)
            .map(|(index, e)| {
                let emphasis = self.emphasis(index, now);
                CarouselItem {
                    index,
                    x: e.start - scroll,
                    outer_width: e.width,
                    thumb_width: self.layout.thumb_width(emphasis),
                    emphasis,
                }
            })
            .collect()
    }

    pub fn handle(&mut self, event: CarouselEvent, now: Instant) -> CarouselEffects {
        let mut effects = CarouselEffects::new();
        match event {
            CarouselEvent::ViewportMeasured { width } => {
                if (width - self.layout.viewport_width).abs() > f32::EPSILON {
                    self.layout.viewport_width = width.max(0.0);
                    if !self.initialized || self.pending.is_some() {
                        let target = self.pending.take().unwrap_or(self.selected);
                        self.start_sequence(target, now);
                    } else {
                        self.anchor(now);
                    }
                }
            }
            CarouselEvent::SelectedIndexChanged(index) => {
                let index = clamp_index(index, self.count);
                self.selected = index;
                self.start_sequence(index, now);
            }
            CarouselEvent::DragStart => {
                self.scroll.stop(now);
                self.dragging = true;
                self.user_snap = false;
                self.anchored = false;
            }
            CarouselEvent::DragBy(dx) => {
                if self.dragging {
                    let (lo, hi) = self.scroll_bounds();
                    let next = (self.scroll.value() - dx).clamp(lo, hi);
                    self.scroll.snap_to(next);
                }
            }
            CarouselEvent::DragEnd => {
                if self.dragging {
                    self.dragging = false;
                    self.snap_to_center(now, &mut effects);
                }
            }
            CarouselEvent::ItemTapped(index) => {
                if index < self.count {
                    effects.push(CarouselEffect::ItemClicked(index));
                }
            }
        }
        effects
    }

    /// Advance phase timers and scroll animations.
    pub fn tick(&mut self, now: Instant) -> CarouselEffects {
        let mut effects = CarouselEffects::new();

        if self.shrinking.as_ref().is_some_and(|s| s.anim.is_complete_at(now)) {
            self.shrinking = None;
        }

        let scroll_outcome = self.scroll.tick(now);
        match &self.phase {
            Phase::Scrolling { target } => {
                if scroll_outcome != TickOutcome::Running {
                    let target = *target;
                    trace!(target, "carousel scroll settled");
                    self.begin_expand(target, now);
                }
            }
            Phase::Expanding { index, grow } => {
                if grow.is_complete_at(now) {
                    self.expanded = Some(*index);
                    self.phase = Phase::Idle;
                    self.finish_sequence(now);
                }
            }
            Phase::Idle => {}
        }

        if self.user_snap && scroll_outcome != TickOutcome::Running {
            self.user_snap = false;
            self.settle_user_scroll(now, &mut effects);
        }

        if !self.dragging && !self.user_snap && !self.scroll.is_running() {
            self.anchor(now);
        }
        effects
    }

    fn start_sequence(&mut self, target: usize, now: Instant) {
        if self.count == 0 || !self.layout.is_measured() || self.dragging || self.user_snap {
            self.pending = Some(target);
            return;
        }
        self.pending = None;
        self.programmatic = true;
        self.anchored = true;

        // A newer request supersedes whatever was in flight.
        if let Phase::Expanding { index, .. } = self.phase {
            if index != target {
                self.start_shrink(index, now);
            }
        }
        self.phase = Phase::Idle;
        self.scroll.stop(now);

        let centered = self.centered_index(now);

        if let Some(old) = self.expanded {
            if old != target {
                self.start_shrink(old, now);
                self.expanded = None;
            }
        }

        if !self.initialized {
            self.scroll.snap_to(self.layout.resting_scroll_for(target));
            self.begin_expand(target, now);
            return;
        }

        if centered != Some(target) {
            debug!(from = ?centered, to = target, "carousel scrolling to selection");
            let dest = self.layout.resting_scroll_for(target);
            self.scroll.animate_to(dest, self.duration, EasingFunction::EaseInOut, now);
            self.phase = Phase::Scrolling { target };
            if !self.scroll.is_running() {
                self.begin_expand(target, now);
            }
        } else {
            self.begin_expand(target, now);
        }
    }

    fn start_shrink(&mut self, index: usize, now: Instant) {
        let from = self.emphasis(index, now);
        self.shrinking = Some(Shrink {
            index,
            anim: Animation::new(from, 0.0, self.duration, EasingFunction::Linear, now),
        });
    }

    fn begin_expand(&mut self, index: usize, now: Instant) {
        if self.expanded == Some(index) {
            self.phase = Phase::Idle;
            self.finish_sequence(now);
            return;
        }
        if self.shrinking.as_ref().is_some_and(|s| s.index == index) {
            self.shrinking = None;
        }
        self.phase = Phase::Expanding {
            index,
            grow: Animation::new(0.0, 1.0, self.duration, EasingFunction::Linear, now),
        };
        if self.duration.is_zero() {
            self.expanded = Some(index);
            self.phase = Phase::Idle;
            self.finish_sequence(now);
        }
    }

    fn finish_sequence(&mut self, now: Instant) {
        self.programmatic = false;
        self.initialized = true;
        match self.pending.take() {
            Some(pending) if self.expanded != Some(pending) => self.start_sequence(pending, now),
            _ => self.anchor(now),
        }
    }

    fn snap_to_center(&mut self, now: Instant, effects: &mut CarouselEffects) {
        if let Some(index) = self.centered_index(now) {
            let extents = self.extents(now);
            let dest = extents[index].center() - self.layout.viewport_width / 2.0;
            self.scroll.animate_to(dest, self.duration, EasingFunction::EaseOut, now);
        }
        if self.scroll.is_running() {
            self.user_snap = true;
        } else {
            self.settle_user_scroll(now, effects);
        }
    }

    /// The pager moved while the user held the strip: follow the pager.
    /// Otherwise report where the user left the strip.
    fn settle_user_scroll(&mut self, now: Instant, effects: &mut CarouselEffects) {
        match self.pending.take() {
            Some(pending) => self.start_sequence(pending, now),
            None => self.report_center(now, effects),
        }
    }

    fn report_center(&self, now: Instant, effects: &mut CarouselEffects) {
        if self.programmatic || !self.initialized {
            return;
        }
        if let Some(centered) = self.centered_index(now) {
            if centered != self.selected {
                debug!(centered, "carousel centered index changed by user");
                effects.push(CarouselEffect::CenteredIndexChanged(centered));
            }
        }
    }

    /// Keep the emphasized item centered while widths animate.
    fn anchor(&mut self, now: Instant) {
        if !self.anchored || !self.initialized || !self.layout.is_measured() || self.count == 0 {
            return;
        }
        let index = match &self.phase {
            Phase::Expanding { index, .. } => *index,
            Phase::Scrolling { .. } => return,
            Phase::Idle => self.expanded.unwrap_or(self.selected),
        };
        let extents = self.extents(now);
        let dest = extents[index].center() - self.layout.viewport_width / 2.0;
        if (dest - self.scroll.value()).abs() > 0.01 {
            self.scroll.snap_to(dest);
        }
    }

    fn scroll_bounds(&self) -> (f32, f32) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        (
            self.layout.resting_scroll_for(0),
            self.layout.resting_scroll_for(self.count - 1),
        )
    }
}

fn clamp_index(index: usize, count: usize) -> usize {
    index.min(count.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn measured(count: usize, selected: usize, t0: Instant) -> ThumbnailCarousel {
        let mut c = ThumbnailCarousel::new(&CarouselConfig::default(), 1.0, count, selected);
        c.handle(CarouselEvent::ViewportMeasured { width: 400.0 }, t0);
        c
    }

    #[test]
    fn layout_matches_config() {
        let l = CarouselLayout::from_config(&CarouselConfig::default(), 2.0);
        assert_eq!(l.item_height, 72.0);
        assert_eq!(l.item_width, 45.0);
        assert_eq!(l.spacing, 3.0);
        assert!((l.focused_width - 72.0).abs() < 1e-4);
        assert!((l.focused_gutter - 9.0).abs() < 1e-4);
    }

    #[test]
    fn side_padding_lets_edges_reach_center() {
        let mut l = CarouselLayout::from_config(&CarouselConfig::default(), 1.0);
        l.viewport_width = 400.0;
        assert_eq!(l.side_padding(), 200.0 - l.focused_width / 2.0);
        let extents = l.item_extents(5, |_| 0.0);
        for index in [0, 4] {
            let on_screen = extents[index].center() - l.resting_scroll_for(index);
            assert!((on_screen - 200.0).abs() < 1e-3, "item {index} at {on_screen}");
        }
    }

    #[test]
    fn center_ties_go_to_lower_index() {
        let extents = [
            ItemExtent { start: 0.0, width: 10.0 },
            ItemExtent { start: 20.0, width: 10.0 },
        ];
        // viewport center at 15: both centers are 10 away
        assert_eq!(center_item_index(&extents, 0.0, 30.0), Some(0));
        assert_eq!(center_item_index(&[], 0.0, 30.0), None);
    }

    #[test]
    fn initial_placement_is_immediate() {
        let t0 = Instant::now();
        let c = measured(10, 7, t0);
        assert!(c.is_initialized());
        assert!(!c.is_programmatic());
        let focus = c.focus(t0);
        assert_eq!(focus.centered, Some(7));
        assert_eq!(focus.expanded, Some(7));
    }

    #[test]
    fn requests_before_measurement_are_replayed() {
        let t0 = Instant::now();
        let mut c = ThumbnailCarousel::new(&CarouselConfig::default(), 1.0, 10, 0);
        c.handle(CarouselEvent::SelectedIndexChanged(4), t0);
        assert!(!c.is_initialized());
        c.handle(CarouselEvent::ViewportMeasured { width: 400.0 }, t0);
        let t1 = t0 + ms(300);
        c.tick(t1);
        assert_eq!(c.focus(t1).centered, Some(4));
        assert_eq!(c.focus(t1).expanded, Some(4));
    }

    #[test]
    fn staged_shrink_scroll_expand() {
        let t0 = Instant::now();
        let mut c = measured(10, 2, t0);
        c.handle(CarouselEvent::SelectedIndexChanged(5), t0);

        let f = c.focus(t0);
        assert_eq!(f.shrinking, Some(2));
        assert_eq!(f.expanded, None);
        assert_eq!(f.expanding, None);
        assert!(c.is_scrolling());
        assert!(c.is_programmatic());

        let t1 = t0 + ms(100);
        c.tick(t1);
        assert_eq!(c.focus(t1).expanding, None, "no growth before the scroll settles");

        let t2 = t0 + ms(250);
        c.tick(t2);
        let f = c.focus(t2);
        assert_eq!(f.expanding, Some(5));
        assert_eq!(f.shrinking, None);
        assert_eq!(f.expanded, None);

        let t3 = t2 + ms(250);
        c.tick(t3);
        let f = c.focus(t3);
        assert_eq!(f.expanded, Some(5));
        assert_eq!(f.expanding, None);
        assert_eq!(f.centered, Some(5));
        assert!(!c.is_programmatic());
    }

    #[test]
    fn selection_already_centered_skips_scroll() {
        let t0 = Instant::now();
        let mut c = measured(10, 3, t0);
        // user dragged the strip onto 4 and the pager followed
        c.handle(CarouselEvent::DragStart, t0);
        c.handle(CarouselEvent::DragBy(-c.layout().stride()), t0);
        c.handle(CarouselEvent::DragEnd, t0);
        let t1 = t0 + ms(300);
        let fx = c.tick(t1);
        assert_eq!(fx.as_slice(), &[CarouselEffect::CenteredIndexChanged(4)]);

        c.handle(CarouselEvent::SelectedIndexChanged(4), t1);
        assert!(!c.is_scrolling());
        assert_eq!(c.focus(t1).expanding, Some(4));
        assert_eq!(c.focus(t1).shrinking, Some(3));
    }

    #[test]
    fn programmatic_scrolls_never_report_their_targets() {
        let t0 = Instant::now();
        let mut c = measured(30, 0, t0);
        let targets = [4usize, 9, 2, 17, 3, 29, 0, 12];
        let mut now = t0;
        for (step, target) in targets.iter().enumerate() {
            c.handle(CarouselEvent::SelectedIndexChanged(*target), now);
            // interrupt half of them mid-flight
            let budget = if step % 2 == 0 { 600 } else { 90 };
            for _ in 0..budget / 10 {
                now += ms(10);
                for fx in c.tick(now) {
                    assert!(
                        !matches!(fx, CarouselEffect::CenteredIndexChanged(_)),
                        "reported {fx:?} during programmatic scroll"
                    );
                }
            }
        }
        for _ in 0..2 {
            now += ms(500);
            c.tick(now);
        }
        assert_eq!(c.focus(now).expanded, Some(12));
        assert_eq!(c.focus(now).centered, Some(12));
    }

    #[test]
    fn tap_requests_page() {
        let t0 = Instant::now();
        let mut c = measured(5, 0, t0);
        assert_eq!(
            c.handle(CarouselEvent::ItemTapped(3), t0).as_slice(),
            &[CarouselEffect::ItemClicked(3)]
        );
        assert!(c.handle(CarouselEvent::ItemTapped(9), t0).is_empty());
    }

    #[test]
    fn selection_during_drag_waits_for_release() {
        let t0 = Instant::now();
        let mut c = measured(10, 0, t0);
        c.handle(CarouselEvent::DragStart, t0);
        c.handle(CarouselEvent::SelectedIndexChanged(6), t0);
        assert!(!c.is_programmatic());
        c.handle(CarouselEvent::DragEnd, t0);
        let mut now = t0;
        for _ in 0..100 {
            now += ms(10);
            c.tick(now);
        }
        assert_eq!(c.focus(now).expanded, Some(6));
        assert_eq!(c.focus(now).centered, Some(6));
    }
}
