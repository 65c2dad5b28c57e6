//! Preview pager orchestrator.
//!
//! Owns one preview session: the shared-bounds entry and exit morphs, the
//! horizontal pager, drag-to-dismiss, per-page zoom, immersive chrome and
//! the thumbnail strip. The host feeds [`PreviewEvent`]s and calls
//! [`PreviewPager::tick`] every frame; everything the host must do in
//! response comes back as [`PreviewEffect`]s, and what to draw comes from
//! [`PreviewPager::render`].

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::animation::{AnimatedValue, Animation, Deadline, EasingFunction, TickOutcome};
use crate::carousel::{CarouselEffect, CarouselEvent, ThumbnailCarousel};
use crate::config::{Config, PreviewConfig};
use crate::decode::Precision;
use crate::drag::{is_vertically_dominant, DismissDrag, DragPhysics, DragRelease};
use crate::geometry::{fit_rect, lerp, Rect, Size, Vec2};
use crate::zoom::{ZoomEffect, ZoomGesture, ZoomPanState, ZoomSettings};

const PAGE_SNAP: Duration = Duration::from_millis(300);
/// Fraction of a page a swipe must travel to flip pages on release.
const PAGE_FLICK_FRACTION: f32 = 0.15;

/// What the grid hands over when a preview opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub identities: Vec<String>,
    pub focus_index: usize,
    /// Tapped cell in window pixels, `"l,t,w,h"`.
    pub entry_bounds: Option<String>,
}

/// How an image fills the rectangle it is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// Cover the rectangle, cropping the overflow.
    Crop,
    /// Contain the whole image, letterboxing.
    Fit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    /// Pager container measured; `window_origin` is its top-left in window pixels.
    ContainerMeasured { size: Size, window_origin: (i32, i32) },
    /// Decoder finished an image.
    ImageLoaded { index: usize, intrinsic: Size, precision: Precision },
    /// Latest on-screen bounds of the current identity's grid cell, in the
    /// wire format; `None` when the cell is not laid out.
    LiveTarget(Option<String>),
    Tap { at: Vec2 },
    DoubleTap { at: Vec2 },
    DragStart { at: Vec2 },
    Drag { at: Vec2, delta: Vec2 },
    DragEnd,
    PinchStart,
    Pinch { centroid: Vec2, pan: Vec2, zoom: f32 },
    PinchEnd,
    /// System back action.
    Back,
    /// Programmatic page request (keyboard, host buttons).
    ShowPage(usize),
    Carousel(CarouselEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEffect {
    /// Pager came to rest on a new page.
    PageSettled { index: usize, identity: String },
    /// Hide (or restore) the grid cell the overlay stands in for.
    BlankSource { identity: String, active: bool },
    ExitBeginning { identity: String },
    /// Exit finished; the session is over.
    Dismiss,
    RequestDecode {
        index: usize,
        identity: String,
        target: Option<Size>,
        precision: Precision,
    },
    ImmersiveChanged(bool),
}

pub type PreviewEffects = SmallVec<[PreviewEffect; 4]>;

/// Result of one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreviewUpdate {
    pub effects: PreviewEffects,
    /// The event was used by the preview; other handlers should ignore it.
    pub consumed: bool,
}

/// Public view of the session's transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionState {
    Idle,
    EnteringShared { start: Rect, end: Option<Rect>, progress: f32 },
    Settled,
    ExitingShared { start: Rect, target: Rect, progress: f32 },
    DraggingToDismiss { offset: f32, eased: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerPosition {
    pub current_index: usize,
    pub is_settling: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub index: usize,
    pub identity: String,
    /// Container-local pixels.
    pub rect: Rect,
    pub mode: ContentMode,
}

/// Everything the host needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub background_alpha: f32,
    pub chrome_alpha: f32,
    /// Zero whenever an overlay stands in for the pager.
    pub pager_alpha: f32,
    /// Fractional page position; `2.5` is halfway between pages 2 and 3.
    pub pager_position: f32,
    pub drag_offset: f32,
    pub content_scale: f32,
    pub overlay: Option<Overlay>,
    pub paging_enabled: bool,
    pub immersive: bool,
}

#[derive(Debug, Clone)]
enum Phase {
    Entering {
        start: Rect,
        end: Option<Rect>,
        /// Bounded wait for the intrinsic size; armed once the container is measured.
        deadline: Option<Deadline>,
        progress: Option<Animation>,
    },
    Settled,
    Exiting {
        /// Page the exit leaves from; the pager is frozen on it.
        index: usize,
        start: Rect,
        target: Rect,
        background_from: f32,
        progress: Animation,
    },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragRoute {
    None,
    /// Vertical deltas to dismiss, the rest to paging.
    Dismiss,
    Zoom,
}

struct Pager {
    count: usize,
    position: AnimatedValue,
    /// Finger down on the pager; paging starts on the first horizontal delta.
    armed: bool,
    dragging: bool,
    drag_origin: f32,
}

impl Pager {
    fn new(count: usize, start: usize) -> Self {
        Self {
            count,
            position: AnimatedValue::new(start as f32),
            armed: false,
            dragging: false,
            drag_origin: start as f32,
        }
    }

    fn last(&self) -> usize {
        self.count.saturating_sub(1)
    }

    fn current(&self, now: Instant) -> usize {
        let p = self.position.sample(now).round().max(0.0) as usize;
        p.min(self.last())
    }

    /// Moving, or held between pages. Touching the pager without paging is
    /// not settling.
    fn in_progress(&self) -> bool {
        self.dragging || self.position.is_running() || self.position.value().fract() != 0.0
    }

    fn begin_drag(&mut self, now: Instant) {
        self.position.stop(now);
        self.armed = true;
        self.drag_origin = self.position.value();
    }

    fn drag_by(&mut self, delta: Vec2, page_width: f32) {
        if !(self.armed || self.dragging) || page_width <= 0.0 {
            return;
        }
        if !self.dragging {
            if is_vertically_dominant(delta) {
                return;
            }
            self.dragging = true;
        }
        let dx = delta.x;
        let next = (self.position.value() - dx / page_width).clamp(0.0, self.last() as f32);
        self.position.snap_to(next);
    }

    fn end_drag(&mut self, now: Instant) {
        let armed = std::mem::take(&mut self.armed);
        let paged = std::mem::take(&mut self.dragging);
        let value = self.position.value();
        if !paged {
            // A caught snap that never moved sideways finishes on the nearest page.
            if armed && value.fract() != 0.0 {
                self.position
                    .animate_to(value.round(), PAGE_SNAP, EasingFunction::EaseOut, now);
            }
            return;
        }
        let base = self.drag_origin.round();
        let moved = value - base;
        let mut target = value.round();
        if target == base && moved.abs() > PAGE_FLICK_FRACTION {
            target = base + moved.signum();
        }
        let target = target.clamp(0.0, self.last() as f32);
        self.position
            .animate_to(target, PAGE_SNAP, EasingFunction::EaseOut, now);
    }

    fn scroll_to(&mut self, index: usize, now: Instant) {
        let index = index.min(self.last());
        self.armed = false;
        self.dragging = false;
        self.position
            .animate_to(index as f32, PAGE_SNAP, EasingFunction::EaseInOut, now);
    }

    /// Stop on `index` immediately, abandoning any drag or snap.
    fn freeze(&mut self, index: usize) {
        self.armed = false;
        self.dragging = false;
        self.position.snap_to(index.min(self.last()) as f32);
    }
}

pub struct PreviewPager {
    config: PreviewConfig,
    identities: Vec<String>,
    container: Size,
    window_origin: (i32, i32),
    entry_window: Option<Rect>,
    live_target_window: Option<Rect>,
    phase: Phase,
    pager: Pager,
    last_notified: usize,
    drag: DismissDrag,
    drag_route: DragRoute,
    drag_forced_immersive: bool,
    immersive: bool,
    chrome_alpha: AnimatedValue,
    zoom_settings: ZoomSettings,
    zooms: HashMap<usize, ZoomPanState>,
    intrinsic: HashMap<usize, Size>,
    carousel: ThumbnailCarousel,
}

impl PreviewPager {
    pub fn open(request: PreviewRequest, config: &Config, density: f32, now: Instant) -> Self {
        let count = request.identities.len();
        let start = request.focus_index.min(count.saturating_sub(1));

        let entry_window = match request.entry_bounds.as_deref() {
            None | Some("") => None,
            Some(s) => match s.parse::<Rect>() {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("ignoring entry bounds {:?}: {}", s, e);
                    None
                }
            },
        };

        let phase = match (count, entry_window) {
            (0, _) => Phase::Closed,
            (_, Some(start_rect)) => Phase::Entering {
                start: start_rect,
                end: None,
                deadline: None,
                progress: None,
            },
            (_, None) => Phase::Settled,
        };
        let entering = matches!(phase, Phase::Entering { .. });

        info!(count, start, entering, "preview opened");

        let preview = &config.preview;
        let mut chrome_alpha = AnimatedValue::new(0.0);
        if !entering {
            chrome_alpha.animate_to(1.0, preview.chrome_fade(), EasingFunction::EaseInOut, now);
        }
        Self {
            config: preview.clone(),
            identities: request.identities,
            container: Size::ZERO,
            window_origin: (0, 0),
            entry_window,
            live_target_window: None,
            phase,
            pager: Pager::new(count, start),
            last_notified: start,
            drag: DismissDrag::new(DragPhysics::from_config(preview, density), preview.spring_back()),
            drag_route: DragRoute::None,
            drag_forced_immersive: false,
            immersive: entering,
            chrome_alpha,
            zoom_settings: ZoomSettings::from_config(preview),
            zooms: HashMap::new(),
            intrinsic: HashMap::new(),
            carousel: ThumbnailCarousel::new(&config.carousel, density, count, start),
        }
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    pub fn carousel(&self) -> &ThumbnailCarousel {
        &self.carousel
    }

    pub fn zoom(&self, index: usize) -> Option<&ZoomPanState> {
        self.zooms.get(&index)
    }

    pub fn is_immersive(&self) -> bool {
        self.immersive
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed)
    }

    pub fn drag_physics(&self) -> &DragPhysics {
        self.drag.physics()
    }

    pub fn position(&self, now: Instant) -> PagerPosition {
        PagerPosition {
            current_index: self.pager.current(now),
            is_settling: self.pager.in_progress(),
        }
    }

    fn current_identity(&self, now: Instant) -> Option<&String> {
        self.identities.get(self.pager.current(now))
    }

    /// Whether anything is still moving; the host keeps repainting while true.
    pub fn is_animating(&self) -> bool {
        !matches!(self.phase, Phase::Settled | Phase::Closed)
            || self.pager.in_progress()
            || self.drag.is_springing_back()
            || self.chrome_alpha.is_running()
            || self.carousel.is_animating()
            || self.zooms.values().any(|z| z.is_animating())
    }

    pub fn transition_state(&self, now: Instant) -> TransitionState {
        match &self.phase {
            Phase::Closed => TransitionState::Idle,
            Phase::Entering { start, end, progress, .. } => TransitionState::EnteringShared {
                start: self.to_local(*start),
                end: *end,
                progress: progress.as_ref().map_or(0.0, |p| p.value_at(now)),
            },
            Phase::Exiting { start, target, progress, .. } => TransitionState::ExitingShared {
                start: *start,
                target: *target,
                progress: progress.value_at(now),
            },
            Phase::Settled if self.drag.is_active() => {
                let offset = self.drag.offset(now);
                TransitionState::DraggingToDismiss {
                    offset,
                    eased: self.drag.physics().eased(offset),
                }
            }
            Phase::Settled => TransitionState::Settled,
        }
    }

    fn to_local(&self, window: Rect) -> Rect {
        window.offset(-self.window_origin.0, -self.window_origin.1)
    }

    /// Fit rectangle of the current page, or the whole container while its
    /// size is unknown.
    fn current_fit(&self, now: Instant) -> Rect {
        let intrinsic = self
            .intrinsic
            .get(&self.pager.current(now))
            .copied()
            .unwrap_or(Size::ZERO);
        fit_rect(self.container, intrinsic)
    }

    fn zoomed(&self, now: Instant) -> bool {
        self.zooms
            .get(&self.pager.current(now))
            .is_some_and(|z| z.is_zoomed(now))
    }

    pub fn paging_enabled(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::Settled) && !self.zoomed(now) && self.drag.offset(now) <= 0.0
    }

    pub fn handle(&mut self, event: PreviewEvent, now: Instant) -> PreviewUpdate {
        let mut update = PreviewUpdate::default();
        if matches!(self.phase, Phase::Closed) {
            return update;
        }
        let fx = &mut update.effects;

        match event {
            PreviewEvent::ContainerMeasured { size, window_origin } => {
                self.window_origin = window_origin;
                if size != self.container {
                    self.container = size;
                    for (index, zoom) in self.zooms.iter_mut() {
                        let z_fx = zoom.set_container(size, now);
                        push_decodes(&self.identities, *index, z_fx, fx);
                    }
                    self.sync_zoom_window(now, fx);
                    self.arm_entry(now, fx);
                }
                update.consumed = true;
            }
            PreviewEvent::ImageLoaded { index, intrinsic, precision } => {
                if !intrinsic.is_empty() {
                    self.intrinsic.insert(index, intrinsic);
                }
                if let Some(zoom) = self.zooms.get_mut(&index) {
                    match precision {
                        Precision::Exact => zoom.on_high_res_loaded(intrinsic, now),
                        Precision::Inexact => zoom.set_image_size(intrinsic, now),
                    }
                }
                if index == self.pager.current(now) {
                    if let Phase::Entering { end, progress: Some(_), .. } = &mut self.phase {
                        *end = Some(fit_rect(self.container, intrinsic));
                    }
                    self.maybe_start_entry(now, fx);
                }
                update.consumed = true;
            }
            PreviewEvent::LiveTarget(serialized) => {
                self.live_target_window = serialized.as_deref().and_then(Rect::parse);
                if let Phase::Exiting { target, .. } = &mut self.phase {
                    if let Some(live) = self.live_target_window {
                        *target = live.offset(-self.window_origin.0, -self.window_origin.1);
                    }
                }
            }
            PreviewEvent::Back => {
                update.consumed = self.back(now, fx);
            }
            PreviewEvent::ShowPage(index) => {
                if matches!(self.phase, Phase::Settled) && index < self.identities.len() {
                    self.pager.scroll_to(index, now);
                    update.consumed = true;
                }
            }
            PreviewEvent::Carousel(event) => {
                let c_fx = self.carousel.handle(event, now);
                self.apply_carousel(c_fx, now);
                update.consumed = true;
            }
            gesture => {
                if matches!(self.phase, Phase::Settled) {
                    update.consumed = self.gesture(gesture, now, fx);
                } else {
                    // Transitions own the screen; swallow input.
                    update.consumed = true;
                }
            }
        }
        update
    }

    fn gesture(&mut self, gesture: PreviewEvent, now: Instant, fx: &mut PreviewEffects) -> bool {
        let current = self.pager.current(now);
        match gesture {
            PreviewEvent::Tap { .. } => {
                self.zoom_gesture(current, ZoomGesture::Tap, now, fx);
                true
            }
            PreviewEvent::DoubleTap { at } => {
                self.zoom_gesture(current, ZoomGesture::DoubleTap { centroid: at }, now, fx);
                true
            }
            PreviewEvent::PinchStart => {
                self.zoom_gesture(current, ZoomGesture::TransformStart, now, fx);
                true
            }
            PreviewEvent::Pinch { centroid, pan, zoom } => {
                self.zoom_gesture(current, ZoomGesture::Transform { centroid, pan, zoom }, now, fx);
                true
            }
            PreviewEvent::PinchEnd => {
                self.zoom_gesture(current, ZoomGesture::TransformEnd, now, fx);
                true
            }
            PreviewEvent::DragStart { .. } => {
                if self.zoomed(now) {
                    self.drag_route = DragRoute::Zoom;
                    self.zoom_gesture(current, ZoomGesture::TransformStart, now, fx);
                } else {
                    self.drag_route = DragRoute::Dismiss;
                    self.drag.begin(now);
                    self.pager.begin_drag(now);
                }
                true
            }
            PreviewEvent::Drag { at, delta } => match self.drag_route {
                DragRoute::Zoom => {
                    let g = ZoomGesture::Transform {
                        centroid: at,
                        pan: delta,
                        zoom: 1.0,
                    };
                    self.zoom_gesture(current, g, now, fx);
                    true
                }
                DragRoute::Dismiss => self.dismiss_drag(delta, now, fx),
                DragRoute::None => false,
            },
            PreviewEvent::DragEnd => {
                let route = std::mem::replace(&mut self.drag_route, DragRoute::None);
                match route {
                    DragRoute::Zoom => self.zoom_gesture(current, ZoomGesture::TransformEnd, now, fx),
                    DragRoute::Dismiss => {
                        self.pager.end_drag(now);
                        self.release_drag(now, fx);
                    }
                    DragRoute::None => return false,
                }
                true
            }
            _ => false,
        }
    }

    fn dismiss_drag(&mut self, delta: Vec2, now: Instant, fx: &mut PreviewEffects) -> bool {
        let step = self.drag.update(delta, now);
        if step.blank_changed == Some(true) {
            if let Some(identity) = self.current_identity(now).cloned() {
                fx.push(PreviewEffect::BlankSource { identity, active: true });
            }
            if !self.immersive {
                self.drag_forced_immersive = true;
                self.set_immersive(true, now, fx);
            }
        }
        if step.consumed {
            return true;
        }
        if self.paging_enabled(now) {
            self.pager.drag_by(delta, self.container.width as f32);
        }
        false
    }

    fn release_drag(&mut self, now: Instant, fx: &mut PreviewEffects) {
        match self.drag.release(now) {
            DragRelease::Commit { offset } => {
                let start = self.drag_exit_start(offset, now);
                let background_from = self.drag.physics().background_alpha(offset);
                self.begin_exit(start, background_from, now, fx);
            }
            DragRelease::SpringBack { unblank } => {
                if unblank {
                    if let Some(identity) = self.current_identity(now).cloned() {
                        fx.push(PreviewEffect::BlankSource { identity, active: false });
                    }
                }
                if std::mem::take(&mut self.drag_forced_immersive) {
                    self.set_immersive(false, now, fx);
                }
            }
            DragRelease::Idle => {}
        }
    }

    /// Where the dragged content visually is when the finger lifts.
    /// Includes how far the page sits off its slot when a swipe was interrupted.
    fn drag_exit_start(&self, offset: f32, now: Instant) -> Rect {
        let index = self.pager.current(now);
        let shift = (index as f32 - self.pager.position.sample(now)) * self.container.width as f32;
        let fit = self.current_fit(now).offset(shift.round() as i32, 0);
        let cx = self.container.width as f32 / 2.0;
        let cy = self.container.height as f32 / 2.0;
        fit.scaled_about(cx, cy, self.drag.physics().content_scale(offset), 0.0, offset)
    }

    fn exit_target(&self) -> Option<Rect> {
        self.live_target_window
            .or(self.entry_window)
            .map(|r| self.to_local(r))
    }

    fn back(&mut self, now: Instant, fx: &mut PreviewEffects) -> bool {
        match &self.phase {
            Phase::Closed | Phase::Exiting { .. } => false,
            Phase::Entering { start, end, progress, .. } => {
                // Cut the entry short and leave from wherever the overlay is.
                let start = self.to_local(*start);
                let from = match (end, progress) {
                    (Some(end), Some(p)) => lerp(start, *end, p.value_at(now)),
                    _ => start,
                };
                let bg = progress.as_ref().map_or(0.0, |p| p.value_at(now));
                self.begin_exit(from, bg, now, fx);
                true
            }
            Phase::Settled => {
                if self.immersive {
                    self.set_immersive(false, now, fx);
                    return true;
                }
                let offset = self.drag.offset(now);
                let start = self.drag_exit_start(offset, now);
                let bg = self.drag.physics().background_alpha(offset);
                self.begin_exit(start, bg, now, fx);
                true
            }
        }
    }

    fn begin_exit(&mut self, start: Rect, background_from: f32, now: Instant, fx: &mut PreviewEffects) {
        let index = self.pager.current(now);
        self.pager.freeze(index);
        let identity = self.identities.get(index).cloned();
        if let Some(identity) = &identity {
            if !self.drag.is_blanked() {
                fx.push(PreviewEffect::BlankSource {
                    identity: identity.clone(),
                    active: true,
                });
            }
            fx.push(PreviewEffect::ExitBeginning {
                identity: identity.clone(),
            });
        }
        self.drag_route = DragRoute::None;
        self.drag_forced_immersive = false;

        let Some(target) = self.exit_target() else {
            debug!("no exit target; dismissing without animation");
            self.close(fx);
            return;
        };

        self.set_immersive(true, now, fx);
        debug!(%start, %target, "exit transition started");
        self.phase = Phase::Exiting {
            index,
            start,
            target,
            background_from,
            progress: Animation::new(
                0.0,
                1.0,
                self.config.exit_duration(),
                EasingFunction::FastOutSlowIn,
                now,
            ),
        };
    }

    fn close(&mut self, fx: &mut PreviewEffects) {
        info!("preview dismissed");
        self.phase = Phase::Closed;
        self.zooms.clear();
        fx.push(PreviewEffect::Dismiss);
    }

    /// Container is known: start waiting for the current image's size.
    fn arm_entry(&mut self, now: Instant, fx: &mut PreviewEffects) {
        if self.container.is_empty() {
            return;
        }
        if let Phase::Entering { deadline, progress: None, .. } = &mut self.phase {
            if deadline.is_none() {
                *deadline = Some(Deadline::after(now, self.config.entry_size_timeout()));
            }
        }
        self.maybe_start_entry(now, fx);
    }

    fn maybe_start_entry(&mut self, now: Instant, fx: &mut PreviewEffects) {
        let current = self.pager.current(now);
        let known = self.intrinsic.get(&current).copied();
        let container = self.container;
        let duration = self.config.entry_duration();

        let Phase::Entering { end, deadline: Some(deadline), progress, .. } = &mut self.phase else {
            return;
        };
        if progress.is_some() {
            return;
        }
        let timed_out = deadline.expired(now);
        if known.is_none() && !timed_out {
            return;
        }
        if known.is_none() {
            debug!("intrinsic size not known in time; entering to full container");
        }
        *end = Some(fit_rect(container, known.unwrap_or(Size::ZERO)));
        *progress = Some(Animation::new(0.0, 1.0, duration, EasingFunction::FastOutSlowIn, now));
        self.set_immersive(true, now, fx);
    }

    fn set_immersive(&mut self, value: bool, now: Instant, fx: &mut PreviewEffects) {
        if self.immersive == value {
            return;
        }
        self.immersive = value;
        let target = if value { 0.0 } else { 1.0 };
        self.chrome_alpha
            .animate_to(target, self.config.chrome_fade(), EasingFunction::EaseInOut, now);
        fx.push(PreviewEffect::ImmersiveChanged(value));
    }

    fn zoom_gesture(&mut self, index: usize, gesture: ZoomGesture, now: Instant, fx: &mut PreviewEffects) {
        let Some(zoom) = self.zooms.get_mut(&index) else {
            return;
        };
        let z_fx = zoom.handle(gesture, now);
        for effect in z_fx {
            match effect {
                ZoomEffect::ToggleImmersive => {
                    let next = !self.immersive;
                    self.set_immersive(next, now, fx);
                }
                ZoomEffect::EnterImmersive => self.set_immersive(true, now, fx),
                ZoomEffect::RequestPageChange(delta) => {
                    let last = self.identities.len().saturating_sub(1) as i64;
                    let target = (index as i64 + delta as i64).clamp(0, last) as usize;
                    if target != index {
                        debug!(from = index, to = target, "edge fling page change");
                        self.pager.scroll_to(target, now);
                    }
                }
                other => push_decodes(&self.identities, index, [other], fx),
            }
        }
    }

    /// Keep zoom state for the current page and its neighbours only.
    fn sync_zoom_window(&mut self, now: Instant, fx: &mut PreviewEffects) {
        if self.container.is_empty() || self.identities.is_empty() {
            return;
        }
        let current = self.pager.current(now);
        let lo = current.saturating_sub(1);
        let hi = (current + 1).min(self.identities.len() - 1);
        self.zooms.retain(|index, _| (lo..=hi).contains(index));
        for index in lo..=hi {
            if self.zooms.contains_key(&index) {
                continue;
            }
            let mut zoom = ZoomPanState::new(self.zoom_settings);
            let z_fx = zoom.set_container(self.container, now);
            if let Some(size) = self.intrinsic.get(&index) {
                zoom.set_image_size(*size, now);
            }
            push_decodes(&self.identities, index, z_fx, fx);
            self.zooms.insert(index, zoom);
        }
    }

    fn apply_carousel(&mut self, effects: impl IntoIterator<Item = CarouselEffect>, now: Instant) {
        for effect in effects {
            match effect {
                CarouselEffect::ItemClicked(index) => {
                    if matches!(self.phase, Phase::Settled) {
                        self.pager.scroll_to(index, now);
                    }
                }
                CarouselEffect::CenteredIndexChanged(index) => {
                    if !self.pager.in_progress() && index != self.pager.current(now) {
                        debug!(index, "pager following carousel");
                        self.pager.scroll_to(index, now);
                    }
                }
            }
        }
    }

    /// Advance every animation to `now`.
    pub fn tick(&mut self, now: Instant) -> PreviewEffects {
        let mut fx = PreviewEffects::new();
        if matches!(self.phase, Phase::Closed) {
            return fx;
        }

        self.chrome_alpha.tick(now);
        self.drag.tick(now);
        for zoom in self.zooms.values_mut() {
            zoom.tick(now);
        }

        let (entry_done, exit_done) = match &self.phase {
            Phase::Entering { progress: Some(p), .. } => (p.is_complete_at(now), false),
            Phase::Exiting { progress, .. } => (false, progress.is_complete_at(now)),
            _ => (false, false),
        };
        if exit_done {
            self.close(&mut fx);
            return fx;
        }
        if entry_done {
            debug!("entry transition finished");
            self.phase = Phase::Settled;
            self.set_immersive(false, now, &mut fx);
        } else {
            self.maybe_start_entry(now, &mut fx);
        }

        let was_moving = self.pager.in_progress();
        if self.pager.position.tick(now) == TickOutcome::Finished || !was_moving {
            self.settle_page(now, &mut fx);
        }

        let c_fx = self.carousel.tick(now);
        self.apply_carousel(c_fx, now);
        fx
    }

    fn settle_page(&mut self, now: Instant, fx: &mut PreviewEffects) {
        if self.pager.in_progress() {
            return;
        }
        let index = self.pager.current(now);
        if index == self.last_notified {
            return;
        }
        self.last_notified = index;
        self.sync_zoom_window(now, fx);
        if let Some(identity) = self.identities.get(index).cloned() {
            debug!(index, %identity, "page settled");
            fx.push(PreviewEffect::PageSettled { index, identity });
        }
        let c_fx = self.carousel.handle(CarouselEvent::SelectedIndexChanged(index), now);
        self.apply_carousel(c_fx, now);
    }

    /// Describe the frame at `now`.
    pub fn render(&self, now: Instant) -> PreviewFrame {
        let offset = self.drag.offset(now);
        let physics = self.drag.physics();
        let current = self.pager.current(now);
        let mut frame = PreviewFrame {
            background_alpha: 1.0,
            chrome_alpha: self.chrome_alpha.sample(now),
            pager_alpha: 1.0,
            pager_position: self.pager.position.sample(now),
            drag_offset: offset,
            content_scale: physics.content_scale(offset),
            overlay: None,
            paging_enabled: self.paging_enabled(now),
            immersive: self.immersive,
        };

        match &self.phase {
            Phase::Closed => {
                frame.background_alpha = 0.0;
                frame.pager_alpha = 0.0;
            }
            Phase::Settled => {
                frame.background_alpha = physics.background_alpha(offset);
            }
            Phase::Entering { start, end, progress, .. } => {
                let start = self.to_local(*start);
                let t = progress.as_ref().map_or(0.0, |p| p.value_at(now));
                let rect = match end {
                    Some(end) => lerp(start, *end, t),
                    None => start,
                };
                frame.background_alpha = t;
                frame.pager_alpha = 0.0;
                frame.overlay = self.overlay(current, rect);
            }
            Phase::Exiting { index, start, target, background_from, progress } => {
                let t = progress.value_at(now);
                frame.background_alpha = background_from * (1.0 - t);
                frame.pager_alpha = 0.0;
                frame.drag_offset = 0.0;
                frame.content_scale = 1.0;
                frame.overlay = self.overlay(*index, lerp(*start, *target, t));
            }
        }
        frame
    }

    fn overlay(&self, index: usize, rect: Rect) -> Option<Overlay> {
        self.identities.get(index).map(|identity| Overlay {
            index,
            identity: identity.clone(),
            rect,
            mode: ContentMode::Crop,
        })
    }
}

fn push_decodes(
    identities: &[String],
    index: usize,
    effects: impl IntoIterator<Item = ZoomEffect>,
    fx: &mut PreviewEffects,
) {
    let Some(identity) = identities.get(index) else {
        return;
    };
    for effect in effects {
        let (target, precision) = match effect {
            ZoomEffect::RequestLowRes { target } => (Some(target), Precision::Inexact),
            ZoomEffect::RequestHighRes => (None, Precision::Exact),
            _ => continue,
        };
        fx.push(PreviewEffect::RequestDecode {
            index,
            identity: identity.clone(),
            target,
            precision,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("synthetic:400x300:{:06x}", i * 1111)).collect()
    }

    fn open(n: usize, focus: usize, entry: Option<&str>, t0: Instant) -> PreviewPager {
        let request = PreviewRequest {
            identities: ids(n),
            focus_index: focus,
            entry_bounds: entry.map(str::to_string),
        };
        PreviewPager::open(request, &Config::default(), 1.0, t0)
    }

    fn measure(p: &mut PreviewPager, t: Instant) -> PreviewUpdate {
        p.handle(
            PreviewEvent::ContainerMeasured {
                size: Size::new(1000, 800),
                window_origin: (0, 0),
            },
            t,
        )
    }

    #[test]
    fn no_entry_rect_settles_immediately() {
        let t0 = Instant::now();
        let p = open(3, 1, None, t0);
        assert_eq!(p.transition_state(t0), TransitionState::Settled);
        assert!(!p.is_immersive());
    }

    #[test]
    fn malformed_entry_rect_is_ignored() {
        let t0 = Instant::now();
        let p = open(3, 1, Some("1,2,3"), t0);
        assert_eq!(p.transition_state(t0), TransitionState::Settled);
    }

    #[test]
    fn measuring_requests_low_res_for_neighbours() {
        let t0 = Instant::now();
        let mut p = open(5, 2, None, t0);
        let update = measure(&mut p, t0);
        let mut requested: Vec<usize> = update
            .effects
            .iter()
            .filter_map(|e| match e {
                PreviewEffect::RequestDecode { index, precision: Precision::Inexact, .. } => Some(*index),
                _ => None,
            })
            .collect();
        requested.sort_unstable();
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[test]
    fn entry_falls_back_to_full_container_after_timeout() {
        let t0 = Instant::now();
        let mut p = open(3, 0, Some("10,10,40,40"), t0);
        measure(&mut p, t0);
        p.tick(t0 + ms(100));
        assert!(matches!(
            p.transition_state(t0 + ms(100)),
            TransitionState::EnteringShared { end: None, .. }
        ));
        p.tick(t0 + ms(250));
        match p.transition_state(t0 + ms(250)) {
            TransitionState::EnteringShared { end, .. } => {
                assert_eq!(end, Some(Rect::new(0, 0, 1000, 800)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gestures_are_swallowed_during_entry() {
        let t0 = Instant::now();
        let mut p = open(3, 0, Some("10,10,40,40"), t0);
        measure(&mut p, t0);
        let update = p.handle(PreviewEvent::Tap { at: Vec2::new(5.0, 5.0) }, t0);
        assert!(update.consumed);
        assert!(update.effects.is_empty());
    }

    #[test]
    fn tap_toggles_immersive_and_back_clears_it_first() {
        let t0 = Instant::now();
        let mut p = open(3, 0, None, t0);
        measure(&mut p, t0);
        let fx = p.handle(PreviewEvent::Tap { at: Vec2::new(5.0, 5.0) }, t0).effects;
        assert_eq!(fx.as_slice(), &[PreviewEffect::ImmersiveChanged(true)]);
        let fx = p.handle(PreviewEvent::Back, t0).effects;
        assert_eq!(fx.as_slice(), &[PreviewEffect::ImmersiveChanged(false)]);
        assert_eq!(p.transition_state(t0), TransitionState::Settled);
    }

    #[test]
    fn back_without_any_target_dismisses_directly() {
        let t0 = Instant::now();
        let mut p = open(3, 1, None, t0);
        measure(&mut p, t0);
        let fx = p.handle(PreviewEvent::Back, t0).effects;
        let id = ids(3)[1].clone();
        assert_eq!(
            fx.as_slice(),
            &[
                PreviewEffect::BlankSource { identity: id.clone(), active: true },
                PreviewEffect::ExitBeginning { identity: id },
                PreviewEffect::Dismiss,
            ]
        );
        assert!(p.is_closed());
    }

    #[test]
    fn horizontal_swipe_pages_and_notifies_once() {
        let t0 = Instant::now();
        let mut p = open(5, 1, None, t0);
        measure(&mut p, t0);
        p.handle(PreviewEvent::DragStart { at: Vec2::new(500.0, 400.0) }, t0);
        let u = p.handle(
            PreviewEvent::Drag {
                at: Vec2::new(300.0, 400.0),
                delta: Vec2::new(-300.0, 10.0),
            },
            t0,
        );
        assert!(!u.consumed, "horizontal deltas pass to the pager");
        assert!(p.position(t0).is_settling);
        p.handle(PreviewEvent::DragEnd, t0);

        let mut settled = Vec::new();
        let mut now = t0;
        for _ in 0..50 {
            now += ms(16);
            for e in p.tick(now) {
                if let PreviewEffect::PageSettled { index, .. } = e {
                    settled.push(index);
                }
            }
        }
        assert_eq!(settled, vec![2]);
        assert_eq!(p.position(now).current_index, 2);
        // zoom window moved with the page
        assert!(p.zoom(3).is_some());
        assert!(p.zoom(0).is_none());
    }

    #[test]
    fn vertical_drag_leaves_pager_at_rest() {
        let t0 = Instant::now();
        let mut p = open(5, 1, None, t0);
        measure(&mut p, t0);
        p.handle(PreviewEvent::DragStart { at: Vec2::new(500.0, 400.0) }, t0);
        assert!(!p.position(t0).is_settling);

        let up = p.handle(
            PreviewEvent::Drag {
                at: Vec2::new(500.0, 380.0),
                delta: Vec2::new(2.0, -20.0),
            },
            t0,
        );
        assert!(!up.consumed);
        let down = p.handle(
            PreviewEvent::Drag {
                at: Vec2::new(500.0, 400.0),
                delta: Vec2::new(-3.0, 12.0),
            },
            t0,
        );
        assert!(down.consumed);
        assert!(!p.position(t0).is_settling);
        assert_eq!(p.render(t0).pager_position, 1.0);

        p.handle(PreviewEvent::DragEnd, t0);
        let mut now = t0;
        for _ in 0..30 {
            now += ms(16);
            assert!(!p
                .tick(now)
                .iter()
                .any(|e| matches!(e, PreviewEffect::PageSettled { .. })));
        }
        assert_eq!(p.position(now), PagerPosition { current_index: 1, is_settling: false });
    }

    #[test]
    fn chrome_fades_in_when_opened_without_entry() {
        let t0 = Instant::now();
        let p = open(3, 0, None, t0);
        assert_eq!(p.render(t0).chrome_alpha, 0.0);
        assert!(p.is_animating());
        assert_eq!(p.render(t0 + ms(250)).chrome_alpha, 1.0);
    }

    #[test]
    fn zoomed_page_disables_paging_and_dismiss() {
        let t0 = Instant::now();
        let mut p = open(3, 1, None, t0);
        measure(&mut p, t0);
        p.handle(
            PreviewEvent::ImageLoaded {
                index: 1,
                intrinsic: Size::new(1000, 800),
                precision: Precision::Inexact,
            },
            t0,
        );
        p.handle(PreviewEvent::PinchStart, t0);
        let fx = p
            .handle(
                PreviewEvent::Pinch {
                    centroid: Vec2::new(500.0, 400.0),
                    pan: Vec2::ZERO,
                    zoom: 2.0,
                },
                t0,
            )
            .effects;
        assert!(fx.contains(&PreviewEffect::ImmersiveChanged(true)));
        assert!(fx.iter().any(|e| matches!(
            e,
            PreviewEffect::RequestDecode { index: 1, precision: Precision::Exact, .. }
        )));
        p.handle(PreviewEvent::PinchEnd, t0);
        assert!(!p.paging_enabled(t0));

        p.handle(PreviewEvent::DragStart { at: Vec2::new(500.0, 400.0) }, t0);
        p.handle(
            PreviewEvent::Drag {
                at: Vec2::new(500.0, 500.0),
                delta: Vec2::new(0.0, 100.0),
            },
            t0,
        );
        assert!(!matches!(
            p.transition_state(t0),
            TransitionState::DraggingToDismiss { .. }
        ));
    }

    #[test]
    fn carousel_tap_moves_pager() {
        let t0 = Instant::now();
        let mut p = open(6, 0, None, t0);
        measure(&mut p, t0);
        p.handle(PreviewEvent::Carousel(CarouselEvent::ViewportMeasured { width: 400.0 }), t0);
        p.handle(PreviewEvent::Carousel(CarouselEvent::ItemTapped(4)), t0);
        let mut now = t0;
        let mut settled = None;
        for _ in 0..40 {
            now += ms(16);
            for e in p.tick(now) {
                if let PreviewEffect::PageSettled { index, .. } = e {
                    settled = Some(index);
                }
            }
        }
        assert_eq!(settled, Some(4));
        assert_eq!(p.carousel().selected(), 4);
    }
}
