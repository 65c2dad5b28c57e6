//! Desktop host for the gallery: an egui grid, the preview pager on top of
//! it and the decode worker feeding both.

#![cfg_attr(windows, windows_subsystem = "windows")]

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eframe::egui;
use hashbrown::HashMap;
use lru::LruCache;
use tracing::{info, warn};

use hero_gallery::bridge::{BridgeEffect, GridAnchor, GridBridge};
use hero_gallery::carousel::CarouselEvent;
use hero_gallery::config::Config;
use hero_gallery::decode::{DecodeRequest, DecodeWorker, DecodedImage, Precision};
use hero_gallery::geometry::{fit_rect, Rect, Size, Vec2};
use hero_gallery::preview::{ContentMode, PreviewEffect, PreviewEvent, PreviewPager};
use hero_gallery::{logging, media};

const MAX_TEXTURES: usize = 512;
/// Largest texture side the renderer is asked to hold.
const MAX_TEXTURE_SIDE: u32 = 8192;
const RESULTS_PER_FRAME: usize = 8;
const DECODE_ATTEMPTS: u8 = 2;
/// Unclaimed grid decode wishes are forgotten after this many frames.
const WANT_TTL_FRAMES: u64 = 90;
/// Single clicks wait this long for a possible second click.
const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(250);
/// Wheel events further apart than this belong to separate zoom gestures.
const WHEEL_PINCH_IDLE: Duration = Duration::from_millis(150);
const TOP_BAR_HEIGHT: f32 = 44.0;

type TextureKey = (String, Precision);

struct TextureSlot {
    handle: egui::TextureHandle,
    size: [u32; 2],
}

struct Wanted {
    target: Option<Size>,
    attempts: u8,
    last_frame: u64,
    /// Requested by the preview; lives until the preview closes.
    sticky: bool,
}

enum GridScroll {
    /// Jump without animation to a remembered anchor.
    Restore(GridAnchor),
    /// Animate until the item is on screen.
    Reveal(usize),
}

struct GalleryApp {
    config: Config,
    identities: Vec<String>,
    bridge: GridBridge,
    preview: Option<PreviewPager>,
    decoder: Option<DecodeWorker>,
    textures: LruCache<TextureKey, TextureSlot>,
    intrinsic: HashMap<String, Size>,
    wanted: HashMap<TextureKey, Wanted>,
    frame: u64,

    grid_offset: f32,
    grid_row_height: f32,
    grid_columns: usize,
    visible: Range<usize>,
    scroll_request: Option<GridScroll>,

    pending_tap: Option<(Instant, Vec2)>,
    wheel_pinch: Option<Instant>,
    strip_dragging: bool,
}

impl GalleryApp {
    fn new(cc: &eframe::CreationContext<'_>, start: Option<PathBuf>) -> Self {
        let config = Config::load();
        let identities = match start.as_deref() {
            Some(path) => load_identities(path, &config),
            None => media::synthetic_gallery(config.grid.synthetic_items),
        };
        info!(items = identities.len(), "gallery loaded");

        let decoder = match DecodeWorker::new(MAX_TEXTURE_SIDE) {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!("decode worker unavailable, images will stay blank: {e}");
                None
            }
        };

        cc.egui_ctx.style_mut(|style| {
            style.visuals.panel_fill = egui::Color32::from_gray(18);
        });

        let capacity = NonZeroUsize::new(MAX_TEXTURES).unwrap_or(NonZeroUsize::MIN);
        Self {
            bridge: GridBridge::new(config.grid.preview_window_radius),
            grid_columns: config.grid.columns.max(1),
            config,
            identities,
            preview: None,
            decoder,
            textures: LruCache::new(capacity),
            intrinsic: HashMap::new(),
            wanted: HashMap::new(),
            frame: 0,
            grid_offset: 0.0,
            grid_row_height: 1.0,
            visible: 0..0,
            scroll_request: None,
            pending_tap: None,
            wheel_pinch: None,
            strip_dragging: false,
        }
    }

    fn replace_identities(&mut self, identities: Vec<String>) {
        self.preview = None;
        self.bridge.replace_grid(&identities);
        self.wanted.clear();
        self.identities = identities;
        self.scroll_request = Some(GridScroll::Restore(GridAnchor::default()));
        info!(items = self.identities.len(), "gallery replaced");
    }

    // ---- decoding -------------------------------------------------------

    fn want(&mut self, identity: &str, target: Option<Size>, precision: Precision, sticky: bool) {
        let key = (identity.to_owned(), precision);
        if let Some(slot) = self.textures.peek(&key) {
            if covers(slot, target, self.intrinsic.get(identity).copied()) {
                return;
            }
        }
        let frame = self.frame;
        let entry = self.wanted.entry(key).or_insert(Wanted {
            target,
            attempts: 0,
            last_frame: frame,
            sticky,
        });
        entry.last_frame = frame;
        entry.sticky |= sticky;
        if target.is_some() {
            entry.target = target;
        }
    }

    fn pump_decodes(&mut self) {
        let frame = self.frame;
        self.wanted
            .retain(|_, w| w.sticky || frame.saturating_sub(w.last_frame) <= WANT_TTL_FRAMES);
        let Some(decoder) = &self.decoder else {
            return;
        };
        for ((identity, precision), wanted) in self.wanted.iter_mut() {
            if wanted.attempts >= DECODE_ATTEMPTS || decoder.is_in_flight(identity, *precision) {
                continue;
            }
            let accepted = decoder.request(DecodeRequest {
                identity: identity.clone(),
                target: wanted.target,
                precision: *precision,
            });
            if accepted {
                wanted.attempts += 1;
            }
        }
    }

    fn poll_decodes(&mut self, ctx: &egui::Context, now: Instant) {
        let results = match &self.decoder {
            Some(decoder) => decoder.poll(RESULTS_PER_FRAME),
            None => return,
        };
        for image in results {
            self.accept_decoded(ctx, image, now);
        }
    }

    fn accept_decoded(&mut self, ctx: &egui::Context, image: DecodedImage, now: Instant) {
        let key = (image.identity.clone(), image.precision);
        self.intrinsic.insert(image.identity.clone(), image.intrinsic);

        let larger = self
            .textures
            .peek(&key)
            .map_or(true, |slot| image.width * image.height > slot.size[0] * slot.size[1]);
        if larger {
            let color = egui::ColorImage::from_rgba_unmultiplied(
                [image.width as usize, image.height as usize],
                &image.pixels,
            );
            let handle = ctx.load_texture(
                format!("{}#{:?}", image.identity, image.precision),
                color,
                egui::TextureOptions::LINEAR,
            );
            self.textures.put(
                key.clone(),
                TextureSlot {
                    handle,
                    size: [image.width, image.height],
                },
            );
        }
        if let Some(slot) = self.textures.peek(&key) {
            if self
                .wanted
                .get(&key)
                .is_some_and(|w| covers(slot, w.target, Some(image.intrinsic)))
            {
                self.wanted.remove(&key);
            }
        }

        let index = self
            .preview
            .as_ref()
            .and_then(|p| p.identities().iter().position(|id| *id == image.identity));
        if let Some(index) = index {
            self.send(
                PreviewEvent::ImageLoaded {
                    index,
                    intrinsic: image.intrinsic,
                    precision: image.precision,
                },
                now,
            );
        }
    }

    /// Best texture for `identity`, preferring `precision`.
    fn texture(&mut self, identity: &str, precision: Precision) -> Option<(egui::TextureId, [u32; 2])> {
        let other = match precision {
            Precision::Exact => Precision::Inexact,
            Precision::Inexact => Precision::Exact,
        };
        for p in [precision, other] {
            if let Some(slot) = self.textures.get(&(identity.to_owned(), p)) {
                return Some((slot.handle.id(), slot.size));
            }
        }
        None
    }

    // ---- preview wiring ---------------------------------------------------

    fn open_preview(&mut self, tap_index: usize, cell_px: Rect, ctx: &egui::Context, now: Instant) {
        let anchor = self.current_anchor();
        let Some(request) = self
            .bridge
            .open_preview(&self.identities, tap_index, Some(cell_px), anchor)
        else {
            return;
        };
        let density = ctx.pixels_per_point();
        let known: Vec<(usize, Size)> = request
            .identities
            .iter()
            .enumerate()
            .filter_map(|(i, id)| self.intrinsic.get(id).map(|s| (i, *s)))
            .collect();
        self.preview = Some(PreviewPager::open(request, &self.config, density, now));
        self.pending_tap = None;
        self.wheel_pinch = None;
        self.strip_dragging = false;

        let screen = ctx.screen_rect();
        self.send(
            PreviewEvent::ContainerMeasured {
                size: to_px_size(screen.size(), density),
                window_origin: (0, 0),
            },
            now,
        );
        for (index, intrinsic) in known {
            self.send(
                PreviewEvent::ImageLoaded {
                    index,
                    intrinsic,
                    precision: Precision::Inexact,
                },
                now,
            );
        }
        let live = self.bridge.live_target().map(|r| r.to_string());
        self.send(PreviewEvent::LiveTarget(live), now);
    }

    fn send(&mut self, event: PreviewEvent, now: Instant) -> bool {
        let Some(preview) = self.preview.as_mut() else {
            return false;
        };
        let update = preview.handle(event, now);
        self.apply_preview_effects(update.effects, now);
        update.consumed
    }

    fn apply_preview_effects(&mut self, effects: impl IntoIterator<Item = PreviewEffect>, now: Instant) {
        let mut queue: VecDeque<PreviewEffect> = effects.into_iter().collect();
        while let Some(effect) = queue.pop_front() {
            for bridge_effect in self.bridge.apply(&effect, self.visible.clone()) {
                self.apply_bridge_effect(bridge_effect, now, &mut queue);
            }
            match effect {
                PreviewEffect::RequestDecode {
                    identity,
                    target,
                    precision,
                    ..
                } => self.want(&identity, target, precision, true),
                PreviewEffect::Dismiss => {
                    self.preview = None;
                    self.wanted.retain(|_, w| !w.sticky);
                }
                PreviewEffect::PageSettled { .. }
                | PreviewEffect::BlankSource { .. }
                | PreviewEffect::ExitBeginning { .. }
                | PreviewEffect::ImmersiveChanged(_) => {}
            }
        }
    }

    fn apply_bridge_effect(&mut self, effect: BridgeEffect, now: Instant, queue: &mut VecDeque<PreviewEffect>) {
        match effect {
            BridgeEffect::RestoreScroll { anchor } => self.scroll_request = Some(GridScroll::Restore(anchor)),
            BridgeEffect::ScrollGridTo { index } => self.scroll_request = Some(GridScroll::Reveal(index)),
            BridgeEffect::LiveTargetChanged(target) => {
                if let Some(preview) = self.preview.as_mut() {
                    queue.extend(preview.handle(PreviewEvent::LiveTarget(target), now).effects);
                }
            }
        }
    }

    fn current_anchor(&self) -> GridAnchor {
        let row = (self.grid_offset / self.grid_row_height).floor().max(0.0);
        GridAnchor {
            index: row as usize * self.grid_columns,
            offset: self.grid_offset - row * self.grid_row_height,
        }
    }

    // ---- grid -------------------------------------------------------------

    fn grid_ui(&mut self, ui: &mut egui::Ui, now: Instant) {
        let ppp = ui.ctx().pixels_per_point();
        let columns = self.grid_columns;
        let spacing = self.config.grid.spacing;
        let width = ui.available_width();
        let cell = ((width - spacing * (columns as f32 - 1.0)) / columns as f32).max(8.0);
        let row_height = cell + spacing;
        self.grid_row_height = row_height;

        let rows = self.identities.len().div_ceil(columns);
        let mut area = egui::ScrollArea::vertical().auto_shrink([false, false]);
        let mut reveal = None;
        match self.scroll_request.take() {
            Some(GridScroll::Restore(anchor)) => {
                let offset = (anchor.index / columns) as f32 * row_height + anchor.offset;
                area = area.vertical_scroll_offset(offset.max(0.0));
            }
            Some(GridScroll::Reveal(index)) => reveal = Some(index),
            None => {}
        }

        let mut tapped: Option<(usize, Rect)> = None;
        let mut reports: Vec<(usize, Rect)> = Vec::new();

        let output = area.show_viewport(ui, |ui, viewport| {
            ui.set_height(rows as f32 * row_height);
            let origin = ui.max_rect().min;
            let first_row = (viewport.min.y / row_height).floor().max(0.0) as usize;
            let last_row = ((viewport.max.y / row_height).ceil() as usize).min(rows);
            let first = first_row * columns;
            let last = (last_row * columns).min(self.identities.len());

            if let Some(index) = reveal {
                let row = (index / columns) as f32;
                let target = egui::Rect::from_min_size(
                    origin + egui::vec2(0.0, row * row_height),
                    egui::vec2(width, cell),
                );
                ui.scroll_to_rect(target, Some(egui::Align::Center));
            }

            for index in first..last {
                let (row, col) = (index / columns, index % columns);
                let rect = egui::Rect::from_min_size(
                    origin + egui::vec2(col as f32 * (cell + spacing), row as f32 * row_height),
                    egui::vec2(cell, cell),
                );
                let px = to_px_rect(rect, ppp);
                reports.push((index, px));

                let response = ui.interact(rect, ui.id().with(("cell", index)), egui::Sense::click());
                if response.clicked() {
                    tapped = Some((index, px));
                }
            }
            first..last
        });

        self.grid_offset = output.state.offset.y;
        self.visible = output.inner.clone();

        let painter = ui.painter_at(output.inner_rect);
        let target = Size::new((cell * ppp).round() as i32, (cell * ppp).round() as i32);
        for (index, px) in &reports {
            let identity = self.identities[*index].clone();
            let rect = from_px_rect(*px, ppp);
            if self.bridge.is_blanked(&identity) {
                painter.rect_filled(rect, 0.0, egui::Color32::from_gray(18));
                continue;
            }
            self.want(&identity, Some(target), Precision::Inexact, false);
            match self.texture(&identity, Precision::Inexact) {
                Some((id, size)) => {
                    painter.image(id, rect, cover_uv(size, rect.size()), egui::Color32::WHITE);
                }
                None => {
                    painter.rect_filled(rect, 0.0, egui::Color32::from_gray(40));
                }
            }
            if let media::MediaKind::Video { duration } = media::media_kind(&identity) {
                paint_video_badge(&painter, rect, duration);
            }
        }

        let mut queue = VecDeque::new();
        for (index, px) in reports {
            let identity = self.identities[index].clone();
            if let Some(effect) = self.bridge.report_bounds(&identity, px) {
                self.apply_bridge_effect(effect, now, &mut queue);
            }
        }
        self.apply_preview_effects(queue, now);

        if let Some((index, px)) = tapped {
            if self.preview.is_none() {
                self.open_preview(index, px, ui.ctx(), now);
            }
        }
    }

    // ---- preview ----------------------------------------------------------

    fn preview_ui(&mut self, ctx: &egui::Context, now: Instant) {
        let Some(preview) = self.preview.as_ref() else {
            return;
        };
        let ppp = ctx.pixels_per_point();
        let screen = ctx.screen_rect();
        let container = to_px_size(screen.size(), ppp);
        let frame = preview.render(now);
        let current = preview.position(now).current_index;
        let carousel_items = preview.carousel().visible_items(now);
        let strip_px_height = preview.carousel().layout().item_height;
        let count = preview.identities().len();
        let title = format!("{} / {}", current + 1, count);

        // Pages within one of the fractional pager position.
        let lo = frame.pager_position.floor().max(0.0) as usize;
        let hi = (frame.pager_position.ceil() as usize).min(count.saturating_sub(1));
        let mut pages: Vec<(String, Rect, f32)> = Vec::new();
        for index in lo..=hi {
            let Some(identity) = preview.identities().get(index) else {
                continue;
            };
            let (rect, high_alpha) = match preview.zoom(index) {
                Some(zoom) => (zoom.content_rect(now), zoom.high_res_alpha(now)),
                None => (
                    fit_rect(container, self.intrinsic.get(identity).copied().unwrap_or_default()),
                    0.0,
                ),
            };
            let shift = ((index as f32 - frame.pager_position) * container.width as f32).round();
            let cx = container.width as f32 / 2.0;
            let cy = container.height as f32 / 2.0;
            let rect = rect
                .offset(shift as i32, 0)
                .scaled_about(cx, cy, frame.content_scale, 0.0, frame.drag_offset);
            pages.push((identity.clone(), rect, high_alpha));
        }
        let strip_ids: Vec<(usize, String)> = carousel_items
            .iter()
            .filter_map(|item| preview.identities().get(item.index).map(|id| (item.index, id.clone())))
            .collect();

        let bg = self.config.preview.background_rgb;
        // Pager content sits between the grid panel and the input/chrome area.
        let layer = egui::LayerId::new(egui::Order::Middle, egui::Id::new("preview-layer"));
        let painter = ctx.layer_painter(layer);
        let alpha = |a: f32| (a.clamp(0.0, 1.0) * 255.0).round() as u8;
        painter.rect_filled(
            screen,
            0.0,
            egui::Color32::from_rgba_unmultiplied(bg[0], bg[1], bg[2], alpha(frame.background_alpha)),
        );

        if frame.pager_alpha > 0.0 {
            for (identity, rect, high_alpha) in &pages {
                let rect = from_px_rect(*rect, ppp);
                let tint = egui::Color32::from_white_alpha(alpha(frame.pager_alpha));
                let full = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                if let Some((id, _)) = self.texture(identity, Precision::Inexact) {
                    painter.image(id, rect, full, tint);
                }
                if *high_alpha > 0.0 {
                    if let Some(slot) = self.textures.get(&(identity.clone(), Precision::Exact)) {
                        let tint = egui::Color32::from_white_alpha(alpha(frame.pager_alpha * high_alpha));
                        painter.image(slot.handle.id(), rect, full, tint);
                    }
                }
            }
        }

        if let Some(overlay) = &frame.overlay {
            let rect = from_px_rect(overlay.rect, ppp);
            if let Some((id, size)) = self.texture(&overlay.identity, Precision::Inexact) {
                let uv = match overlay.mode {
                    ContentMode::Crop => cover_uv(size, rect.size()),
                    ContentMode::Fit => egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                };
                painter.image(id, rect, uv, egui::Color32::WHITE);
            } else {
                painter.rect_filled(rect, 0.0, egui::Color32::from_gray(40));
            }
        }

        // Input: the pager surface first, chrome afterwards so it wins hit tests.
        let mut events: Vec<PreviewEvent> = Vec::new();
        let strip_height = strip_px_height / ppp + 16.0;
        let strip_rect = egui::Rect::from_min_max(egui::pos2(screen.min.x, screen.max.y - strip_height), screen.max);
        let top_rect = egui::Rect::from_min_max(screen.min, egui::pos2(screen.max.x, screen.min.y + TOP_BAR_HEIGHT));
        let chrome_visible = frame.chrome_alpha > 0.5;
        let mut close_clicked = false;
        let mut strip_events: Vec<CarouselEvent> = Vec::new();

        egui::Area::new(egui::Id::new("preview-input"))
            .order(egui::Order::Foreground)
            .fixed_pos(screen.min)
            .show(ctx, |ui| {
                let to_local = |p: egui::Pos2| Vec2::new((p.x - screen.min.x) * ppp, (p.y - screen.min.y) * ppp);
                let surface = ui.allocate_rect(screen, egui::Sense::click_and_drag());
                let pointer = surface.interact_pointer_pos().or(surface.hover_pos());
                let at = pointer.map(to_local).unwrap_or_default();

                if surface.double_clicked() {
                    self.pending_tap = None;
                    events.push(PreviewEvent::DoubleTap { at });
                } else if surface.clicked() {
                    self.pending_tap = Some((now, at));
                }
                if surface.drag_started() {
                    events.push(PreviewEvent::DragStart { at });
                }
                if surface.dragged() {
                    let d = surface.drag_delta();
                    if d != egui::Vec2::ZERO {
                        events.push(PreviewEvent::Drag {
                            at,
                            delta: Vec2::new(d.x * ppp, d.y * ppp),
                        });
                    }
                }
                if surface.drag_stopped() {
                    events.push(PreviewEvent::DragEnd);
                }

                if surface.hovered() {
                    let (pinch, wheel) = ui.input(|i| (i.zoom_delta(), i.raw_scroll_delta.y));
                    let factor = pinch * (wheel * 0.0015).exp();
                    if (factor - 1.0).abs() > 1e-4 {
                        if self.wheel_pinch.is_none() {
                            events.push(PreviewEvent::PinchStart);
                        }
                        self.wheel_pinch = Some(now);
                        events.push(PreviewEvent::Pinch {
                            centroid: at,
                            pan: Vec2::ZERO,
                            zoom: factor,
                        });
                    }
                }

                if chrome_visible {
                    let painter = ui.painter();
                    let chrome = egui::Color32::from_black_alpha(alpha(0.55 * frame.chrome_alpha));
                    painter.rect_filled(top_rect, 0.0, chrome);
                    painter.text(
                        top_rect.center(),
                        egui::Align2::CENTER_CENTER,
                        &title,
                        egui::FontId::proportional(16.0),
                        egui::Color32::from_white_alpha(alpha(frame.chrome_alpha)),
                    );
                    let close_rect = egui::Rect::from_center_size(
                        egui::pos2(top_rect.min.x + TOP_BAR_HEIGHT / 2.0, top_rect.center().y),
                        egui::vec2(28.0, 28.0),
                    );
                    let close = ui.interact(close_rect, ui.id().with("close"), egui::Sense::click());
                    painter.text(
                        close_rect.center(),
                        egui::Align2::CENTER_CENTER,
                        "✕",
                        egui::FontId::proportional(18.0),
                        egui::Color32::from_white_alpha(alpha(frame.chrome_alpha)),
                    );
                    close_clicked = close.clicked();

                    painter.rect_filled(strip_rect, 0.0, chrome);
                    let strip = ui.interact(strip_rect, ui.id().with("strip"), egui::Sense::click_and_drag());
                    if strip.drag_started() {
                        self.strip_dragging = true;
                        strip_events.push(CarouselEvent::DragStart);
                    }
                    if strip.dragged() {
                        strip_events.push(CarouselEvent::DragBy(strip.drag_delta().x * ppp));
                    }
                    if strip.drag_stopped() {
                        self.strip_dragging = false;
                        strip_events.push(CarouselEvent::DragEnd);
                    }
                    let thumb_h = strip_px_height / ppp;
                    let clicked_at = strip.clicked().then(|| strip.interact_pointer_pos()).flatten();
                    for (item, (index, _)) in carousel_items.iter().zip(&strip_ids) {
                        let x = strip_rect.min.x + (item.x + (item.outer_width - item.thumb_width) / 2.0) / ppp;
                        let rect = egui::Rect::from_min_size(
                            egui::pos2(x, strip_rect.center().y - thumb_h / 2.0),
                            egui::vec2(item.thumb_width / ppp, thumb_h),
                        );
                        if clicked_at.is_some_and(|p| rect.contains(p)) {
                            strip_events.push(CarouselEvent::ItemTapped(*index));
                        }
                    }
                }
            });

        // A lifted strip drag must still end even if the chrome just hid.
        if !chrome_visible && self.strip_dragging {
            self.strip_dragging = false;
            strip_events.push(CarouselEvent::DragEnd);
        }

        // Strip thumbnails are drawn after input so the texture cache can be borrowed mutably.
        if chrome_visible {
            let thumb_h = strip_px_height / ppp;
            for (item, (_, identity)) in carousel_items.iter().zip(&strip_ids) {
                let x = strip_rect.min.x + (item.x + (item.outer_width - item.thumb_width) / 2.0) / ppp;
                let rect = egui::Rect::from_min_size(
                    egui::pos2(x, strip_rect.center().y - thumb_h / 2.0),
                    egui::vec2(item.thumb_width / ppp, thumb_h),
                );
                let tint = egui::Color32::from_white_alpha(alpha(frame.chrome_alpha * (0.6 + 0.4 * item.emphasis)));
                match self.texture(identity, Precision::Inexact) {
                    Some((id, size)) => {
                        let top = ctx.layer_painter(egui::LayerId::new(egui::Order::Tooltip, egui::Id::new("strip")));
                        top.image(id, rect, cover_uv(size, rect.size()), tint);
                    }
                    None => {
                        let target = Size::new(item.thumb_width.round() as i32 * 2, strip_px_height.round() as i32);
                        self.want(identity, Some(target), Precision::Inexact, false);
                    }
                }
            }
        }

        if self
            .wheel_pinch
            .is_some_and(|last| now.duration_since(last) > WHEEL_PINCH_IDLE)
        {
            self.wheel_pinch = None;
            events.push(PreviewEvent::PinchEnd);
        }
        if let Some((at_time, at)) = self.pending_tap {
            if now.duration_since(at_time) >= DOUBLE_TAP_WINDOW {
                self.pending_tap = None;
                events.push(PreviewEvent::Tap { at });
            }
        }

        let (back, left, right) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Escape) || i.key_pressed(egui::Key::Backspace),
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
            )
        });
        if back || close_clicked {
            events.push(PreviewEvent::Back);
        }
        if left && current > 0 {
            events.push(PreviewEvent::ShowPage(current - 1));
        }
        if right {
            events.push(PreviewEvent::ShowPage(current + 1));
        }

        events.push(PreviewEvent::ContainerMeasured {
            size: container,
            window_origin: (0, 0),
        });
        events.push(PreviewEvent::Carousel(CarouselEvent::ViewportMeasured {
            width: container.width as f32,
        }));
        events.extend(strip_events.into_iter().map(PreviewEvent::Carousel));

        for event in events {
            self.send(event, now);
        }
    }
}

impl eframe::App for GalleryApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.frame += 1;

        let dropped: Vec<PathBuf> = ctx.input(|i| i.raw.dropped_files.iter().filter_map(|f| f.path.clone()).collect());
        if let Some(path) = dropped.first() {
            let identities = load_identities(path, &self.config);
            self.replace_identities(identities);
        }

        self.poll_decodes(ctx, now);

        if let Some(preview) = self.preview.as_mut() {
            let effects = preview.tick(now);
            self.apply_preview_effects(effects, now);
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::from_gray(18)))
            .show(ctx, |ui| self.grid_ui(ui, now));

        self.preview_ui(ctx, now);
        self.pump_decodes();

        let busy = self.preview.as_ref().is_some_and(|p| p.is_animating())
            || self.pending_tap.is_some()
            || self.wheel_pinch.is_some();
        let waiting = self.decoder.as_ref().is_some_and(|d| d.in_flight_count() > 0);
        if busy {
            ctx.request_repaint();
        } else if waiting {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}

/// Identities for a path given on the command line or dropped on the window.
fn load_identities(path: &Path, config: &Config) -> Vec<String> {
    let dir = if path.is_dir() {
        Some(path)
    } else {
        path.parent()
    };
    let images = dir.map(media::media_in_directory).unwrap_or_default();
    if images.is_empty() {
        warn!(path = %path.display(), "no images found; showing synthetic gallery");
        return media::synthetic_gallery(config.grid.synthetic_items);
    }
    images
}

/// Duration label in the cell's bottom-right corner.
fn paint_video_badge(painter: &egui::Painter, cell: egui::Rect, duration: Option<Duration>) {
    let text = duration.map_or_else(|| "▶".to_owned(), media::format_duration);
    let galley = painter.layout_no_wrap(text, egui::FontId::proportional(11.0), egui::Color32::WHITE);
    let padding = egui::vec2(6.0, 2.0);
    let size = galley.size() + padding * 2.0;
    let badge = egui::Rect::from_min_size(cell.max - size - egui::vec2(4.0, 4.0), size);
    if !cell.contains_rect(badge) {
        return;
    }
    painter.rect_filled(badge, 2.0, egui::Color32::from_black_alpha(128));
    painter.galley(badge.min + padding, galley, egui::Color32::WHITE);
}

/// Whether a decoded texture is sharp enough for `target`.
fn covers(slot: &TextureSlot, target: Option<Size>, intrinsic: Option<Size>) -> bool {
    let Some(target) = target else {
        return true;
    };
    let (mut need_w, mut need_h) = (target.width as f32, target.height as f32);
    if let Some(intrinsic) = intrinsic.filter(|s| !s.is_empty()) {
        need_w = need_w.min(intrinsic.width as f32);
        need_h = need_h.min(intrinsic.height as f32);
    }
    slot.size[0] as f32 >= need_w * 0.9 || slot.size[1] as f32 >= need_h * 0.9
}

/// UV sub-rectangle that makes a `texture`-sized image cover `rect` with a centred crop.
fn cover_uv(texture: [u32; 2], rect: egui::Vec2) -> egui::Rect {
    let (tw, th) = (texture[0].max(1) as f32, texture[1].max(1) as f32);
    let (rw, rh) = (rect.x.max(1.0), rect.y.max(1.0));
    let tex_aspect = tw / th;
    let rect_aspect = rw / rh;
    if tex_aspect > rect_aspect {
        let visible = rect_aspect / tex_aspect;
        let inset = (1.0 - visible) / 2.0;
        egui::Rect::from_min_max(egui::pos2(inset, 0.0), egui::pos2(1.0 - inset, 1.0))
    } else {
        let visible = tex_aspect / rect_aspect;
        let inset = (1.0 - visible) / 2.0;
        egui::Rect::from_min_max(egui::pos2(0.0, inset), egui::pos2(1.0, 1.0 - inset))
    }
}

fn to_px_size(points: egui::Vec2, ppp: f32) -> Size {
    Size::new((points.x * ppp).round() as i32, (points.y * ppp).round() as i32)
}

fn to_px_rect(rect: egui::Rect, ppp: f32) -> Rect {
    Rect::new(
        (rect.min.x * ppp).round() as i32,
        (rect.min.y * ppp).round() as i32,
        (rect.width() * ppp).round() as i32,
        (rect.height() * ppp).round() as i32,
    )
}

fn from_px_rect(rect: Rect, ppp: f32) -> egui::Rect {
    egui::Rect::from_min_size(
        egui::pos2(rect.left as f32 / ppp, rect.top as f32 / ppp),
        egui::vec2(rect.width as f32 / ppp, rect.height as f32 / ppp),
    )
}

fn main() -> eframe::Result<()> {
    logging::init();

    let start = std::env::args().nth(1).map(PathBuf::from);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Hero Gallery")
            .with_icon(build_app_icon())
            .with_min_inner_size([320.0, 480.0])
            .with_inner_size([540.0, 900.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Hero Gallery",
        options,
        Box::new(move |cc| Ok(Box::new(GalleryApp::new(cc, start)))),
    )
}

/// Procedural "photo grid" glyph.
fn build_app_icon() -> egui::IconData {
    let w: usize = 64;
    let h: usize = 64;
    let mut rgba = vec![0u8; w * h * 4];

    let tile = 18.0;
    let gap = 4.0;
    let margin = (w as f32 - 3.0 * tile - 2.0 * gap) / 2.0;
    for y in 0..h {
        for x in 0..w {
            let fx = x as f32 + 0.5 - margin;
            let fy = y as f32 + 0.5 - margin;
            if fx < 0.0 || fy < 0.0 {
                continue;
            }
            let (col, row) = ((fx / (tile + gap)) as usize, (fy / (tile + gap)) as usize);
            let inside = col < 3
                && row < 3
                && fx % (tile + gap) < tile
                && fy % (tile + gap) < tile;
            if inside {
                let idx = (y * w + x) * 4;
                // Centre tile is the "hero".
                let hero = col == 1 && row == 1;
                let (r, g, b) = if hero { (255, 196, 64) } else { (235, 235, 235) };
                rgba[idx..idx + 4].copy_from_slice(&[r, g, b, 235]);
            }
        }
    }

    egui::IconData {
        rgba,
        width: w as u32,
        height: h as u32,
    }
}
