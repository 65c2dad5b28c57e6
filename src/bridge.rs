//! Grid side of the preview: live cell bounds, scroll restoration and
//! source-cell blanking.

use std::ops::Range;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::geometry::Rect;
use crate::preview::{PreviewEffect, PreviewRequest};

/// Latest on-screen rectangle per content identity, in window pixels.
///
/// Written by every laid-out grid cell, read by the open preview. Latest
/// write wins.
#[derive(Debug, Default, Clone)]
pub struct BoundsRegistry {
    bounds: HashMap<String, Rect>,
}

impl BoundsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `rect`; returns `true` when it differs from what was stored.
    pub fn report(&mut self, identity: &str, rect: Rect) -> bool {
        match self.bounds.get_mut(identity) {
            Some(existing) if *existing == rect => false,
            Some(existing) => {
                *existing = rect;
                true
            }
            None => {
                self.bounds.insert(identity.to_owned(), rect);
                true
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<Rect> {
        self.bounds.get(identity).copied()
    }

    pub fn remove(&mut self, identity: &str) -> Option<Rect> {
        self.bounds.remove(identity)
    }

    /// Drop identities that `keep` rejects, e.g. after the grid's contents change.
    pub fn prune(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.bounds.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

/// Grid scroll position: first visible item and its pixel offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridAnchor {
    pub index: usize,
    pub offset: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEffect {
    /// Jump the grid back to where it was when the preview opened.
    RestoreScroll { anchor: GridAnchor },
    /// Bring a grid item into view, animated.
    ScrollGridTo { index: usize },
    /// New exit target for the preview, in the wire format.
    LiveTargetChanged(Option<String>),
}

pub type BridgeEffects = SmallVec<[BridgeEffect; 2]>;

#[derive(Debug, Clone)]
struct Session {
    /// Grid index of the preview's first identity.
    window_start: usize,
    entry_identity: String,
    entry_rect: Option<Rect>,
    anchor: GridAnchor,
    current: String,
    blanked: Option<String>,
    /// Exit started; blanking holds until close.
    exit_locked: bool,
}

pub struct GridBridge {
    registry: BoundsRegistry,
    window_radius: usize,
    session: Option<Session>,
}

impl GridBridge {
    pub fn new(window_radius: usize) -> Self {
        Self {
            registry: BoundsRegistry::new(),
            window_radius,
            session: None,
        }
    }

    pub fn registry(&self) -> &BoundsRegistry {
        &self.registry
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Identity the preview is currently showing.
    pub fn current(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.current.as_str())
    }

    pub fn is_blanked(&self, identity: &str) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.blanked.as_deref())
            .is_some_and(|b| b == identity)
    }

    /// Exit target for the current identity: live bounds, else the entry
    /// rectangle when showing the entry identity.
    pub fn live_target(&self) -> Option<Rect> {
        let session = self.session.as_ref()?;
        self.registry.get(&session.current).or_else(|| {
            (session.current == session.entry_identity)
                .then_some(session.entry_rect)
                .flatten()
        })
    }

    /// Start a preview session for the tapped grid item.
    ///
    /// `entry_rect` falls back to the registry when the host did not
    /// measure the tapped cell itself.
    pub fn open_preview(
        &mut self,
        identities: &[String],
        tap_index: usize,
        entry_rect: Option<Rect>,
        anchor: GridAnchor,
    ) -> Option<PreviewRequest> {
        let tapped = identities.get(tap_index)?;
        let start = tap_index.saturating_sub(self.window_radius);
        let end = tap_index
            .saturating_add(self.window_radius)
            .saturating_add(1)
            .min(identities.len());
        let window = identities[start..end].to_vec();
        let entry_rect = entry_rect.or_else(|| self.registry.get(tapped));

        info!(tap_index, window = window.len(), "opening preview");
        self.session = Some(Session {
            window_start: start,
            entry_identity: tapped.clone(),
            entry_rect,
            anchor,
            current: tapped.clone(),
            blanked: None,
            exit_locked: false,
        });

        Some(PreviewRequest {
            identities: window,
            focus_index: tap_index - start,
            entry_bounds: entry_rect.map(|r| r.to_string()),
        })
    }

    /// A grid cell was laid out at `rect`.
    pub fn report_bounds(&mut self, identity: &str, rect: Rect) -> Option<BridgeEffect> {
        let changed = self.registry.report(identity, rect);
        let session = self.session.as_ref()?;
        (changed && session.current == identity)
            .then(|| BridgeEffect::LiveTargetChanged(Some(rect.to_string())))
    }

    /// The preview settled on page `index` of its window. `visible` is
    /// the range of grid indices currently on screen.
    pub fn on_page_settled(&mut self, index: usize, identity: &str, visible: Range<usize>) -> BridgeEffects {
        let mut effects = BridgeEffects::new();
        let Some(session) = self.session.as_mut() else {
            return effects;
        };
        session.current = identity.to_owned();

        if identity == session.entry_identity {
            debug!(anchor = session.anchor.index, "back on entry item; restoring grid scroll");
            effects.push(BridgeEffect::RestoreScroll { anchor: session.anchor });
        } else {
            let grid_index = session.window_start + index;
            if !visible.contains(&grid_index) {
                debug!(grid_index, "scrolling grid to follow preview");
                effects.push(BridgeEffect::ScrollGridTo { index: grid_index });
            }
        }
        effects.push(BridgeEffect::LiveTargetChanged(
            self.live_target().map(|r| r.to_string()),
        ));
        effects
    }

    pub fn set_blank(&mut self, identity: &str, active: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if active {
            session.blanked = Some(identity.to_owned());
        } else if !session.exit_locked && session.blanked.as_deref() == Some(identity) {
            session.blanked = None;
        }
    }

    pub fn on_exit_beginning(&mut self, identity: &str) {
        if let Some(session) = self.session.as_mut() {
            session.blanked = Some(identity.to_owned());
            session.exit_locked = true;
        }
    }

    /// Preview is gone; un-blank and forget the anchor.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            info!("preview session closed");
        }
    }

    /// The grid now shows `identities`: end any session and forget bounds
    /// of items that left the grid.
    pub fn replace_grid(&mut self, identities: &[String]) {
        self.close();
        let keep: hashbrown::HashSet<&str> = identities.iter().map(String::as_str).collect();
        self.registry.prune(|id| keep.contains(id));
    }

    /// Route one orchestrator effect through the bridge.
    pub fn apply(&mut self, effect: &PreviewEffect, visible: Range<usize>) -> BridgeEffects {
        match effect {
            PreviewEffect::PageSettled { index, identity } => {
                return self.on_page_settled(*index, identity, visible);
            }
            PreviewEffect::BlankSource { identity, active } => self.set_blank(identity, *active),
            PreviewEffect::ExitBeginning { identity } => self.on_exit_beginning(identity),
            PreviewEffect::Dismiss => self.close(),
            PreviewEffect::RequestDecode { .. } | PreviewEffect::ImmersiveChanged(_) => {}
        }
        BridgeEffects::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item-{i}")).collect()
    }

    #[test]
    fn window_is_centered_and_clamped() {
        let ids = grid(100);
        let mut bridge = GridBridge::new(30);
        let req = bridge
            .open_preview(&ids, 10, Some(Rect::new(1, 2, 3, 4)), GridAnchor::default())
            .unwrap();
        assert_eq!(req.identities.len(), 41);
        assert_eq!(req.identities[0], "item-0");
        assert_eq!(req.focus_index, 10);
        assert_eq!(req.entry_bounds.as_deref(), Some("1,2,3,4"));

        let req = bridge.open_preview(&ids, 80, None, GridAnchor::default()).unwrap();
        assert_eq!(req.identities.first().map(String::as_str), Some("item-50"));
        assert_eq!(req.identities.last().map(String::as_str), Some("item-99"));
        assert_eq!(req.focus_index, 30);
        assert_eq!(req.entry_bounds, None);
    }

    #[test]
    fn tap_outside_grid_opens_nothing() {
        let mut bridge = GridBridge::new(30);
        assert!(bridge.open_preview(&grid(3), 3, None, GridAnchor::default()).is_none());
        assert!(!bridge.is_open());
    }

    #[test]
    fn entry_rect_falls_back_to_registry() {
        let ids = grid(5);
        let mut bridge = GridBridge::new(30);
        bridge.report_bounds("item-2", Rect::new(10, 20, 30, 40));
        let req = bridge.open_preview(&ids, 2, None, GridAnchor::default()).unwrap();
        assert_eq!(req.entry_bounds.as_deref(), Some("10,20,30,40"));
    }

    #[test]
    fn bounds_of_current_page_are_republished() {
        let ids = grid(5);
        let mut bridge = GridBridge::new(30);
        bridge.open_preview(&ids, 1, None, GridAnchor::default());
        assert_eq!(bridge.report_bounds("item-3", Rect::new(0, 0, 5, 5)), None);
        assert_eq!(
            bridge.report_bounds("item-1", Rect::new(7, 8, 9, 10)),
            Some(BridgeEffect::LiveTargetChanged(Some("7,8,9,10".into())))
        );
        // unchanged geometry is not republished
        assert_eq!(bridge.report_bounds("item-1", Rect::new(7, 8, 9, 10)), None);
    }

    #[test]
    fn settling_elsewhere_scrolls_only_when_offscreen() {
        let ids = grid(100);
        let mut bridge = GridBridge::new(30);
        bridge.open_preview(&ids, 40, None, GridAnchor { index: 36, offset: 4.0 });

        let fx = bridge.on_page_settled(31, "item-41", 32..48);
        assert_eq!(fx.as_slice(), &[BridgeEffect::LiveTargetChanged(None)]);

        let fx = bridge.on_page_settled(45, "item-55", 32..48);
        assert_eq!(fx[0], BridgeEffect::ScrollGridTo { index: 55 });
    }

    #[test]
    fn blanking_reverts_on_spring_back_but_holds_after_exit() {
        let ids = grid(5);
        let mut bridge = GridBridge::new(30);
        bridge.open_preview(&ids, 1, None, GridAnchor::default());

        bridge.set_blank("item-1", true);
        assert!(bridge.is_blanked("item-1"));
        bridge.set_blank("item-1", false);
        assert!(!bridge.is_blanked("item-1"));

        bridge.set_blank("item-1", true);
        bridge.on_exit_beginning("item-1");
        bridge.set_blank("item-1", false);
        assert!(bridge.is_blanked("item-1"));

        bridge.apply(&PreviewEffect::Dismiss, 0..5);
        assert!(!bridge.is_blanked("item-1"));
        assert!(!bridge.is_open());
    }

    #[test]
    fn replacing_the_grid_closes_session_and_keeps_shared_bounds() {
        let mut bridge = GridBridge::new(30);
        bridge.report_bounds("item-0", Rect::new(0, 0, 10, 10));
        bridge.report_bounds("item-1", Rect::new(10, 0, 10, 10));
        bridge.open_preview(&grid(2), 1, None, GridAnchor::default());
        bridge.set_blank("item-1", true);

        let next = vec!["item-1".to_owned(), "other".to_owned()];
        bridge.replace_grid(&next);
        assert!(!bridge.is_open());
        assert!(!bridge.is_blanked("item-1"));
        assert_eq!(bridge.registry().get("item-0"), None);
        assert_eq!(bridge.registry().get("item-1"), Some(Rect::new(10, 0, 10, 10)));
        assert_eq!(bridge.registry().len(), 1);
    }

    #[test]
    fn prune_forgets_removed_items() {
        let mut registry = BoundsRegistry::new();
        registry.report("a", Rect::new(0, 0, 1, 1));
        registry.report("b", Rect::new(0, 0, 1, 1));
        registry.prune(|id| id != "a");
        assert_eq!(registry.get("a"), None);
        assert_eq!(registry.len(), 1);
    }
}
