//! Gallery grid and zoomable preview pager with shared-bounds transitions.
//!
//! Every component here is a toolkit-agnostic state machine: feed it an
//! event and the current [`std::time::Instant`], execute the effects it
//! returns, and draw whatever its render/snapshot methods describe. The
//! `hero-gallery` binary is an `egui` host for these machines.

pub mod animation;
pub mod bridge;
pub mod carousel;
pub mod config;
pub mod decode;
pub mod drag;
pub mod geometry;
pub mod logging;
pub mod media;
pub mod preview;
pub mod zoom;

pub use bridge::{BoundsRegistry, BridgeEffect, GridAnchor, GridBridge};
pub use config::Config;
pub use geometry::{fit_rect, lerp, Rect, Size, Vec2};
pub use preview::{PreviewEffect, PreviewEvent, PreviewFrame, PreviewPager, PreviewRequest, TransitionState};
