//! Bounds geometry shared by the grid, the preview overlay and the pager.
//!
//! All rectangles live in one integer pixel space (window space unless a
//! caller converts them with [`Rect::offset`]). The textual form
//! `"left,top,width,height"` is how bounds cross the grid -> preview
//! boundary.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Integer size in pixels. A zero dimension means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const ZERO: Size = Size { width: 0, height: 0 };

    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// True when either dimension is unknown.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Float 2D vector used for gesture deltas and pan offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Rectangle in screen pixels. Width and height are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRectError {
    #[error("expected 4 comma separated fields, found {0}")]
    FieldCount(usize),
    #[error("field {index} is not an integer: {value:?}")]
    NotNumeric { index: usize, value: String },
    #[error("negative size {width}x{height}")]
    NegativeSize { width: i32, height: i32 },
}

impl Rect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Rectangle covering a whole container, anchored at the origin.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Parse `"l,t,w,h"`. Anything malformed yields `None`.
    pub fn parse(s: &str) -> Option<Rect> {
        s.parse().ok()
    }

    /// Pure translation; converts between window and host-local space.
    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }

    /// Whether `other` lies fully inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Scale about a pivot point, then translate. Matches how a graphics
    /// layer with a center transform origin renders a scaled, dragged page.
    pub fn scaled_about(&self, pivot_x: f32, pivot_y: f32, scale: f32, dx: f32, dy: f32) -> Rect {
        let scale = scale.max(0.0);
        let l = pivot_x + (self.left as f32 - pivot_x) * scale + dx;
        let t = pivot_y + (self.top as f32 - pivot_y) * scale + dy;
        Rect::new(
            l.round() as i32,
            t.round() as i32,
            (self.width as f32 * scale).round() as i32,
            (self.height as f32 * scale).round() as i32,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.width, self.height)
    }
}

impl FromStr for Rect {
    type Err = ParseRectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ParseRectError::FieldCount(parts.len()));
        }
        let mut fields = [0i32; 4];
        for (index, part) in parts.iter().enumerate() {
            fields[index] = part.parse::<i32>().map_err(|_| ParseRectError::NotNumeric {
                index,
                value: (*part).to_string(),
            })?;
        }
        let [left, top, width, height] = fields;
        if width < 0 || height < 0 {
            return Err(ParseRectError::NegativeSize { width, height });
        }
        Ok(Rect {
            left,
            top,
            width,
            height,
        })
    }
}

/// Aspect-preserving containment of `content` inside `container`, centered.
///
/// When the content size is unknown the full container is returned.
pub fn fit_rect(container: Size, content: Size) -> Rect {
    if container.is_empty() {
        return Rect::default();
    }
    if content.is_empty() {
        return Rect::from_size(container);
    }
    let cw = container.width as f64;
    let ch = container.height as f64;
    let scale = (cw / content.width as f64).min(ch / content.height as f64);
    let w = ((content.width as f64 * scale).round() as i32).clamp(0, container.width);
    let h = ((content.height as f64 * scale).round() as i32).clamp(0, container.height);
    Rect::new((container.width - w) / 2, (container.height - h) / 2, w, h)
}

/// Field-wise linear interpolation; `t` is clamped to `[0, 1]`.
pub fn lerp(a: Rect, b: Rect, t: f32) -> Rect {
    let t = t.clamp(0.0, 1.0) as f64;
    let mix = |x: i32, y: i32| -> i32 { (x as f64 + (y as f64 - x as f64) * t).round() as i32 };
    Rect::new(
        mix(a.left, b.left),
        mix(a.top, b.top),
        mix(a.width, b.width),
        mix(a.height, b.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_four_integers_with_spaces() {
        assert_eq!(Rect::parse("100, 200,50 ,50"), Some(Rect::new(100, 200, 50, 50)));
        assert_eq!(Rect::parse("-4,-8,10,10"), Some(Rect::new(-4, -8, 10, 10)));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(Rect::parse("not,a,rect"), None);
        assert_eq!(Rect::parse("1,2,3"), None);
        assert_eq!(Rect::parse("1,2,3,4,5"), None);
        assert_eq!(Rect::parse(""), None);
        assert_eq!(Rect::parse("1,2,x,4"), None);
        assert_eq!(Rect::parse("1,2,-3,4"), None);
    }

    #[test]
    fn parse_error_reports_reason() {
        assert_eq!("1,2,3".parse::<Rect>(), Err(ParseRectError::FieldCount(3)));
        assert!(matches!(
            "1,b,3,4".parse::<Rect>(),
            Err(ParseRectError::NotNumeric { index: 1, .. })
        ));
    }

    #[test]
    fn serialized_form_parses_back() {
        for r in [Rect::new(0, 0, 0, 0), Rect::new(12, 900, 270, 270), Rect::new(3, 7, 1080, 1920)] {
            assert_eq!(Rect::parse(&r.to_string()), Some(r));
        }
    }

    #[test]
    fn fit_rect_square_in_portrait_container() {
        let r = fit_rect(Size::new(1080, 1920), Size::new(500, 500));
        assert_eq!(r, Rect::new(0, 420, 1080, 1080));
    }

    #[test]
    fn fit_rect_stays_inside_and_keeps_aspect() {
        let container = Size::new(1080, 1920);
        let rc = Rect::from_size(container);
        for content in [
            Size::new(4096, 2160),
            Size::new(2160, 4096),
            Size::new(4500, 1500),
            Size::new(1500, 4500),
            Size::new(1, 1),
            Size::new(3500, 2333),
        ] {
            let r = fit_rect(container, content);
            assert!(rc.contains_rect(&r), "{r:?} escapes {rc:?}");
            let want = content.width as f64 / content.height as f64;
            let got = r.width as f64 / r.height as f64;
            // one pixel of rounding on the short side
            let tolerance = want / r.height.min(r.width) as f64 + 1.0 / r.height as f64;
            assert!((want - got).abs() <= tolerance.max(0.01), "{content:?} -> {r:?}");
        }
    }

    #[test]
    fn fit_rect_unknown_content_is_full_container() {
        let container = Size::new(800, 600);
        assert_eq!(fit_rect(container, Size::ZERO), Rect::new(0, 0, 800, 600));
    }

    #[test]
    fn lerp_endpoints_are_exact() {
        let a = Rect::new(100, 200, 50, 50);
        let b = Rect::new(0, 420, 1080, 1080);
        assert_eq!(lerp(a, b, 0.0), a);
        assert_eq!(lerp(a, b, 1.0), b);
        assert_eq!(lerp(a, b, -3.0), a);
        assert_eq!(lerp(a, b, 7.0), b);
        assert_eq!(lerp(a, b, 0.5), Rect::new(50, 310, 565, 565));
    }

    #[test]
    fn lerp_of_identical_rects_is_identity() {
        let a = Rect::new(-3, 17, 640, 480);
        for i in 0..=20 {
            assert_eq!(lerp(a, a, i as f32 / 20.0), a);
        }
    }

    #[test]
    fn offset_translates_only() {
        let r = Rect::new(10, 20, 30, 40).offset(-10, 5);
        assert_eq!(r, Rect::new(0, 25, 30, 40));
    }

    #[test]
    fn scaled_about_center_shrinks_symmetrically() {
        let r = Rect::new(0, 420, 1080, 1080);
        let s = r.scaled_about(540.0, 960.0, 0.5, 0.0, 40.0);
        assert_eq!(s, Rect::new(270, 730, 540, 540));
    }
}
