//! Content identities: image and video files on disk and procedural
//! `synthetic:` items.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::Size;

/// Image extensions the decoder accepts.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "ico", "tiff", "tif"];

/// Video extensions listed in the grid. Only a badge is drawn for them;
/// their frames are never decoded.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "wmv", "flv", "m4v", "3gp", "ogv"];

const SYNTHETIC_PREFIX: &str = "synthetic:";

/// What a grid cell shows on top of its thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    /// Duration is known only for synthetic clips.
    Video { duration: Option<Duration> },
}

/// Where an identity's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    /// Gradient of the given size around a base colour.
    Synthetic { size: Size, rgb: [u8; 3] },
}

impl Source {
    /// `synthetic:WxH:RRGGBB[:vMILLIS]`, anything else is a file path.
    /// Returns `None` for a malformed synthetic identity.
    pub fn from_identity(identity: &str) -> Option<Source> {
        let Some(rest) = identity.strip_prefix(SYNTHETIC_PREFIX) else {
            return Some(Source::File(PathBuf::from(identity)));
        };
        let mut fields = rest.split(':');
        let (dims, color) = (fields.next()?, fields.next()?);
        if let Some(tag) = fields.next() {
            synthetic_clip_length(tag)?;
        }
        if fields.next().is_some() {
            return None;
        }
        let (w, h) = dims.split_once('x')?;
        let width: i32 = w.parse().ok()?;
        let height: i32 = h.parse().ok()?;
        if width <= 0 || height <= 0 || color.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(color, 16).ok()?;
        Some(Source::Synthetic {
            size: Size::new(width, height),
            rgb: [(value >> 16) as u8, (value >> 8) as u8, value as u8],
        })
    }
}

fn synthetic_clip_length(tag: &str) -> Option<Duration> {
    let millis: u64 = tag.strip_prefix('v')?.parse().ok()?;
    Some(Duration::from_millis(millis))
}

pub fn synthetic_identity(size: Size, rgb: [u8; 3]) -> String {
    format!(
        "{SYNTHETIC_PREFIX}{}x{}:{:02x}{:02x}{:02x}",
        size.width, size.height, rgb[0], rgb[1], rgb[2]
    )
}

/// A synthetic item that the grid badges as a clip of `length`.
pub fn synthetic_clip_identity(size: Size, rgb: [u8; 3], length: Duration) -> String {
    format!("{}:v{}", synthetic_identity(size, rgb), length.as_millis())
}

pub fn media_kind(identity: &str) -> MediaKind {
    if let Some(rest) = identity.strip_prefix(SYNTHETIC_PREFIX) {
        return match rest.rsplit(':').next().and_then(synthetic_clip_length) {
            Some(length) if rest.matches(':').count() == 2 => MediaKind::Video { duration: Some(length) },
            _ => MediaKind::Image,
        };
    }
    if is_supported_video(Path::new(identity)) {
        MediaKind::Video { duration: None }
    } else {
        MediaKind::Image
    }
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(length: Duration) -> String {
    let total = length.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// A deterministic gallery of `count` synthetic items with varied aspect
/// ratios and colours.
pub fn synthetic_gallery(count: usize) -> Vec<String> {
    const SHAPES: [(i32, i32); 6] = [(1200, 800), (800, 1200), (1000, 1000), (1920, 1080), (900, 1600), (1600, 700)];
    (0..count)
        .map(|i| {
            let (w, h) = SHAPES[i % SHAPES.len()];
            let size = Size::new(w, h);
            let rgb = hue_to_rgb(((i * 47) % 360) as f32);
            if i % 7 == 3 {
                let length = Duration::from_secs(((i * 53) % 900 + 4) as u64);
                synthetic_clip_identity(size, rgb, length)
            } else {
                synthetic_identity(size, rgb)
            }
        })
        .collect()
}

fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    let c = |v: f32| (60.0 + v * 170.0) as u8;
    [c(r), c(g), c(b)]
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Supported images and videos directly inside `dir`, naturally sorted by
/// file name.
pub fn media_in_directory(dir: &Path) -> Vec<String> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && (is_supported_image(p) || is_supported_video(p)))
        .collect();

    images.sort_by(|a, b| {
        natord::compare(
            a.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            b.file_name().and_then(|n| n.to_str()).unwrap_or(""),
        )
    });

    images
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

/// Natural ordering for file names: digit runs compare numerically.
pub mod natord {
    use std::cmp::Ordering;
    use std::iter::Peekable;
    use std::str::Chars;

    fn take_number(chars: &mut Peekable<Chars<'_>>) -> u64 {
        let mut value: u64 = 0;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            value = value.saturating_mul(10).saturating_add(d as u64);
            chars.next();
        }
        value
    }

    pub fn compare(a: &str, b: &str) -> Ordering {
        let mut a_chars = a.chars().peekable();
        let mut b_chars = b.chars().peekable();

        loop {
            match (a_chars.peek(), b_chars.peek()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(&ac), Some(&bc)) => {
                    if ac.is_ascii_digit() && bc.is_ascii_digit() {
                        match take_number(&mut a_chars).cmp(&take_number(&mut b_chars)) {
                            Ordering::Equal => continue,
                            other => return other,
                        }
                    }
                    let ac_lower = ac.to_lowercase().next().unwrap_or(ac);
                    let bc_lower = bc.to_lowercase().next().unwrap_or(bc);
                    match ac_lower.cmp(&bc_lower) {
                        Ordering::Equal => {
                            a_chars.next();
                            b_chars.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn synthetic_identity_round_trips() {
        let id = synthetic_identity(Size::new(640, 480), [0x12, 0xab, 0xff]);
        assert_eq!(id, "synthetic:640x480:12abff");
        assert_eq!(
            Source::from_identity(&id),
            Some(Source::Synthetic {
                size: Size::new(640, 480),
                rgb: [0x12, 0xab, 0xff]
            })
        );
    }

    #[test]
    fn malformed_synthetic_identities_are_rejected() {
        for bad in ["synthetic:", "synthetic:10x:ffffff", "synthetic:0x10:ffffff", "synthetic:10x10:fff", "synthetic:10x10:zzzzzz"] {
            assert_eq!(Source::from_identity(bad), None, "{bad}");
        }
    }

    #[test]
    fn plain_identities_are_paths() {
        assert_eq!(
            Source::from_identity("/tmp/a.png"),
            Some(Source::File(PathBuf::from("/tmp/a.png")))
        );
    }

    #[test]
    fn natural_order() {
        assert_eq!(natord::compare("img2.png", "img10.png"), Ordering::Less);
        assert_eq!(natord::compare("IMG_3", "img_3"), Ordering::Equal);
        assert_eq!(natord::compare("a10b", "a10a"), Ordering::Greater);
    }

    #[test]
    fn directory_listing_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["p10.png", "p2.jpg", "notes.txt", "p1.webp", "p3.MP4"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = media_in_directory(dir.path())
            .into_iter()
            .map(|p| Path::new(&p).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["p1.webp", "p2.jpg", "p3.MP4", "p10.png"]);
    }

    #[test]
    fn video_kinds_and_badge_text() {
        assert_eq!(media_kind("/media/clip.mov"), MediaKind::Video { duration: None });
        assert_eq!(media_kind("/media/photo.jpg"), MediaKind::Image);

        let clip = synthetic_clip_identity(Size::new(160, 90), [1, 2, 3], Duration::from_millis(83_500));
        assert_eq!(clip, "synthetic:160x90:010203:v83500");
        assert_eq!(
            media_kind(&clip),
            MediaKind::Video { duration: Some(Duration::from_millis(83_500)) }
        );
        assert!(matches!(Source::from_identity(&clip), Some(Source::Synthetic { .. })));
        assert_eq!(media_kind("synthetic:160x90:010203"), MediaKind::Image);
        assert_eq!(Source::from_identity("synthetic:160x90:010203:x1"), None);

        assert_eq!(format_duration(Duration::from_millis(83_500)), "1:23");
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 7 * 60 + 9)), "3:07:09");
    }

    #[test]
    fn gallery_is_deterministic() {
        assert_eq!(synthetic_gallery(8), synthetic_gallery(8));
        assert!(synthetic_gallery(8)
            .iter()
            .all(|id| matches!(Source::from_identity(id), Some(Source::Synthetic { .. }))));
        assert!(matches!(media_kind(&synthetic_gallery(8)[3]), MediaKind::Video { duration: Some(_) }));
    }
}
