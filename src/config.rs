//! Configuration module for the preview, carousel and grid tuning knobs.
//! Values are plain numbers and durations read from an INI file.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

const DEFAULT_CONFIG_INI: &str = include_str!("../config.ini");

/// Preview pager, drag-to-dismiss and zoom settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Maximum zoom, as a multiple of the image's own pixel size
    pub max_zoom_scale: f32,
    /// Zoom a double tap jumps to, relative to fit
    pub double_tap_scale: f32,
    /// How much the background fades at full drag (0..1)
    pub drag_alpha_factor: f32,
    /// How much the content shrinks at full drag (0..1)
    pub drag_max_shrink: f32,
    /// Exponent applied to the drag fraction (>= 1, higher = stiffer start)
    pub drag_easing_exponent: f32,
    /// Drag distance that commits a dismiss, in density-independent units
    pub dismiss_threshold_dp: f32,
    pub entry_duration_ms: u32,
    pub exit_duration_ms: u32,
    /// Bounded wait for the image's intrinsic size before entry falls back to full screen
    pub entry_size_timeout_ms: u32,
    pub spring_back_ms: u32,
    pub chrome_fade_ms: u32,
    /// High-res decode is requested once zoom passes this multiple of fit
    pub high_res_zoom_factor: f32,
    pub high_res_crossfade_ms: u32,
    /// Horizontal pan (px) needed before an edge fling requests a page change
    pub edge_fling_dead_zone: f32,
    /// Background color as RGB (0-255)
    pub background_rgb: [u8; 3],
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_zoom_scale: 3.0,
            double_tap_scale: 2.5,
            drag_alpha_factor: 0.6,
            drag_max_shrink: 0.30,
            drag_easing_exponent: 3.0,
            dismiss_threshold_dp: 32.0,
            entry_duration_ms: 280,
            exit_duration_ms: 260,
            entry_size_timeout_ms: 250,
            spring_back_ms: 220,
            chrome_fade_ms: 200,
            high_res_zoom_factor: 1.25,
            high_res_crossfade_ms: 180,
            edge_fling_dead_zone: 8.0,
            background_rgb: [0, 0, 0],
        }
    }
}

impl PreviewConfig {
    pub fn entry_duration(&self) -> Duration {
        Duration::from_millis(self.entry_duration_ms as u64)
    }

    pub fn exit_duration(&self) -> Duration {
        Duration::from_millis(self.exit_duration_ms as u64)
    }

    pub fn entry_size_timeout(&self) -> Duration {
        Duration::from_millis(self.entry_size_timeout_ms as u64)
    }

    pub fn spring_back(&self) -> Duration {
        Duration::from_millis(self.spring_back_ms as u64)
    }

    pub fn chrome_fade(&self) -> Duration {
        Duration::from_millis(self.chrome_fade_ms as u64)
    }

    pub fn high_res_crossfade(&self) -> Duration {
        Duration::from_millis(self.high_res_crossfade_ms as u64)
    }
}

/// Thumbnail strip layout and phase timing.
#[derive(Debug, Clone, PartialEq)]
pub struct CarouselConfig {
    pub item_height: f32,
    pub base_spacing: f32,
    /// Height : width ratio of an unfocused thumbnail
    pub height_width_aspect: f32,
    /// Width multiplier of the focused thumbnail
    pub center_width_scale: f32,
    /// Gutter around the focused thumbnail, as a multiple of base spacing
    pub center_gutter_scale: f32,
    pub animation_ms: u32,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            item_height: 36.0,
            base_spacing: 1.5,
            height_width_aspect: 1.6,
            center_width_scale: 1.6,
            center_gutter_scale: 3.0,
            animation_ms: 250,
        }
    }
}

impl CarouselConfig {
    pub fn animation(&self) -> Duration {
        Duration::from_millis(self.animation_ms as u64)
    }
}

/// Media grid settings used by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub columns: usize,
    pub spacing: f32,
    /// Identities handed to the preview on each side of the tapped one
    pub preview_window_radius: usize,
    /// Number of generated items when no media directory is given
    pub synthetic_items: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 4,
            spacing: 2.0,
            preview_window_radius: 30,
            synthetic_items: 120,
        }
    }
}

/// Application configuration loaded from INI file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub preview: PreviewConfig,
    pub carousel: CarouselConfig,
    pub grid: GridConfig,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Preview,
    Carousel,
    Grid,
}

impl Config {
    /// Get the configuration directory, creating it if missing.
    fn config_dir() -> PathBuf {
        let dir = directories::ProjectDirs::from("dev", "hero-gallery", "hero-gallery")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("could not create config dir {:?}: {}", dir, e);
        }

        dir
    }

    /// Settings file path.
    ///
    /// Seeds the user copy from a `config.ini` next to the executable
    /// (placed there by the build script) the first time.
    pub fn config_path() -> PathBuf {
        let config = Self::config_dir().join("config.ini");

        if !config.exists() {
            if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(|p| p.to_path_buf())) {
                let shipped = exe_dir.join("config.ini");
                if shipped.exists() {
                    if let Err(e) = fs::copy(&shipped, &config) {
                        warn!("could not seed config from {:?}: {}", shipped, e);
                    }
                }
            }
        }

        config
    }

    /// Load configuration from INI file, falling back to defaults.
    pub fn load() -> Self {
        let config_path = Self::config_path();

        if !config_path.exists() {
            if let Err(e) = fs::write(&config_path, DEFAULT_CONFIG_INI) {
                warn!("could not write default config to {:?}: {}", config_path, e);
            }
            return Self::parse_ini(DEFAULT_CONFIG_INI);
        }

        match fs::read_to_string(&config_path) {
            Ok(content) => {
                debug!("loaded config from {:?}", config_path);
                Self::parse_ini(&content)
            }
            Err(e) => {
                warn!("could not read {:?}: {}; using defaults", config_path, e);
                Self::parse_ini(DEFAULT_CONFIG_INI)
            }
        }
    }

    /// Parse INI content into Config. Unknown keys are ignored, bad values
    /// keep their defaults, out-of-range values are clamped.
    pub fn parse_ini(content: &str) -> Self {
        let mut config = Config::default();
        let mut section = Section::None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                section = if name.eq_ignore_ascii_case("preview") {
                    Section::Preview
                } else if name.eq_ignore_ascii_case("carousel") || name.eq_ignore_ascii_case("thumbnails") {
                    Section::Carousel
                } else if name.eq_ignore_ascii_case("grid") {
                    Section::Grid
                } else {
                    Section::None
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match section {
                Section::Preview => config.apply_preview_key(&key, value),
                Section::Carousel => config.apply_carousel_key(&key, value),
                Section::Grid => config.apply_grid_key(&key, value),
                Section::None => {}
            }
        }

        config
    }

    fn apply_preview_key(&mut self, key: &str, value: &str) {
        let p = &mut self.preview;
        match key {
            "max_zoom_scale" | "max_scale" => {
                if let Some(v) = parse_f32(key, value) {
                    p.max_zoom_scale = v.clamp(1.0, 50.0);
                }
            }
            "double_tap_scale" => {
                if let Some(v) = parse_f32(key, value) {
                    p.double_tap_scale = v.clamp(1.0, 20.0);
                }
            }
            "drag_alpha_factor" => {
                if let Some(v) = parse_f32(key, value) {
                    p.drag_alpha_factor = v.clamp(0.0, 1.0);
                }
            }
            "drag_max_shrink" => {
                if let Some(v) = parse_f32(key, value) {
                    p.drag_max_shrink = v.clamp(0.0, 1.0);
                }
            }
            "drag_easing_exponent" | "drag_easing_power" => {
                if let Some(v) = parse_f32(key, value) {
                    p.drag_easing_exponent = v.clamp(1.0, 10.0);
                }
            }
            "dismiss_threshold_dp" | "dismiss_threshold" => {
                if let Some(v) = parse_f32(key, value) {
                    p.dismiss_threshold_dp = v.clamp(1.0, 1000.0);
                }
            }
            "entry_duration_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.entry_duration_ms = v;
                }
            }
            "exit_duration_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.exit_duration_ms = v;
                }
            }
            "entry_size_timeout_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.entry_size_timeout_ms = v;
                }
            }
            "spring_back_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.spring_back_ms = v;
                }
            }
            "chrome_fade_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.chrome_fade_ms = v;
                }
            }
            "high_res_zoom_factor" => {
                if let Some(v) = parse_f32(key, value) {
                    p.high_res_zoom_factor = v.clamp(1.0, 10.0);
                }
            }
            "high_res_crossfade_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    p.high_res_crossfade_ms = v;
                }
            }
            "edge_fling_dead_zone" => {
                if let Some(v) = parse_f32(key, value) {
                    p.edge_fling_dead_zone = v.clamp(0.0, 200.0);
                }
            }
            "background_rgb" => match parse_rgb_triplet(value) {
                Some(rgb) => p.background_rgb = rgb,
                None => warn!("ignoring malformed background_rgb {:?}", value),
            },
            _ => {}
        }
    }

    fn apply_carousel_key(&mut self, key: &str, value: &str) {
        let c = &mut self.carousel;
        match key {
            "item_height" => {
                if let Some(v) = parse_f32(key, value) {
                    c.item_height = v.clamp(8.0, 400.0);
                }
            }
            "base_spacing" => {
                if let Some(v) = parse_f32(key, value) {
                    c.base_spacing = v.clamp(0.0, 100.0);
                }
            }
            "height_width_aspect" => {
                if let Some(v) = parse_f32(key, value) {
                    c.height_width_aspect = v.clamp(0.1, 10.0);
                }
            }
            "center_width_scale" => {
                if let Some(v) = parse_f32(key, value) {
                    c.center_width_scale = v.clamp(1.0, 5.0);
                }
            }
            "center_gutter_scale" => {
                if let Some(v) = parse_f32(key, value) {
                    c.center_gutter_scale = v.clamp(1.0, 20.0);
                }
            }
            "animation_ms" => {
                if let Some(v) = parse_ms(key, value) {
                    c.animation_ms = v;
                }
            }
            _ => {}
        }
    }

    fn apply_grid_key(&mut self, key: &str, value: &str) {
        let g = &mut self.grid;
        match key {
            "columns" => {
                if let Some(v) = parse_usize(key, value) {
                    g.columns = v.clamp(1, 16);
                }
            }
            "spacing" => {
                if let Some(v) = parse_f32(key, value) {
                    g.spacing = v.clamp(0.0, 64.0);
                }
            }
            "preview_window_radius" => {
                if let Some(v) = parse_usize(key, value) {
                    g.preview_window_radius = v.clamp(1, 500);
                }
            }
            "synthetic_items" => {
                if let Some(v) = parse_usize(key, value) {
                    g.synthetic_items = v.min(10_000);
                }
            }
            _ => {}
        }
    }

    /// Save configuration to INI file
    pub fn save(&self) {
        let path = Self::config_path();
        if let Err(e) = fs::write(&path, self.to_ini()) {
            warn!("could not save config to {:?}: {}", path, e);
        }
    }

    /// Render the configuration in the same layout as the shipped template.
    pub fn to_ini(&self) -> String {
        let p = &self.preview;
        let c = &self.carousel;
        let g = &self.grid;
        let mut content = String::new();

        content.push_str("; Hero Gallery Configuration\n\n");

        content.push_str("[Preview]\n");
        content.push_str("; Maximum zoom as a multiple of the image's own pixels\n");
        content.push_str(&format!("max_zoom_scale = {}\n", p.max_zoom_scale));
        content.push_str("; Zoom a double tap jumps to, relative to fit-to-screen\n");
        content.push_str(&format!("double_tap_scale = {}\n\n", p.double_tap_scale));

        content.push_str("; Drag-to-dismiss feel\n");
        content.push_str(&format!("drag_alpha_factor = {}\n", p.drag_alpha_factor));
        content.push_str(&format!("drag_max_shrink = {}\n", p.drag_max_shrink));
        content.push_str(&format!("drag_easing_exponent = {}\n", p.drag_easing_exponent));
        content.push_str(&format!("dismiss_threshold_dp = {}\n\n", p.dismiss_threshold_dp));

        content.push_str("; Transition timing (milliseconds)\n");
        content.push_str(&format!("entry_duration_ms = {}\n", p.entry_duration_ms));
        content.push_str(&format!("exit_duration_ms = {}\n", p.exit_duration_ms));
        content.push_str(&format!("entry_size_timeout_ms = {}\n", p.entry_size_timeout_ms));
        content.push_str(&format!("spring_back_ms = {}\n", p.spring_back_ms));
        content.push_str(&format!("chrome_fade_ms = {}\n\n", p.chrome_fade_ms));

        content.push_str("; Progressive loading\n");
        content.push_str(&format!("high_res_zoom_factor = {}\n", p.high_res_zoom_factor));
        content.push_str(&format!("high_res_crossfade_ms = {}\n\n", p.high_res_crossfade_ms));

        content.push_str("; Pan distance past a zoomed image's edge that flips the page\n");
        content.push_str(&format!("edge_fling_dead_zone = {}\n\n", p.edge_fling_dead_zone));

        content.push_str("; Background color (RGB 0-255)\n");
        content.push_str(&format!(
            "background_rgb = {}, {}, {}\n\n",
            p.background_rgb[0], p.background_rgb[1], p.background_rgb[2]
        ));

        content.push_str("[Carousel]\n");
        content.push_str(&format!("item_height = {}\n", c.item_height));
        content.push_str(&format!("base_spacing = {}\n", c.base_spacing));
        content.push_str(&format!("height_width_aspect = {}\n", c.height_width_aspect));
        content.push_str(&format!("center_width_scale = {}\n", c.center_width_scale));
        content.push_str(&format!("center_gutter_scale = {}\n", c.center_gutter_scale));
        content.push_str(&format!("animation_ms = {}\n\n", c.animation_ms));

        content.push_str("[Grid]\n");
        content.push_str(&format!("columns = {}\n", g.columns));
        content.push_str(&format!("spacing = {}\n", g.spacing));
        content.push_str(&format!("preview_window_radius = {}\n", g.preview_window_radius));
        content.push_str(&format!("synthetic_items = {}\n", g.synthetic_items));

        content
    }
}

fn parse_f32(key: &str, value: &str) -> Option<f32> {
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!("ignoring malformed value for {}: {:?}", key, value);
            None
        }
    }
}

fn parse_ms(key: &str, value: &str) -> Option<u32> {
    match value.parse::<u32>() {
        Ok(v) => Some(v.min(10_000)),
        Err(_) => {
            warn!("ignoring malformed duration for {}: {:?}", key, value);
            None
        }
    }
}

fn parse_usize(key: &str, value: &str) -> Option<usize> {
    match value.parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring malformed count for {}: {:?}", key, value);
            None
        }
    }
}

fn parse_rgb_triplet(value: &str) -> Option<[u8; 3]> {
    let parts: Vec<&str> = value
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 {
        return None;
    }
    let r = parts[0].parse::<u8>().ok()?;
    let g = parts[1].parse::<u8>().ok()?;
    let b = parts[2].parse::<u8>().ok()?;
    Some([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_template_matches_defaults() {
        assert_eq!(Config::parse_ini(DEFAULT_CONFIG_INI), Config::default());
    }

    #[test]
    fn parses_sections_and_clamps() {
        let ini = "\
[Preview]
max_zoom_scale = 5
drag_alpha_factor = 1.7
dismiss_threshold_dp = 120
background_rgb = 10, 20, 30

[Carousel]
center_width_scale = 2.0
animation_ms = 400

[Grid]
columns = 0
";
        let cfg = Config::parse_ini(ini);
        assert_eq!(cfg.preview.max_zoom_scale, 5.0);
        assert_eq!(cfg.preview.drag_alpha_factor, 1.0);
        assert_eq!(cfg.preview.dismiss_threshold_dp, 120.0);
        assert_eq!(cfg.preview.background_rgb, [10, 20, 30]);
        assert_eq!(cfg.carousel.center_width_scale, 2.0);
        assert_eq!(cfg.carousel.animation_ms, 400);
        assert_eq!(cfg.grid.columns, 1);
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let cfg = Config::parse_ini("[Preview]\nexit_duration_ms = soon\nmax_zoom_scale = NaN\n");
        assert_eq!(cfg.preview.exit_duration_ms, 260);
        assert_eq!(cfg.preview.max_zoom_scale, 3.0);
    }

    #[test]
    fn keys_outside_known_sections_are_ignored() {
        let cfg = Config::parse_ini("max_zoom_scale = 9\n[Video]\nmax_zoom_scale = 9\n");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn written_ini_parses_back() {
        let mut cfg = Config::default();
        cfg.preview.dismiss_threshold_dp = 48.0;
        cfg.carousel.item_height = 40.0;
        cfg.grid.preview_window_radius = 12;
        assert_eq!(Config::parse_ini(&cfg.to_ini()), cfg);
    }
}
