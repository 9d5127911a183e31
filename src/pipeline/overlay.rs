//! Overlay compositing
//!
//! Draws the cursor highlight and the picture-in-picture inset directly into
//! BGR24 frame buffers. Runs on the writer thread in normal mode only; the
//! degraded path skips it entirely. The inset source is polled at a reduced
//! rate and the scaled result cached between refreshes.

use serde::{Deserialize, Serialize};

use crate::capture::{Geometry, BYTES_PER_PIXEL};

/// Supplies the current cursor position in frame coordinates, if known.
pub type CursorProbe = Box<dyn Fn() -> Option<(i32, i32)> + Send>;

/// Supplies the latest inset picture (camera frame or similar).
pub type InsetProvider = Box<dyn FnMut() -> Option<InsetFrame> + Send>;

/// One BGR24 image from the inset provider, at its native geometry.
pub struct InsetFrame {
    pub pixels: Vec<u8>,
    pub geometry: Geometry,
}

/// How often the inset provider is polled, in composed frames. Holding the
/// previous scaled image between polls keeps a slow provider from flickering.
const INSET_REFRESH_INTERVAL: u32 = 3;

const INSET_PADDING: usize = 12;
const INSET_BORDER: usize = 2;
const INSET_MIN_WIDTH: usize = 32;
const INSET_BORDER_COLOR: [u8; 3] = [30, 30, 30];

const HIGHLIGHT_MIN_RADIUS: u32 = 5;

fn default_true() -> bool {
    true
}

fn default_highlight_radius() -> u32 {
    20
}

fn default_highlight_color() -> [u8; 3] {
    // BGR yellow
    [0, 255, 255]
}

fn default_highlight_alpha() -> f32 {
    0.35
}

fn default_inset_width_pct() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OverlaySettings {
    #[serde(default)]
    pub highlight: HighlightSettings,
    #[serde(default)]
    pub inset: InsetSettings,
}

/// Cursor highlight: a translucent filled circle at the cursor position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_highlight_radius")]
    pub radius: u32,
    /// BGR triple, matching the frame byte order.
    #[serde(default = "default_highlight_color")]
    pub color: [u8; 3],
    #[serde(default = "default_highlight_alpha")]
    pub alpha: f32,
}

impl Default for HighlightSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: default_highlight_radius(),
            color: default_highlight_color(),
            alpha: default_highlight_alpha(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InsetPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Picture-in-picture inset block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsetSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub position: InsetPosition,
    /// Inset width as a percentage of the frame width.
    #[serde(default = "default_inset_width_pct")]
    pub width_pct: u32,
}

impl Default for InsetSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            position: InsetPosition::BottomRight,
            width_pct: default_inset_width_pct(),
        }
    }
}

struct ScaledInset {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

pub struct OverlayComposer {
    settings: OverlaySettings,
    geometry: Geometry,
    cursor_probe: Option<CursorProbe>,
    inset_provider: Option<InsetProvider>,
    scaled_inset: Option<ScaledInset>,
    frames_until_refresh: u32,
}

impl OverlayComposer {
    pub fn new(settings: OverlaySettings, geometry: Geometry) -> Self {
        Self {
            settings,
            geometry,
            cursor_probe: None,
            inset_provider: None,
            scaled_inset: None,
            frames_until_refresh: 0,
        }
    }

    pub fn with_cursor_probe(mut self, probe: CursorProbe) -> Self {
        self.cursor_probe = Some(probe);
        self
    }

    pub fn with_inset_provider(mut self, provider: InsetProvider) -> Self {
        self.inset_provider = Some(provider);
        self
    }

    /// Whether composing would change anything at all.
    pub fn is_active(&self) -> bool {
        (self.settings.highlight.enabled && self.cursor_probe.is_some())
            || (self.settings.inset.enabled && self.inset_provider.is_some())
    }

    /// Apply all enabled overlays to `pixels` in place.
    pub fn compose(&mut self, pixels: &mut [u8]) {
        if pixels.len() != self.geometry.frame_len() {
            return;
        }

        if self.settings.highlight.enabled {
            if let Some(probe) = &self.cursor_probe {
                if let Some((x, y)) = probe() {
                    self.draw_highlight(pixels, x, y);
                }
            }
        }

        if self.settings.inset.enabled && self.inset_provider.is_some() {
            self.refresh_inset();
            self.blit_inset(pixels);
        }
    }

    fn draw_highlight(&self, pixels: &mut [u8], cx: i32, cy: i32) {
        let width = self.geometry.width as i32;
        let height = self.geometry.height as i32;
        let radius = self.settings.highlight.radius.max(HIGHLIGHT_MIN_RADIUS) as i32;
        let alpha = self.settings.highlight.alpha.clamp(0.0, 1.0);
        let color = self.settings.highlight.color;

        let y_min = (cy - radius).max(0);
        let y_max = (cy + radius).min(height - 1);
        let x_min = (cx - radius).max(0);
        let x_max = (cx + radius).min(width - 1);
        let r_sq = radius * radius;

        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy > r_sq {
                    continue;
                }
                let idx = (y as usize * width as usize + x as usize) * BYTES_PER_PIXEL;
                for (c, &target) in color.iter().enumerate() {
                    let base = pixels[idx + c] as f32;
                    pixels[idx + c] =
                        (target as f32 * alpha + base * (1.0 - alpha)).round() as u8;
                }
            }
        }
    }

    /// Re-poll the inset provider when the refresh counter expires, keeping
    /// the previous scaled image otherwise.
    fn refresh_inset(&mut self) {
        if self.frames_until_refresh > 0 && self.scaled_inset.is_some() {
            self.frames_until_refresh -= 1;
            return;
        }
        self.frames_until_refresh = INSET_REFRESH_INTERVAL - 1;

        let Some(provider) = self.inset_provider.as_mut() else {
            return;
        };
        let Some(source) = provider() else {
            return;
        };
        if source.pixels.len() != source.geometry.frame_len()
            || source.geometry.width == 0
            || source.geometry.height == 0
        {
            return;
        }

        let frame_w = self.geometry.width as usize;
        let target_w = (frame_w * self.settings.inset.width_pct as usize / 100)
            .max(INSET_MIN_WIDTH);
        let target_h = (target_w * source.geometry.height as usize
            / source.geometry.width as usize)
            .max(1);

        self.scaled_inset = Some(scale_nearest(&source, target_w, target_h));
    }

    fn blit_inset(&mut self, pixels: &mut [u8]) {
        let Some(inset) = &self.scaled_inset else {
            return;
        };
        let frame_w = self.geometry.width as usize;
        let frame_h = self.geometry.height as usize;

        // Skip outright when the inset plus its margins cannot fit.
        let needed_w = inset.width + 2 * (INSET_PADDING + INSET_BORDER);
        let needed_h = inset.height + 2 * (INSET_PADDING + INSET_BORDER);
        if needed_w > frame_w || needed_h > frame_h {
            return;
        }

        let x0 = match self.settings.inset.position {
            InsetPosition::TopLeft | InsetPosition::BottomLeft => INSET_PADDING,
            InsetPosition::TopRight | InsetPosition::BottomRight => {
                frame_w - inset.width - INSET_PADDING
            }
        };
        let y0 = match self.settings.inset.position {
            InsetPosition::TopLeft | InsetPosition::TopRight => INSET_PADDING,
            InsetPosition::BottomLeft | InsetPosition::BottomRight => {
                frame_h - inset.height - INSET_PADDING
            }
        };

        // Border rectangle behind the inset.
        for y in (y0 - INSET_BORDER)..(y0 + inset.height + INSET_BORDER) {
            for x in (x0 - INSET_BORDER)..(x0 + inset.width + INSET_BORDER) {
                let idx = (y * frame_w + x) * BYTES_PER_PIXEL;
                pixels[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&INSET_BORDER_COLOR);
            }
        }

        for row in 0..inset.height {
            let src = row * inset.width * BYTES_PER_PIXEL;
            let dst = ((y0 + row) * frame_w + x0) * BYTES_PER_PIXEL;
            pixels[dst..dst + inset.width * BYTES_PER_PIXEL]
                .copy_from_slice(&inset.pixels[src..src + inset.width * BYTES_PER_PIXEL]);
        }
    }
}

fn scale_nearest(source: &InsetFrame, target_w: usize, target_h: usize) -> ScaledInset {
    let src_w = source.geometry.width as usize;
    let src_h = source.geometry.height as usize;
    let mut pixels = vec![0u8; target_w * target_h * BYTES_PER_PIXEL];

    for ty in 0..target_h {
        let sy = ty * src_h / target_h;
        for tx in 0..target_w {
            let sx = tx * src_w / target_w;
            let src = (sy * src_w + sx) * BYTES_PER_PIXEL;
            let dst = (ty * target_w + tx) * BYTES_PER_PIXEL;
            pixels[dst..dst + BYTES_PER_PIXEL]
                .copy_from_slice(&source.pixels[src..src + BYTES_PER_PIXEL]);
        }
    }

    ScaledInset {
        pixels,
        width: target_w,
        height: target_h,
    }
}
