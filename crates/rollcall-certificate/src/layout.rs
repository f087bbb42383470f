//! Page geometry and font resolution.
//!
//! Template coordinates are percentages of the page measured from the top
//! left, and each block is anchored at its center. Everything here converts
//! those percentages into absolute points for a concrete page.

use rollcall_core::{Background, QrBlock, TextBlock};

/// Landscape letter width in points.
pub const PAGE_WIDTH_PT: f64 = 792.0;

/// Landscape letter height in points, used when there is no background.
pub const DEFAULT_PAGE_HEIGHT_PT: f64 = 612.0;

/// Line height as a multiple of the font size.
pub const LEADING: f64 = 1.2;

/// Average glyph advance as a fraction of the font size, used for wrapping.
const AVERAGE_ADVANCE: f64 = 0.5;

/// Absolute page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub width: f64,
    pub height: f64,
}

impl Page {
    /// The page for an optional background: fixed width, height following
    /// the background's aspect ratio.
    pub fn for_background(background: Option<&Background>) -> Self {
        let height = match background {
            Some(bg) if bg.width_px > 0 && bg.height_px > 0 => {
                PAGE_WIDTH_PT * bg.height_px as f64 / bg.width_px as f64
            }
            _ => DEFAULT_PAGE_HEIGHT_PT,
        };
        Self {
            width: PAGE_WIDTH_PT,
            height,
        }
    }

    /// Font size in points for a size given in thousandths of the width.
    pub fn font_size(&self, size: f64) -> f64 {
        size / 1000.0 * self.width
    }

    pub fn text_frame(&self, block: &TextBlock) -> Frame {
        let w = block.w / 100.0 * self.width;
        let h = block.h / 100.0 * self.height;
        let cx = block.x / 100.0 * self.width;
        let cy = block.y / 100.0 * self.height;
        Frame {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }
    }

    /// Square frame of the QR block; its size is already in points.
    pub fn qr_frame(&self, block: &QrBlock) -> Frame {
        let cx = block.x / 100.0 * self.width;
        let cy = block.y / 100.0 * self.height;
        Frame {
            x: cx - block.size / 2.0,
            y: cy - block.size / 2.0,
            w: block.size,
            h: block.size,
        }
    }
}

/// An absolute rectangle, origin at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Frame {
    pub fn center_x(&self) -> f64 {
        self.x + self.w / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.h / 2.0
    }
}

/// Resolve the face name for a family and style.
///
/// The three standard families get their bold and italic variants; any other
/// family is returned unchanged.
pub fn font_face(family: &str, bold: bool, italic: bool) -> String {
    let variant = match (family, bold, italic) {
        (_, false, false) => None,
        ("Helvetica", true, false) => Some("Helvetica-Bold"),
        ("Helvetica", false, true) => Some("Helvetica-Oblique"),
        ("Helvetica", true, true) => Some("Helvetica-BoldOblique"),
        ("Times-Roman", true, false) => Some("Times-Bold"),
        ("Times-Roman", false, true) => Some("Times-Italic"),
        ("Times-Roman", true, true) => Some("Times-BoldItalic"),
        ("Courier", true, false) => Some("Courier-Bold"),
        ("Courier", false, true) => Some("Courier-Oblique"),
        ("Courier", true, true) => Some("Courier-BoldOblique"),
        _ => None,
    };
    variant.unwrap_or(family).to_string()
}

/// Greedy word wrap of `text` into lines that fit `width` points at
/// `font_size`. Explicit newlines are kept; a word longer than a line is
/// placed on its own line.
pub fn wrap(text: &str, width: f64, font_size: f64) -> Vec<String> {
    let advance = (font_size * AVERAGE_ADVANCE).max(f64::EPSILON);
    let max_chars = ((width / advance).floor() as usize).max(1);

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_chars = 0usize;
        for word in paragraph.split_whitespace() {
            let word_chars = word.chars().count();
            if line_chars > 0 && line_chars + 1 + word_chars > max_chars {
                lines.push(std::mem::take(&mut line));
                line_chars = 0;
            }
            if line_chars > 0 {
                line.push(' ');
                line_chars += 1;
            }
            line.push_str(word);
            line_chars += word_chars;
        }
        lines.push(line);
    }
    lines
}
