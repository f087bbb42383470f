//! SVG certificate documents.
//!
//! The document is assembled as a string: an optional background image
//! stretched over the page, then each template block in order. All text and
//! attribute values pass through [`escape`].

use std::fmt::Write;

use qrcode::{Color, QrCode};

use rollcall_core::{Align, Background, TextBlock};

use crate::error::{RenderError, Result};
use crate::layout::{font_face, wrap, Frame, Page, LEADING};

/// Escape text for use in XML content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn is_hex_color(color: &str) -> bool {
    let Some(digits) = color.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// An SVG document under construction.
pub struct SvgDocument {
    page: Page,
    body: String,
}

impl SvgDocument {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            body: String::new(),
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    /// Stretch the background image over the whole page.
    pub fn background(&mut self, background: &Background) {
        let _ = writeln!(
            self.body,
            r#"  <image href="{}" x="0" y="0" width="{:.2}" height="{:.2}" preserveAspectRatio="none"/>"#,
            escape(&background.reference),
            self.page.width,
            self.page.height,
        );
    }

    /// Draw a text block whose placeholders are already resolved.
    pub fn text(&mut self, block: &TextBlock, resolved: &str) {
        if resolved.trim().is_empty() {
            return;
        }

        let frame = self.page.text_frame(block);
        let size = self.page.font_size(block.font);
        let lines = wrap(resolved, frame.w, size);
        let line_height = size * LEADING;

        let (anchor, x) = match block.align {
            Align::Left => ("start", frame.x),
            Align::Center => ("middle", frame.center_x()),
            Align::Right => ("end", frame.x + frame.w),
        };
        let color = if is_hex_color(&block.color) {
            block.color.as_str()
        } else {
            "#000000"
        };

        // Lines are centered vertically on the anchor; baseline sits ~0.35em
        // below each line's center.
        let first_center = frame.center_y() - line_height * (lines.len() as f64 - 1.0) / 2.0;

        let _ = writeln!(
            self.body,
            r#"  <text font-family="{}" font-size="{:.2}" fill="{}" text-anchor="{}">"#,
            escape(&font_face(&block.font_family, block.bold, block.italic)),
            size,
            color,
            anchor,
        );
        for (i, line) in lines.iter().enumerate() {
            let baseline = first_center + line_height * i as f64 + size * 0.35;
            let _ = writeln!(
                self.body,
                r#"    <tspan x="{:.2}" y="{:.2}">{}</tspan>"#,
                x,
                baseline,
                escape(line),
            );
        }
        self.body.push_str("  </text>\n");
    }

    /// Draw `data` as a QR symbol filling `frame`.
    pub fn qr(&mut self, frame: Frame, data: &str) -> Result<()> {
        let code = QrCode::new(data.as_bytes()).map_err(|e| RenderError::Qr(e.to_string()))?;
        let modules = code.width();
        let colors = code.to_colors();
        let cell = frame.w / modules as f64;

        let _ = writeln!(
            self.body,
            r##"  <g shape-rendering="crispEdges"><rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#ffffff"/>"##,
            frame.x, frame.y, frame.w, frame.h,
        );
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let (row, col) = (i / modules, i % modules);
            let _ = writeln!(
                self.body,
                r##"    <rect x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" fill="#000000"/>"##,
                frame.x + col as f64 * cell,
                frame.y + row as f64 * cell,
                cell,
                cell,
            );
        }
        self.body.push_str("  </g>\n");
        Ok(())
    }

    /// Close the document.
    pub fn finish(self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "\n",
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.2}" height="{h:.2}" viewBox="0 0 {w:.2} {h:.2}">"#,
                "\n{body}</svg>\n"
            ),
            w = self.page.width,
            h = self.page.height,
            body = self.body,
        )
    }
}
